use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::baseline::{BASELINE_FILE_NAME, read_baseline, stage_baseline};
use crate::error::{Result, StateError};
use crate::model::{Outcome, SuiteState};
use crate::summary::{DEFAULT_SUMMARY_PATH, SummaryEntry, SummaryTable};
use crate::util::normalize_suite_path;

pub const GENERATED_DIR_NAME: &str = "generated";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Check,
    Update,
}

impl Mode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::Update => "update",
        }
    }
}

/// Where one suite's inputs and persisted state live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteLayout {
    pub tests_dir: PathBuf,
    pub generated_dir: PathBuf,
    pub state_file: PathBuf,
    pub summary_file: PathBuf,
    /// Key of this suite's row in the summary table.
    pub suite_key: String,
}

impl SuiteLayout {
    /// Default layout: `<dir>/generated`, `<dir>/state.csv` and the shared
    /// summary under `docs/zkasm/`.
    #[must_use]
    pub fn for_suite(tests_dir: &Path) -> Self {
        Self {
            tests_dir: tests_dir.to_path_buf(),
            generated_dir: tests_dir.join(GENERATED_DIR_NAME),
            state_file: tests_dir.join(BASELINE_FILE_NAME),
            summary_file: PathBuf::from(DEFAULT_SUMMARY_PATH),
            suite_key: normalize_suite_path(tests_dir),
        }
    }
}

/// One test whose baseline and actual outcomes differ; `None` means absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discrepancy {
    pub name: String,
    pub baseline: Option<Outcome>,
    pub actual: Option<Outcome>,
}

fn label(outcome: Option<Outcome>) -> String {
    outcome.map_or_else(|| "missing".to_string(), |outcome| outcome.to_string())
}

impl Discrepancy {
    #[must_use]
    pub fn baseline_label(&self) -> String {
        label(self.baseline)
    }

    #[must_use]
    pub fn actual_label(&self) -> String {
        label(self.actual)
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Update for test {}: {} => {}",
            self.name,
            self.baseline_label(),
            self.actual_label()
        )
    }
}

/// Every name whose outcome differs, including names present on one side
/// only, in name order.
#[must_use]
pub fn diff_states(baseline: &SuiteState, actual: &SuiteState) -> Vec<Discrepancy> {
    let names: BTreeSet<&str> = baseline.names().chain(actual.names()).collect();
    names
        .into_iter()
        .filter_map(|name| {
            let expected = baseline.get(name);
            let observed = actual.get(name);
            (expected != observed).then(|| Discrepancy {
                name: name.to_string(),
                baseline: expected,
                actual: observed,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub mode: Mode,
    pub suite_key: String,
    pub entry: SummaryEntry,
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    layout: SuiteLayout,
}

impl Reconciler {
    #[must_use]
    pub fn new(layout: SuiteLayout) -> Self {
        Self { layout }
    }

    pub fn reconcile(&self, mode: Mode, actual: &SuiteState) -> Result<Reconciliation> {
        match mode {
            Mode::Update => self.update(actual),
            Mode::Check => self.check(actual),
        }
    }

    /// Records `actual` as the baseline and replaces this suite's summary row.
    ///
    /// Both files are staged before either is renamed into place, so a failure
    /// while loading or writing leaves both untouched. Only a failure of the
    /// second rename can leave a new baseline next to an old summary row.
    pub fn update(&self, actual: &SuiteState) -> Result<Reconciliation> {
        let entry = SummaryEntry::from_state(actual);
        let table = SummaryTable::load(&self.layout.summary_file)?;

        let baseline = stage_baseline(&self.layout.state_file, actual)?;
        let summary = table
            .upsert(self.layout.suite_key.clone(), entry)
            .stage(&self.layout.summary_file)?;
        baseline.commit()?;
        summary.commit()?;

        info!(
            suite = %self.layout.suite_key,
            baseline = %self.layout.state_file.display(),
            passing = entry.passing_count,
            total = entry.total_count,
            "suite state updated"
        );
        Ok(self.outcome(Mode::Update, entry))
    }

    /// Compares `actual` with the recorded baseline.
    pub fn check(&self, actual: &SuiteState) -> Result<Reconciliation> {
        let baseline = read_baseline(&self.layout.state_file)?;
        let discrepancies = diff_states(&baseline, actual);
        if !discrepancies.is_empty() {
            warn!(
                suite = %self.layout.suite_key,
                discrepancies = discrepancies.len(),
                "suite state differs from baseline"
            );
            return Err(StateError::Mismatch { discrepancies });
        }

        info!(suite = %self.layout.suite_key, tests = actual.len(), "suite state matches baseline");
        Ok(self.outcome(Mode::Check, SummaryEntry::from_state(actual)))
    }

    fn outcome(&self, mode: Mode, entry: SummaryEntry) -> Reconciliation {
        Reconciliation {
            mode,
            suite_key: self.layout.suite_key.clone(),
            entry,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::{Discrepancy, Mode, Reconciler, SuiteLayout, diff_states};
    use crate::baseline::{read_baseline, write_baseline};
    use crate::error::StateError;
    use crate::model::{Outcome, SuiteState, TestResult};
    use crate::summary::{SummaryEntry, SummaryTable};

    fn state(entries: &[(&str, Outcome)]) -> SuiteState {
        entries
            .iter()
            .map(|(name, outcome)| TestResult::new(*name, *outcome))
            .collect()
    }

    fn layout_in(root: &Path) -> SuiteLayout {
        let tests_dir = root.join("suite");
        fs::create_dir_all(&tests_dir).expect("suite dir");
        SuiteLayout {
            summary_file: root.join("docs/zkasm/test_summary.csv"),
            suite_key: "suite".to_string(),
            ..SuiteLayout::for_suite(&tests_dir)
        }
    }

    #[test]
    fn default_layout_uses_generated_and_state_csv() {
        let layout = SuiteLayout::for_suite(Path::new("cranelift/zkasm_data/spectest/i64/"));
        assert_eq!(
            layout.generated_dir,
            Path::new("cranelift/zkasm_data/spectest/i64/generated")
        );
        assert_eq!(
            layout.state_file,
            Path::new("cranelift/zkasm_data/spectest/i64/state.csv")
        );
        assert_eq!(layout.summary_file, Path::new("docs/zkasm/test_summary.csv"));
        assert_eq!(layout.suite_key, "cranelift/zkasm_data/spectest/i64");
    }

    #[test]
    fn cycle_only_change_is_reported() {
        let baseline = state(&[("add", Outcome::Pass { cycles: 120 })]);
        let actual = state(&[("add", Outcome::Pass { cycles: 130 })]);

        let diff = diff_states(&baseline, &actual);

        assert_eq!(diff.len(), 1);
        assert_eq!(
            diff[0].to_string(),
            "Update for test add: pass,120 => pass,130"
        );
    }

    #[test]
    fn added_and_removed_tests_are_reported_with_missing_side() {
        let baseline = state(&[
            ("old", Outcome::Pass { cycles: 1 }),
            ("same", Outcome::Fail),
        ]);
        let actual = state(&[("new", Outcome::CompilationFailed), ("same", Outcome::Fail)]);

        let rendered = diff_states(&baseline, &actual)
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();

        assert_eq!(
            rendered,
            [
                "Update for test new: missing => compilation failed",
                "Update for test old: pass,1 => missing",
            ]
        );
    }

    #[test]
    fn identical_states_have_no_discrepancies() {
        let results = state(&[
            ("a", Outcome::Pass { cycles: 5 }),
            ("b", Outcome::RuntimeError),
        ]);
        assert!(diff_states(&results, &results.clone()).is_empty());
    }

    #[test]
    fn update_writes_baseline_and_summary_row() {
        let temp = tempdir().expect("tempdir");
        let layout = layout_in(temp.path());
        let actual = state(&[
            ("add", Outcome::Pass { cycles: 120 }),
            ("foo", Outcome::CompilationFailed),
        ]);

        let reconciler = Reconciler::new(layout.clone());
        let result = reconciler.reconcile(Mode::Update, &actual).expect("update");

        assert_eq!(result.mode, Mode::Update);
        assert_eq!(read_baseline(&layout.state_file).expect("baseline"), actual);
        let table = SummaryTable::load(&layout.summary_file).expect("summary");
        assert_eq!(
            table.get("suite"),
            Some(&SummaryEntry {
                passing_count: 1,
                total_count: 2,
                total_cycles: Some(120),
            })
        );
    }

    #[test]
    fn update_with_no_results_records_empty_suite() {
        let temp = tempdir().expect("tempdir");
        let layout = layout_in(temp.path());

        Reconciler::new(layout.clone())
            .update(&SuiteState::new())
            .expect("update");

        assert_eq!(
            fs::read_to_string(&layout.state_file).expect("baseline"),
            "Test,Status,Cycles\n"
        );
        assert_eq!(
            fs::read_to_string(&layout.summary_file).expect("summary"),
            "Suite path,Passing count,Total count,Total cycles\nsuite,0,0,0\n"
        );
    }

    #[test]
    fn update_with_corrupt_summary_leaves_baseline_untouched() {
        let temp = tempdir().expect("tempdir");
        let layout = layout_in(temp.path());
        fs::create_dir_all(layout.summary_file.parent().expect("parent")).expect("docs dir");
        fs::write(&layout.summary_file, "garbage\n").expect("corrupt summary");

        let error = Reconciler::new(layout.clone())
            .update(&state(&[("a", Outcome::Fail)]))
            .expect_err("corrupt summary");

        assert!(matches!(error, StateError::CorruptSummary { .. }), "{error}");
        assert!(!layout.state_file.exists());
    }

    #[test]
    fn update_that_cannot_write_summary_leaves_baseline_untouched() {
        let temp = tempdir().expect("tempdir");
        let layout = layout_in(temp.path());
        write_baseline(&layout.state_file, &state(&[("a", Outcome::Fail)])).expect("seed");
        let before = fs::read(&layout.state_file).expect("read seed");
        let summary_dir = layout.summary_file.parent().expect("parent");
        fs::create_dir_all(summary_dir.join(format!(
            ".test_summary.csv.{}.tmp",
            std::process::id()
        )))
        .expect("block summary temp file");

        let error = Reconciler::new(layout.clone())
            .update(&state(&[("a", Outcome::Pass { cycles: 3 })]))
            .expect_err("summary cannot be staged");

        assert!(matches!(error, StateError::Io(_)), "{error}");
        assert_eq!(fs::read(&layout.state_file).expect("baseline"), before);
        assert!(!layout.summary_file.exists());
        let leftovers = fs::read_dir(&layout.tests_dir)
            .expect("list suite")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn check_passes_when_results_match_baseline() {
        let temp = tempdir().expect("tempdir");
        let layout = layout_in(temp.path());
        let actual = state(&[("add", Outcome::Pass { cycles: 120 })]);
        write_baseline(&layout.state_file, &actual).expect("seed baseline");

        let result = Reconciler::new(layout.clone())
            .reconcile(Mode::Check, &actual)
            .expect("check");

        assert_eq!(result.mode, Mode::Check);
        assert!(!layout.summary_file.exists(), "check mode never writes the summary");
    }

    #[test]
    fn check_collects_every_discrepancy() {
        let temp = tempdir().expect("tempdir");
        let layout = layout_in(temp.path());
        write_baseline(
            &layout.state_file,
            &state(&[
                ("add", Outcome::Pass { cycles: 120 }),
                ("div", Outcome::RuntimeError),
                ("sub", Outcome::Pass { cycles: 7 }),
            ]),
        )
        .expect("seed baseline");
        let actual = state(&[
            ("add", Outcome::Pass { cycles: 130 }),
            ("div", Outcome::Pass { cycles: 50 }),
            ("sub", Outcome::Pass { cycles: 7 }),
        ]);

        let error = Reconciler::new(layout)
            .check(&actual)
            .expect_err("mismatch");

        match error {
            StateError::Mismatch { discrepancies } => {
                assert_eq!(
                    discrepancies,
                    vec![
                        Discrepancy {
                            name: "add".to_string(),
                            baseline: Some(Outcome::Pass { cycles: 120 }),
                            actual: Some(Outcome::Pass { cycles: 130 }),
                        },
                        Discrepancy {
                            name: "div".to_string(),
                            baseline: Some(Outcome::RuntimeError),
                            actual: Some(Outcome::Pass { cycles: 50 }),
                        },
                    ]
                );
            }
            other => panic!("expected Mismatch, got {other}"),
        }
    }

    #[test]
    fn check_without_baseline_is_not_a_mismatch() {
        let temp = tempdir().expect("tempdir");
        let layout = layout_in(temp.path());

        let error = Reconciler::new(layout)
            .check(&SuiteState::new())
            .expect_err("no baseline");

        assert!(matches!(error, StateError::NoBaseline { .. }), "{error}");
    }
}
