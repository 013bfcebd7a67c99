use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde_json::{Value, json};
use tracing::debug;

use crate::decoder::decode_execution_results;
use crate::error::{Result, StateError};
use crate::logging;
use crate::merge::{MergePrecedence, merge_results};
use crate::model::SuiteState;
use crate::reconcile::{Mode, Reconciler, Reconciliation, SuiteLayout};
use crate::scanner::{
    DEFAULT_ARTIFACT_EXT, DEFAULT_DEFINITION_EXT, ScanExtensions, scan_compilation_failures,
};
use crate::summary::DEFAULT_SUMMARY_PATH;
use crate::util::{OutputIntegration, ensure_exists, now_utc_iso, output_for};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "suite_state",
    about = "Reconcile a suite's compilation and execution results with its recorded state",
    version
)]
pub struct Cli {
    /// Path to a folder with tests.
    pub path: PathBuf,

    /// Record the results as the new state instead of checking against it.
    #[arg(long)]
    pub update: bool,

    /// Read execution results from a file instead of stdin.
    #[arg(long)]
    pub input: Option<PathBuf>,

    #[arg(long = "generated-dir")]
    pub generated_dir: Option<PathBuf>,

    #[arg(long = "state-file")]
    pub state_file: Option<PathBuf>,

    #[arg(long = "summary-file", default_value = DEFAULT_SUMMARY_PATH)]
    pub summary_file: PathBuf,

    #[arg(long = "definition-ext", default_value = DEFAULT_DEFINITION_EXT)]
    pub definition_ext: String,

    #[arg(long = "artifact-ext", default_value = DEFAULT_ARTIFACT_EXT)]
    pub artifact_ext: String,

    /// Let an execution record override a missing compilation artifact.
    #[arg(long = "prefer-execution")]
    pub prefer_execution: bool,
}

impl Cli {
    #[must_use]
    pub fn mode(&self) -> Mode {
        if self.update { Mode::Update } else { Mode::Check }
    }

    #[must_use]
    pub fn precedence(&self) -> MergePrecedence {
        if self.prefer_execution {
            MergePrecedence::Execution
        } else {
            MergePrecedence::Compilation
        }
    }

    #[must_use]
    pub fn layout(&self) -> SuiteLayout {
        let defaults = SuiteLayout::for_suite(&self.path);
        SuiteLayout {
            generated_dir: self
                .generated_dir
                .clone()
                .unwrap_or(defaults.generated_dir),
            state_file: self.state_file.clone().unwrap_or(defaults.state_file),
            summary_file: self.summary_file.clone(),
            ..defaults
        }
    }

    pub fn extensions(&self) -> Result<ScanExtensions> {
        ScanExtensions::new(self.definition_ext.clone(), self.artifact_ext.clone())
    }
}

pub fn run_from_env() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    run(cli)
}

fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) => {
            ensure_exists(path)?;
            Ok(fs::read_to_string(path)?)
        }
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

/// Scans, decodes and merges one run into the suite's actual state.
pub fn collect_results(cli: &Cli, layout: &SuiteLayout, input: &str) -> Result<SuiteState> {
    let failures =
        scan_compilation_failures(&layout.tests_dir, &layout.generated_dir, &cli.extensions()?)?;
    let executions = decode_execution_results(input)?;
    debug!(
        compilation_failures = failures.len(),
        executions = executions.len(),
        "merging run results"
    );
    Ok(merge_results(failures, executions, cli.precedence()))
}

/// Runs the whole pipeline against an already materialized results stream.
pub fn execute(cli: &Cli, input: &str) -> Result<Reconciliation> {
    let layout = cli.layout();
    let actual = collect_results(cli, &layout, input)?;
    Reconciler::new(layout).reconcile(cli.mode(), &actual)
}

fn json_report(
    cli: &Cli,
    outcome: &Result<Reconciliation>,
    integration: &OutputIntegration,
) -> Value {
    let mut report = json!({
        "command": "suite_state",
        "mode": cli.mode().as_str(),
        "suite": cli.layout().suite_key,
        "finished_at": now_utc_iso(),
        "integration": integration,
    });
    match outcome {
        Ok(reconciliation) => {
            report["status"] = json!("ok");
            report["passing_count"] = json!(reconciliation.entry.passing_count);
            report["total_count"] = json!(reconciliation.entry.total_count);
            report["total_cycles"] = json!(reconciliation.entry.total_cycles);
            report["discrepancies"] = json!([]);
        }
        Err(StateError::Mismatch { discrepancies }) => {
            report["status"] = json!("mismatch");
            report["discrepancies"] = discrepancies
                .iter()
                .map(|discrepancy| {
                    json!({
                        "test": discrepancy.name,
                        "baseline": discrepancy.baseline_label(),
                        "actual": discrepancy.actual_label(),
                    })
                })
                .collect();
        }
        Err(error) => {
            report["status"] = json!("error");
            report["error"] = json!(error.to_string());
        }
    }
    if let Err(error) = outcome {
        report["exit_code"] = json!(error.exit_code());
    }
    report
}

pub fn run(cli: Cli) -> Result<()> {
    let integration = OutputIntegration::detect();
    let ui = output_for(&integration);

    let outcome = read_input(cli.input.as_deref()).and_then(|input| execute(&cli, &input));

    if integration.should_emit_json() {
        println!("{}", json_report(&cli, &outcome, &integration));
    }

    let reconciliation = outcome?;
    let entry = reconciliation.entry;
    match reconciliation.mode {
        Mode::Update => ui.success(&format!(
            "state updated suite={} passing={} total={}",
            reconciliation.suite_key, entry.passing_count, entry.total_count
        )),
        Mode::Check => ui.success(&format!(
            "state matches suite={} tests={}",
            reconciliation.suite_key, entry.total_count
        )),
    }
    if let Some(total_cycles) = entry.total_cycles {
        ui.info(&format!("total cycles={total_cycles}"));
    }
    Ok(())
}
