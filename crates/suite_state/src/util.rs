use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use fastapi_output::RichOutput;
use serde::Serialize;
use sqlmodel_console::OutputMode as SqlModelOutputMode;

use crate::error::{Result, StateError};

#[must_use]
pub fn now_utc_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputIntegration {
    pub fastapi_mode: String,
    pub fastapi_agent: bool,
    pub fastapi_ci: bool,
    pub fastapi_tty: bool,
    pub sqlmodel_mode: String,
    pub sqlmodel_agent: bool,
}

impl OutputIntegration {
    #[must_use]
    pub fn detect() -> Self {
        let fastapi_detection = fastapi_output::detect_environment();
        let fastapi_mode = fastapi_output::OutputMode::auto();
        let sqlmodel_mode = SqlModelOutputMode::detect();
        Self {
            fastapi_mode: fastapi_mode.as_str().to_string(),
            fastapi_agent: fastapi_detection.is_agent,
            fastapi_ci: fastapi_detection.is_ci,
            fastapi_tty: fastapi_detection.is_tty,
            sqlmodel_mode: sqlmodel_mode.as_str().to_string(),
            sqlmodel_agent: SqlModelOutputMode::is_agent_environment(),
        }
    }

    #[must_use]
    pub fn should_emit_json(&self) -> bool {
        self.sqlmodel_mode == "json"
    }
}

#[derive(Debug, Clone)]
pub struct CliOutput {
    inner: RichOutput,
    enabled: bool,
}

impl CliOutput {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            inner: RichOutput::auto(),
            enabled,
        }
    }

    pub fn info(&self, message: &str) {
        if self.enabled {
            self.inner.info(message);
        }
    }

    pub fn success(&self, message: &str) {
        if self.enabled {
            self.inner.success(message);
        }
    }
}

#[must_use]
pub fn output_for(integration: &OutputIntegration) -> CliOutput {
    CliOutput::new(!integration.should_emit_json())
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

pub fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(StateError::MissingPath {
            path: path.to_path_buf(),
        })
    }
}

fn temp_sibling(path: &Path) -> Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        StateError::invalid(format!("not a writable file path: {}", path.display()))
    })?;
    let mut temp_name = OsString::from(".");
    temp_name.push(file_name);
    temp_name.push(format!(".{}.tmp", std::process::id()));
    Ok(path.with_file_name(temp_name))
}

/// Content written and synced next to its target, waiting for the rename
/// that makes readers see either the old file or the complete new one.
///
/// Dropping an uncommitted file removes the temp copy.
#[derive(Debug)]
pub struct StagedFile {
    temp_path: Option<PathBuf>,
    target: PathBuf,
}

impl StagedFile {
    pub fn stage(path: &Path, content: &[u8]) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }
        let temp_path = temp_sibling(path)?;

        let written = File::create(&temp_path).and_then(|mut file| {
            file.write_all(content)?;
            file.sync_all()
        });
        if let Err(error) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(error.into());
        }
        Ok(Self {
            temp_path: Some(temp_path),
            target: path.to_path_buf(),
        })
    }

    /// Renames the staged content over the target.
    pub fn commit(mut self) -> Result<()> {
        let Some(temp_path) = self.temp_path.take() else {
            return Ok(());
        };
        if let Err(error) = fs::rename(&temp_path, &self.target) {
            let _ = fs::remove_file(&temp_path);
            return Err(error.into());
        }
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Some(temp_path) = self.temp_path.take() {
            let _ = fs::remove_file(temp_path);
        }
    }
}

/// Lexically normalizes a suite path into its summary key.
///
/// `.` segments and trailing separators are dropped and `..` folds into its
/// parent where one exists. An empty result becomes `.`.
#[must_use]
pub fn normalize_suite_path(path: &Path) -> String {
    let mut prefix = String::new();
    let mut segments: Vec<String> = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(value) => prefix = value.as_os_str().to_string_lossy().into_owned(),
            Component::RootDir => prefix.push('/'),
            Component::CurDir => {}
            Component::ParentDir => {
                let can_fold = segments.last().is_some_and(|last| last != "..");
                if can_fold {
                    segments.pop();
                } else if prefix.is_empty() {
                    segments.push("..".to_string());
                }
            }
            Component::Normal(value) => segments.push(value.to_string_lossy().into_owned()),
        }
    }

    let joined = format!("{prefix}{}", segments.join("/"));
    if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::{OutputIntegration, StagedFile, normalize_suite_path, output_for};

    #[test]
    fn normalize_suite_path_matches_lexical_normpath() {
        assert_eq!(
            normalize_suite_path(Path::new("cranelift/zkasm_data/spectest/i64/")),
            "cranelift/zkasm_data/spectest/i64"
        );
        assert_eq!(normalize_suite_path(Path::new("./a/./b")), "a/b");
        assert_eq!(normalize_suite_path(Path::new("a/b/../c")), "a/c");
        assert_eq!(normalize_suite_path(Path::new("../x")), "../x");
        assert_eq!(normalize_suite_path(Path::new("/abs/dir/")), "/abs/dir");
        assert_eq!(normalize_suite_path(Path::new("/..")), "/");
        assert_eq!(normalize_suite_path(Path::new(".")), ".");
        assert_eq!(normalize_suite_path(Path::new("a/..")), ".");
    }

    #[test]
    fn committed_file_creates_parents_and_replaces_content() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("docs/zkasm/summary.csv");

        StagedFile::stage(&target, b"first\n")
            .and_then(StagedFile::commit)
            .expect("first write");
        StagedFile::stage(&target, b"second\n")
            .and_then(StagedFile::commit)
            .expect("second write");

        assert_eq!(fs::read_to_string(&target).expect("read"), "second\n");
        let leftovers = fs::read_dir(target.parent().expect("parent"))
            .expect("list")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn commit_onto_directory_fails_without_clobbering() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("taken");
        fs::create_dir(&target).expect("directory in the way");

        let staged = StagedFile::stage(&target, b"data").expect("stage beside directory");
        assert!(staged.commit().is_err());
        assert!(target.is_dir());
    }

    #[test]
    fn dropped_staged_file_leaves_target_untouched() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("state.csv");
        fs::write(&target, "old\n").expect("seed");

        let staged = StagedFile::stage(&target, b"new\n").expect("stage");
        drop(staged);

        assert_eq!(fs::read_to_string(&target).expect("read"), "old\n");
        assert_eq!(fs::read_dir(temp.path()).expect("list").count(), 1);
    }

    #[test]
    fn output_for_disables_human_output_when_json_mode_requested() {
        let json_integration = OutputIntegration {
            fastapi_mode: "plain".to_string(),
            fastapi_agent: true,
            fastapi_ci: false,
            fastapi_tty: false,
            sqlmodel_mode: "json".to_string(),
            sqlmodel_agent: true,
        };
        let human_integration = OutputIntegration {
            sqlmodel_mode: "plain".to_string(),
            ..json_integration.clone()
        };

        assert!(!output_for(&json_integration).enabled);
        assert!(output_for(&human_integration).enabled);
    }
}
