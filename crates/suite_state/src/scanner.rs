use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use crate::error::{Result, StateError};
use crate::model::{SuiteState, TestResult};
use crate::util::ensure_exists;

pub const DEFAULT_DEFINITION_EXT: &str = "wat";
pub const DEFAULT_ARTIFACT_EXT: &str = "zkasm";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanExtensions {
    pub definition: String,
    pub artifact: String,
}

impl Default for ScanExtensions {
    fn default() -> Self {
        Self {
            definition: DEFAULT_DEFINITION_EXT.to_string(),
            artifact: DEFAULT_ARTIFACT_EXT.to_string(),
        }
    }
}

impl ScanExtensions {
    pub fn new(definition: impl Into<String>, artifact: impl Into<String>) -> Result<Self> {
        let extensions = Self {
            definition: definition.into(),
            artifact: artifact.into(),
        };
        validate_extension("definition", &extensions.definition)?;
        validate_extension("artifact", &extensions.artifact)?;
        Ok(extensions)
    }
}

fn validate_extension(kind: &str, ext: &str) -> Result<()> {
    if ext.is_empty() {
        return Err(StateError::invalid(format!("{kind} extension cannot be empty")));
    }
    if ext.starts_with('.') || ext.contains(['/', '\\']) {
        return Err(StateError::invalid(format!(
            "{kind} extension must be a bare extension like `wat`, got `{ext}`"
        )));
    }
    Ok(())
}

/// Returns a `compilation failed` record for every definition in `tests_dir`
/// lacking a generated artifact.
pub fn scan_compilation_failures(
    tests_dir: &Path,
    generated_dir: &Path,
    extensions: &ScanExtensions,
) -> Result<SuiteState> {
    ensure_exists(tests_dir)?;

    let mut failures = SuiteState::new();
    let mut definitions = 0_usize;
    for entry in fs::read_dir(tests_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(extensions.definition.as_str()) {
            continue;
        }
        // Follows symlinks.
        if !path.is_file() {
            continue;
        }
        let Some(stem) = path.file_stem().filter(|stem| !stem.is_empty()) else {
            continue;
        };
        let name = stem.to_str().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("test definition name is not valid UTF-8: {}", path.display()),
            )
        })?;

        definitions = definitions.saturating_add(1);
        let artifact = generated_dir.join(format!("{name}.{}", extensions.artifact));
        if !artifact.is_file() {
            debug!(test = name, artifact = %artifact.display(), "artifact missing");
            failures.insert(TestResult::compilation_failed(name));
        }
    }

    debug!(
        tests_dir = %tests_dir.display(),
        definitions,
        failures = failures.len(),
        "compilation scan complete"
    );
    Ok(failures)
}
