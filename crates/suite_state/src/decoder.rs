use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, StateError};
use crate::model::{Outcome, Status, SuiteState, TestResult};

#[derive(Debug, Deserialize)]
struct RawRecord {
    path: String,
    status: Status,
    /// Read only for passing records.
    #[serde(default)]
    counters: Option<Value>,
}

/// The harness stringifies big integers, so both forms show up.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StepCount {
    Number(u64),
    Text(String),
}

impl StepCount {
    fn value(&self) -> std::result::Result<u64, String> {
        match self {
            Self::Number(value) => Ok(*value),
            Self::Text(text) => text
                .trim()
                .parse::<u64>()
                .map_err(|_| format!("`cntSteps` is not a non-negative integer: {text:?}")),
        }
    }
}

/// Derives a test name from a harness path: base name, extension stripped.
#[must_use]
pub fn test_name_from_path(path: &str) -> Option<&str> {
    Path::new(path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
}

fn split_records(input: &str) -> Result<Vec<Value>> {
    let trimmed = input.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str::<Vec<Value>>(trimmed)?);
    }

    let mut records = Vec::new();
    for value in serde_json::Deserializer::from_str(trimmed).into_iter::<Value>() {
        records.push(value?);
    }
    Ok(records)
}

fn decode_record(index: usize, value: Value) -> Result<TestResult> {
    let raw = serde_json::from_value::<RawRecord>(value)
        .map_err(|error| StateError::decode(index, error.to_string()))?;

    let name = test_name_from_path(&raw.path).ok_or_else(|| {
        StateError::decode(index, format!("cannot derive a test name from path {:?}", raw.path))
    })?;

    let outcome = match raw.status {
        Status::Pass => {
            let steps = raw
                .counters
                .as_ref()
                .and_then(|counters| counters.get("cntSteps"))
                .filter(|steps| !steps.is_null())
                .ok_or_else(|| {
                    StateError::decode(index, format!("passing test `{name}` has no `cntSteps`"))
                })?;
            let cycles = StepCount::deserialize(steps)
                .map_err(|error| StateError::decode(index, format!("`cntSteps`: {error}")))?
                .value()
                .map_err(|message| StateError::decode(index, message))?;
            Outcome::Pass { cycles }
        }
        Status::Fail => Outcome::Fail,
        Status::RuntimeError => Outcome::RuntimeError,
        Status::CompilationFailed => Outcome::CompilationFailed,
    };

    Ok(TestResult::new(name, outcome))
}

/// Decodes the harness output into one result per executed test.
pub fn decode_execution_results(input: &str) -> Result<SuiteState> {
    let records = split_records(input)?;
    let mut results = SuiteState::new();

    for (index, value) in records.into_iter().enumerate() {
        let result = decode_record(index, value)?;
        if results.contains(&result.name) {
            return Err(StateError::decode(
                index,
                format!("duplicate execution record for test `{}`", result.name),
            ));
        }
        results.insert(result);
    }

    debug!(records = results.len(), "execution results decoded");
    Ok(results)
}
