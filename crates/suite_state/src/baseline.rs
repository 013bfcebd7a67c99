use std::fs;
use std::io;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use tracing::{debug, info};

use crate::error::{Result, StateError};
use crate::model::{Outcome, Status, SuiteState, TestResult};
use crate::util::StagedFile;

pub const BASELINE_FILE_NAME: &str = "state.csv";
pub const BASELINE_HEADER: [&str; 3] = ["Test", "Status", "Cycles"];

/// Rows sorted by name, so equal states encode to identical bytes.
pub fn encode_baseline(state: &SuiteState) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(BASELINE_HEADER)?;
    for (name, outcome) in state.iter() {
        let cycles = outcome
            .cycles()
            .map(|cycles| cycles.to_string())
            .unwrap_or_default();
        writer.write_record([name, outcome.status().as_str(), cycles.as_str()])?;
    }

    writer
        .into_inner()
        .map_err(|error| StateError::Io(error.into_error()))
}

/// Parses baseline bytes; `path` is only used for error reporting.
pub fn decode_baseline(path: &Path, content: &[u8]) -> Result<SuiteState> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content);

    let headers = reader.headers()?.clone();
    if headers.iter().ne(BASELINE_HEADER) {
        return Err(StateError::corrupt_state(
            path,
            1,
            format!(
                "expected header `{}`, found `{}`",
                BASELINE_HEADER.join(","),
                headers.iter().collect::<Vec<_>>().join(",")
            ),
        ));
    }

    let mut state = SuiteState::new();
    for row in reader.records() {
        let record = row?;
        let line = record.position().map_or(0, csv::Position::line);
        let result = parse_row(&record).map_err(|message| {
            StateError::corrupt_state(path, line, message)
        })?;
        if state.contains(&result.name) {
            return Err(StateError::corrupt_state(
                path,
                line,
                format!("duplicate test `{}`", result.name),
            ));
        }
        state.insert(result);
    }
    Ok(state)
}

fn parse_row(record: &StringRecord) -> std::result::Result<TestResult, String> {
    if record.len() != BASELINE_HEADER.len() {
        return Err(format!(
            "expected {} fields, found {}",
            BASELINE_HEADER.len(),
            record.len()
        ));
    }

    let name = &record[0];
    if name.is_empty() {
        return Err("empty test name".to_string());
    }
    let status =
        Status::parse(&record[1]).ok_or_else(|| format!("unknown status `{}`", &record[1]))?;
    let cycles = match &record[2] {
        "" => None,
        raw => Some(
            raw.parse::<u64>()
                .map_err(|_| format!("invalid cycle count `{raw}` for `{name}`"))?,
        ),
    };
    let outcome = Outcome::from_parts(status, cycles).ok_or_else(|| match cycles {
        Some(cycles) => format!("test `{name}` has status `{status}` but {cycles} cycles"),
        None => format!("passing test `{name}` has no cycle count"),
    })?;

    Ok(TestResult::new(name, outcome))
}

/// Reads the baseline at `path`, distinguishing a missing file from a bad one.
pub fn read_baseline(path: &Path) -> Result<SuiteState> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Err(StateError::NoBaseline {
                path: path.to_path_buf(),
            });
        }
        Err(error) => return Err(error.into()),
    };
    let state = decode_baseline(path, &content)?;
    debug!(path = %path.display(), tests = state.len(), "baseline loaded");
    Ok(state)
}

/// Writes the encoded baseline next to `path` without replacing it yet.
pub fn stage_baseline(path: &Path, state: &SuiteState) -> Result<StagedFile> {
    StagedFile::stage(path, &encode_baseline(state)?)
}

pub fn write_baseline(path: &Path, state: &SuiteState) -> Result<()> {
    stage_baseline(path, state)?.commit()?;
    info!(path = %path.display(), tests = state.len(), "baseline written");
    Ok(())
}
