use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use tracing::{debug, info};

use crate::error::{Result, StateError};
use crate::model::SuiteState;
use crate::util::StagedFile;

pub const DEFAULT_SUMMARY_PATH: &str = "docs/zkasm/test_summary.csv";
pub const SUMMARY_HEADER: [&str; 4] = [
    "Suite path",
    "Passing count",
    "Total count",
    "Total cycles",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SummaryEntry {
    pub passing_count: u64,
    pub total_count: u64,
    pub total_cycles: Option<u64>,
}

impl SummaryEntry {
    #[must_use]
    pub fn from_state(state: &SuiteState) -> Self {
        Self {
            passing_count: state.passing_count() as u64,
            total_count: state.len() as u64,
            total_cycles: Some(state.total_cycles()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryTable {
    entries: BTreeMap<String, SummaryEntry>,
}

impl SummaryTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the table; a missing file is an empty table.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no summary yet; starting empty");
                return Ok(Self::new());
            }
            Err(error) => return Err(error.into()),
        };
        Self::decode(path, &content)
    }

    /// Parses summary bytes; `path` is only used for error reporting.
    pub fn decode(path: &Path, content: &[u8]) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(content);

        let headers = reader.headers()?.clone();
        if headers.iter().ne(SUMMARY_HEADER) {
            return Err(StateError::corrupt_summary(
                path,
                1,
                format!(
                    "expected header `{}`, found `{}`",
                    SUMMARY_HEADER.join(","),
                    headers.iter().collect::<Vec<_>>().join(",")
                ),
            ));
        }

        let mut table = Self::new();
        for row in reader.records() {
            let record = row?;
            let line = record.position().map_or(0, csv::Position::line);
            let (suite_path, entry) = parse_row(&record)
                .map_err(|message| StateError::corrupt_summary(path, line, message))?;
            if table.entries.contains_key(&suite_path) {
                return Err(StateError::corrupt_summary(
                    path,
                    line,
                    format!("duplicate suite path `{suite_path}`"),
                ));
            }
            table.entries.insert(suite_path, entry);
        }
        Ok(table)
    }

    /// Replaces or inserts the entry for `suite_path`, leaving all others alone.
    #[must_use]
    pub fn upsert(mut self, suite_path: impl Into<String>, entry: SummaryEntry) -> Self {
        self.entries.insert(suite_path.into(), entry);
        self
    }

    #[must_use]
    pub fn get(&self, suite_path: &str) -> Option<&SummaryEntry> {
        self.entries.get(suite_path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SummaryEntry)> + '_ {
        self.entries
            .iter()
            .map(|(suite_path, entry)| (suite_path.as_str(), entry))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut writer = WriterBuilder::new()
            .terminator(Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        writer.write_record(SUMMARY_HEADER)?;
        for (suite_path, entry) in &self.entries {
            let passing_count = entry.passing_count.to_string();
            let total_count = entry.total_count.to_string();
            let total_cycles = entry
                .total_cycles
                .map(|cycles| cycles.to_string())
                .unwrap_or_default();
            writer.write_record([
                suite_path.as_str(),
                passing_count.as_str(),
                total_count.as_str(),
                total_cycles.as_str(),
            ])?;
        }

        writer
            .into_inner()
            .map_err(|error| StateError::Io(error.into_error()))
    }

    pub fn stage(&self, path: &Path) -> Result<StagedFile> {
        StagedFile::stage(path, &self.encode()?)
    }

    /// Not locked: two update runs racing on one summary file lose an update.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.stage(path)?.commit()?;
        info!(path = %path.display(), suites = self.len(), "summary written");
        Ok(())
    }
}

/// Parses a count, accepting only the canonical decimal form so untouched
/// rows are re-emitted byte for byte.
fn parse_count(column: &str, raw: &str) -> std::result::Result<u64, String> {
    raw.parse::<u64>()
        .ok()
        .filter(|value| value.to_string() == raw)
        .ok_or_else(|| format!("`{column}` must be a non-negative integer, found `{raw}`"))
}

fn parse_row(record: &StringRecord) -> std::result::Result<(String, SummaryEntry), String> {
    if record.len() != SUMMARY_HEADER.len() {
        return Err(format!(
            "expected {} fields, found {}",
            SUMMARY_HEADER.len(),
            record.len()
        ));
    }

    let suite_path = &record[0];
    if suite_path.is_empty() {
        return Err("empty suite path".to_string());
    }
    let passing_count = parse_count(SUMMARY_HEADER[1], &record[1])?;
    let total_count = parse_count(SUMMARY_HEADER[2], &record[2])?;
    if passing_count > total_count {
        return Err(format!(
            "suite `{suite_path}` has {passing_count} passing of {total_count} total"
        ));
    }
    let total_cycles = match &record[3] {
        "" => None,
        raw => Some(parse_count(SUMMARY_HEADER[3], raw)?),
    };

    Ok((
        suite_path.to_string(),
        SummaryEntry {
            passing_count,
            total_count,
            total_cycles,
        },
    ))
}
