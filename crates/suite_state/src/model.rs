use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

/// Closed status vocabulary as written to baselines and by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
pub enum Status {
    #[serde(rename = "pass")]
    Pass,
    #[serde(rename = "fail")]
    Fail,
    #[serde(rename = "runtime error")]
    RuntimeError,
    #[serde(rename = "compilation failed")]
    CompilationFailed,
}

impl Status {
    pub const ALL: [Self; 4] = [
        Self::Pass,
        Self::Fail,
        Self::RuntimeError,
        Self::CompilationFailed,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::RuntimeError => "runtime error",
            Self::CompilationFailed => "compilation failed",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == raw)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one test, carrying the cycle count only when it passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Pass { cycles: u64 },
    Fail,
    RuntimeError,
    CompilationFailed,
}

impl Outcome {
    #[must_use]
    pub const fn status(self) -> Status {
        match self {
            Self::Pass { .. } => Status::Pass,
            Self::Fail => Status::Fail,
            Self::RuntimeError => Status::RuntimeError,
            Self::CompilationFailed => Status::CompilationFailed,
        }
    }

    #[must_use]
    pub const fn cycles(self) -> Option<u64> {
        match self {
            Self::Pass { cycles } => Some(cycles),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_pass(self) -> bool {
        matches!(self, Self::Pass { .. })
    }

    /// Builds an outcome from a status and an optional cycle count.
    ///
    /// Returns `None` when the pair breaks the cycle invariant: a pass
    /// without cycles, or cycles on anything but a pass.
    #[must_use]
    pub const fn from_parts(status: Status, cycles: Option<u64>) -> Option<Self> {
        match (status, cycles) {
            (Status::Pass, Some(cycles)) => Some(Self::Pass { cycles }),
            (Status::Fail, None) => Some(Self::Fail),
            (Status::RuntimeError, None) => Some(Self::RuntimeError),
            (Status::CompilationFailed, None) => Some(Self::CompilationFailed),
            _ => None,
        }
    }

    /// Builds an outcome, dropping a cycle count attached to a non-pass status.
    #[must_use]
    pub const fn normalized(status: Status, cycles: Option<u64>) -> Option<Self> {
        match status {
            Status::Pass => Self::from_parts(status, cycles),
            _ => Self::from_parts(status, None),
        }
    }
}

/// `pass,120` for passing tests, the bare status otherwise.
impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass { cycles } => write!(f, "{},{cycles}", Status::Pass),
            other => f.write_str(other.status().as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestResult {
    pub name: String,
    pub outcome: Outcome,
}

impl TestResult {
    #[must_use]
    pub fn new(name: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            name: name.into(),
            outcome,
        }
    }

    #[must_use]
    pub fn compilation_failed(name: impl Into<String>) -> Self {
        Self::new(name, Outcome::CompilationFailed)
    }
}

/// One suite's results keyed by test name, always iterated in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuiteState {
    results: BTreeMap<String, Outcome>,
}

impl SuiteState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a result, returning the outcome previously stored under its name.
    pub fn insert(&mut self, result: TestResult) -> Option<Outcome> {
        self.results.insert(result.name, result.outcome)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Outcome> {
        self.results.get(name).copied()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.results.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Outcome)> + '_ {
        self.results
            .iter()
            .map(|(name, outcome)| (name.as_str(), *outcome))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.results.keys().map(String::as_str)
    }

    #[must_use]
    pub fn passing_count(&self) -> usize {
        self.results
            .values()
            .filter(|outcome| outcome.is_pass())
            .count()
    }

    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.results
            .values()
            .filter_map(|outcome| outcome.cycles())
            .fold(0_u64, u64::saturating_add)
    }
}

impl FromIterator<TestResult> for SuiteState {
    fn from_iter<I: IntoIterator<Item = TestResult>>(iter: I) -> Self {
        let mut state = Self::new();
        for result in iter {
            state.insert(result);
        }
        state
    }
}
