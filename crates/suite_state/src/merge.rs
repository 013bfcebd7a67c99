use tracing::debug;

use crate::model::{SuiteState, TestResult};

/// Which stage wins when a test is both uncompiled and executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePrecedence {
    /// A missing artifact overrides any execution record for the same test.
    #[default]
    Compilation,
    /// The execution record overrides the compilation failure.
    Execution,
}

/// Unions compilation failures and execution results into one state.
///
/// Every name from either input appears in the output exactly once.
#[must_use]
pub fn merge_results(
    compilation_failures: SuiteState,
    executions: SuiteState,
    precedence: MergePrecedence,
) -> SuiteState {
    let mut merged = executions;
    for (name, outcome) in compilation_failures.iter() {
        if let Some(executed) = merged.get(name) {
            debug!(
                test = name,
                executed = %executed,
                compiled = %outcome,
                ?precedence,
                "test is both uncompiled and executed"
            );
            if precedence == MergePrecedence::Execution {
                continue;
            }
        }
        merged.insert(TestResult::new(name, outcome));
    }
    merged
}
