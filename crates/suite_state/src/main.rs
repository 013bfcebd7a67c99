#![forbid(unsafe_code)]

fn main() {
    let integration = suite_state::util::OutputIntegration::detect();
    if let Err(error) = suite_state::run_from_env() {
        // In JSON mode the report on stdout already carries the error.
        if !integration.should_emit_json() {
            eprintln!("{error}");
        }
        std::process::exit(error.exit_code());
    }
}
