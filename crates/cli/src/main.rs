use std::process::ExitCode;

fn main() -> ExitCode {
    estimator_cli::run()
}
