use std::process::ExitCode;

fn main() -> ExitCode {
    forcage_cli::run()
}
