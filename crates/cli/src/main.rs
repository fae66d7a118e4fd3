use std::process::ExitCode;

fn main() -> ExitCode {
    jobwire_cli::run()
}
