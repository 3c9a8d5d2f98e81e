//! Modweave CLI entry point.

use std::process::ExitCode;

fn main() -> ExitCode {
    match modweave::cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(modweave::cli::exit_code(&err))
        }
    }
}
