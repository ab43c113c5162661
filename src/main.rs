// ABOUTME: Entry point for the conductor binary
// ABOUTME: Parses arguments, loads configuration and maps the outcome to an exit code

use anyhow::Result;
use conductor::cli::{App, Args};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse_args();
    let app = App::from_args(&args)?;

    if app.run(args).await? {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
