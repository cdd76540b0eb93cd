use std::process::ExitCode;

use clap::Parser;
use sherlock_cli::{Cli, describe_error, run};
use sherlock_telemetry::init_telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = init_telemetry(cli.log_format) {
        eprintln!("warning: {e}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("{}", describe_error(&e));
            ExitCode::FAILURE
        }
    }
}
