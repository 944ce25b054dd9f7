//! results-uploader - publish test results as a pull request
//!
//! Exits 0 when the run reaches DONE (including "nothing to publish") and 1
//! when it fails, printing the error kind and message to stderr.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use results_uploader::cli::commands::Cli;
use results_uploader::cli::publish;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for the result
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let request = match publish::load_request(&cli) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Error [{}]: {}", e.kind(), e);
            return 1;
        }
    };

    match publish::handle_publish(&request).await {
        Ok(outcome) => {
            publish::print_outcome(&outcome, cli.json);
            0
        }
        Err(failure) => {
            eprintln!(
                "Error [{}] during {}: {}",
                failure.kind(),
                failure.state,
                failure.source
            );
            1
        }
    }
}
