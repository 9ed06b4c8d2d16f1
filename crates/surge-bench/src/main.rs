use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use surge_bench::cli::{parse_error_exit_code, Cli, OutputFormat};
use surge_bench::{HumanReporter, JsonReporter, Reporter, RunCoordinator, Summary};
use surge_client::StompConnector;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(parse_error_exit_code(&e));
        }
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(&cli.log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let config = cli.run_config().context("Invalid load test configuration")?;

    let coordinator = RunCoordinator::new(config.clone(), Arc::new(StompConnector::new()));
    let report = coordinator.run().await;
    let summary = Summary::collect(&config, &report);

    let rendered = match cli.format {
        OutputFormat::Human => HumanReporter.render(&summary)?,
        OutputFormat::Json => JsonReporter.render(&summary)?,
    };
    println!("\n{}", rendered);

    Ok(())
}
