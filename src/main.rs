use anyhow::Result;
use clap::Parser;
use datasette_llm_lib::{cli::Cli, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    telemetry::init_logging(&config.logging);
    cli.run(config).await
}
