use clap::Parser;
use ingest_cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ingest_cli::init_tracing();
    let cli = Cli::parse();
    ingest_cli::run(cli).await
}
