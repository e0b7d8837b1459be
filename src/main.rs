use anyhow::Result;
use auriga::cli::{Cli, run};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))
}
