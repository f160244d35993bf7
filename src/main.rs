//! Reembed CLI entry point.

use clap::Parser;

use reembed::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = reembed::cli::run(cli).await {
        reembed::cli::handle_error(err, json);
    }
}
