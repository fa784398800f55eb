use clap::Parser;
use printscp::config::{Cli, Config};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    printscp::logging::init(&config.logging, cli.log_level_override())?;

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
            on_signal.cancel();
        }
    });

    printscp::run(config, cli.printer.as_deref(), shutdown).await
}
