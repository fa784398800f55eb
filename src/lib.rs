pub mod config;
pub mod logging;
pub mod print;
pub mod storage;

use std::sync::Arc;

use dimse::{DimseScp, FileLogSink, LogSink, NullLogSink};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::print::PrintProviderFactory;
use crate::storage::create_print_store;

/// Build the print SCP for `printer` without binding it
pub fn build_scp(config: &Config, printer: Option<&str>) -> anyhow::Result<DimseScp> {
    let (printer_name, printer_config) = config.printer(printer)?;
    let store = create_print_store(&config.storage)?;

    let log_sink: Arc<dyn LogSink> = match &config.logging.dimse_log_dir {
        Some(dir) => Arc::new(FileLogSink::new(dir.clone())),
        None => Arc::new(NullLogSink),
    };

    tracing::info!(
        "🖨️ Serving printer '{}' as {} ({} storage)",
        printer_name,
        config.scp.local_aet,
        config.storage.backend
    );

    let factory = Arc::new(PrintProviderFactory::new(printer_name, printer_config, store));
    Ok(DimseScp::new(config.scp.clone(), factory).with_log_sink(log_sink))
}

/// Serve until `shutdown` is cancelled or a shutdown association arrives
pub async fn run(config: Config, printer: Option<&str>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let scp = build_scp(&config, printer)?.with_shutdown(shutdown);

    tracing::info!(
        "🚀 Starting print SCP on {}:{}",
        config.scp.bind_addr,
        config.scp.port
    );
    scp.run().await?;
    tracing::info!("Print SCP stopped");
    Ok(())
}
