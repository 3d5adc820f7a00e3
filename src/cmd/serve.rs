//! Run-control server - `checkup serve`.

use std::path::PathBuf;

use anyhow::Result;

use checkup::config::Config;
use checkup::server::{ServerConfig, start_server};

pub async fn cmd_serve(
    config: Config,
    host: Option<String>,
    port: Option<u16>,
    outputs_dir: Option<PathBuf>,
) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    let mut server = ServerConfig::new(config.worker_command()?);
    server.host = host.unwrap_or_else(|| config.server.host.clone());
    server.port = port.unwrap_or(config.server.port);
    server.outputs_dir = outputs_dir.unwrap_or_else(|| config.runs.outputs_dir.clone());
    server.cors = config.server.cors;
    server.stop_grace = config.stop_grace();
    server.poll_interval = config.poll_interval();
    server.notifier = config.build_notifier()?;

    tracing::info!(
        annotator = %config.annotator.kind,
        notify = server.notifier.is_some(),
        "starting run-control server"
    );
    start_server(server).await
}
