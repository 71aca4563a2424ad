use std::sync::Arc;

use crate::config::ScanConfig;
use crate::server::{ScanServer, ServerConfig};

/// Run the HTTP scan server until interrupted.
pub fn handle_server(port: u16, host: String, config: ScanConfig) -> crate::Result<()> {
    let server = ScanServer::new(ServerConfig::new().port(port).host(host), Arc::new(config));

    // scans block; request handlers hand them to the blocking pool
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(server.run())?;
    Ok(())
}
