use anyhow::{Context, Result};
use geoipd::config::ServiceConfig;
use geoipd::server::{shutdown_signal, Server};
use geoipd::{Database, GeoIpService};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::DatabaseArgs;

pub fn cmd_serve(db: &DatabaseArgs, listen: SocketAddr, language: String) -> Result<()> {
    let config = ServiceConfig::new(db.resolve()?)
        .with_listen(listen)
        .with_language(language);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(serve(config))
}

async fn serve(config: ServiceConfig) -> Result<()> {
    // Open before binding: a bad database must never start serving
    let db = Database::open(&config.database)
        .with_context(|| format!("Failed to load database: {}", config.database.display()))?;
    let service = GeoIpService::new(Arc::new(db)).with_language(config.language);

    let db = service.database();
    let metadata = db.metadata();
    info!(
        path = %config.database.display(),
        database_type = %metadata.database_type,
        ip_version = metadata.ip_version.number(),
        record_size = metadata.record_size.bits(),
        node_count = metadata.node_count,
        build_epoch = metadata.build_epoch,
        mmap = db.is_mmap(),
        language = service.language(),
        "database loaded"
    );

    let server = Server::bind(config.listen, Arc::new(service))
        .await
        .with_context(|| format!("Failed to listen on {}", config.listen))?;

    server.run_until(shutdown_signal()).await?;
    info!("server stopped");
    Ok(())
}
