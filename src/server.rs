//! MCP server initialization for stdio and Streamable HTTP transports.
//!
//! [`serve`] picks the transport from `server.transport`; both entry points wire the
//! local store, the remote channel, and the MCP tool handler into a running server.

use anyhow::Result;
use rmcp::ServiceExt;
use std::sync::{Arc, Mutex};

use crate::tools::SmartSyncTools;
use smartsync::config::SmartSyncConfig;
use smartsync::db;
use smartsync::remote;
use smartsync::sync::{SyncCache, SyncSettings};

/// Open the local store, build the remote channel, and register tracked tables.
pub fn build_cache(config: &SmartSyncConfig) -> Result<Arc<SyncCache>> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    let remote = remote::create_channel(&config.remote)?;
    tracing::info!(kind = %config.remote.kind, database = %config.remote.database, "remote channel ready");

    let cache = SyncCache::new(
        Arc::new(Mutex::new(conn)),
        remote,
        SyncSettings::from_config(config),
    );
    cache.register_tracked(&config.sync.tracked_tables)?;

    Ok(Arc::new(cache))
}

/// Start the server on the configured transport.
pub async fn serve(config: SmartSyncConfig) -> Result<()> {
    match config.server.transport.as_str() {
        "stdio" => serve_stdio(config).await,
        "http" | "sse" => serve_http(config).await,
        other => anyhow::bail!("unknown transport: {other}. Supported: stdio, http"),
    }
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: SmartSyncConfig) -> Result<()> {
    tracing::info!("starting smartsync MCP server on stdio");

    let cache = build_cache(&config)?;

    let tools = SmartSyncTools::new(cache);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over Streamable HTTP transport.
pub async fn serve_http(config: SmartSyncConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    tracing::info!(addr = %bind_addr, "starting smartsync MCP server on HTTP");

    let cache = build_cache(&config)?;

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(SmartSyncTools::new(Arc::clone(&cache))),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}
