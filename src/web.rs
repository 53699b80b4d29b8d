//! Web server for the `serve` command
//!
//! Serves a static directory; every request is captured on the way in.

use anyhow::Result;
use axum::Router;
use std::{net::SocketAddr, sync::Arc};
use tower_http::services::ServeDir;
use tracing::info;

use crate::capture::middleware::RequestLoggingLayer;
use crate::capture::write_buffer::WriteSender;
use crate::capture::RequestLogger;
use crate::config::Config;

/// Router serving `server.static_dir` behind the capture layer
pub fn router(config: &Config, logger: Arc<RequestLogger>, write_tx: WriteSender) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(&config.server.static_dir))
        .layer(RequestLoggingLayer::new(
            logger,
            write_tx,
            config.capture.max_form_bytes,
        ))
}

pub async fn start_server(
    config: &Config,
    logger: Arc<RequestLogger>,
    write_tx: WriteSender,
) -> Result<()> {
    let app = router(config, logger, write_tx);

    let addr = format!("{}:{}", config.server.host, config.server.http_port);
    info!(
        "Web server starting on http://{} (serving {})",
        addr,
        config.server.static_dir.display()
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
