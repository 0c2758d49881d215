//! The coordination server binary: parses a [`tresor_service::config::ServerConfig`],
//! wires it to an in-memory [`tresor_service::services::storage::InMemoryStorage`],
//! and drives [`tresor_service::Server::serve`] until told to stop.
//!
//! Shutdown follows spec §6's CLI contract: the literal line `stop` on
//! stdin. A `Ctrl-C` also cancels, since `oprf-service-example`'s
//! cancellation-token-driven shape reacts to both an external signal and
//! its own internal drivers and there is no reason a raw-TCP server should
//! be harder to kill than an axum one.

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use tresor_service::config::ServerConfig;
use tresor_service::services::storage::InMemoryStorage;
use tresor_service::Server;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::parse();
    tracing::info!(?config, "starting tresor-server");

    let storage = Arc::new(InMemoryStorage::new());
    let server = Server::new(config, storage);

    let cancellation_token = CancellationToken::new();
    let stdin_token = cancellation_token.clone();
    tokio::spawn(async move {
        wait_for_stop_line(stdin_token).await;
    });

    let ctrl_c_token = cancellation_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received ctrl-c, shutting down");
            ctrl_c_token.cancel();
        }
    });

    server.serve(cancellation_token).await?;
    tracing::info!("good night!");
    Ok(())
}

/// Reads lines from stdin, cancelling `token` once it sees the literal line
/// `stop` (spec §6). Stdin closing (EOF) also cancels, so a server run
/// under a process supervisor that redirects stdin from `/dev/null` does
/// not hang forever waiting for a line that will never come.
async fn wait_for_stop_line(token: CancellationToken) {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim() == "stop" => {
                tracing::info!("received 'stop' on stdin, shutting down");
                token.cancel();
                return;
            }
            Ok(Some(_)) => continue,
            Ok(None) => {
                tracing::debug!("stdin closed, shutting down");
                token.cancel();
                return;
            }
            Err(err) => {
                tracing::warn!("error reading stdin: {err}");
                token.cancel();
                return;
            }
        }
    }
}
