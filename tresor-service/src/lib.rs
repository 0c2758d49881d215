#![deny(missing_docs)]
//! The coordination server: account management, userset creation, and the
//! threshold-decryption state machine, spoken over a framed TCP protocol
//! (spec §4, §5).
//!
//! The entry point is [`Server`]: build one from a [`config::ServerConfig`]
//! and a storage backend, then [`Server::serve`] it with a
//! `tokio_util::sync::CancellationToken` to drive the accept loop and its
//! graceful shutdown, following `oprf-service-example`'s
//! cancellation-token-driven `axum::serve(...).with_graceful_shutdown(...)`
//! shape — generalized here from one `axum::serve` future to a raw
//! `tokio::net::TcpListener` accept loop, since this protocol has no HTTP
//! server to delegate shutdown to.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub mod config;
pub mod conn;
pub mod error;
pub mod metrics;
pub mod services;

use config::ServerConfig;
use conn::Services;
use services::operations::Operations;
use services::storage::ServerStorage;
use services::updates::Updates;
use services::users::Users;
use services::usersets::UserSets;

/// The coordination server. Build with [`Server::new`], run with
/// [`Server::serve`].
pub struct Server {
    config: ServerConfig,
    services: Services,
}

impl Server {
    /// Wires every service to `storage` and the configuration's
    /// `max_members` cap.
    pub fn new(config: ServerConfig, storage: Arc<dyn ServerStorage>) -> Self {
        let updates = Updates::new();
        let services = Services {
            users: Users::new(storage.clone()),
            usersets: UserSets::new(storage.clone(), updates.clone()),
            operations: Operations::new(),
            updates,
            max_members: config.effective_max_members(),
            storage,
        };
        Self { config, services }
    }

    /// Binds the configured address and drives the accept loop until
    /// `cancellation_token` fires, at which point no further connections
    /// are accepted and every in-flight connection task is joined before
    /// returning (spec §5: "a server shutdown forces all listening and
    /// client sockets closed and joins all per-connection tasks before
    /// returning").
    pub async fn serve(self, cancellation_token: CancellationToken) -> eyre::Result<()> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(addr).await?;
        self.serve_on(listener, cancellation_token).await
    }

    /// Like [`Server::serve`], but drives the accept loop on an
    /// already-bound listener rather than binding `config`'s address
    /// itself. Lets a caller bind an ephemeral port (`127.0.0.1:0`) and
    /// read back its resolved address before the accept loop starts
    /// running — the shape an in-process test harness needs and a CLI
    /// binary never does.
    pub async fn serve_on(
        self,
        listener: TcpListener,
        cancellation_token: CancellationToken,
    ) -> eyre::Result<()> {
        metrics::describe_metrics();
        let addr = listener.local_addr()?;
        tracing::info!(%addr, "listening");

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            spawn_connection(&mut connections, stream, peer, &self);
                        }
                        Err(err) => tracing::warn!("failed to accept connection: {err}"),
                    }
                }
                () = cancellation_token.cancelled() => {
                    tracing::info!("shutting down: no longer accepting connections");
                    break;
                }
            }
        }
        drop(listener);

        while connections.join_next().await.is_some() {}
        tracing::info!("all connections closed");
        Ok(())
    }
}

fn spawn_connection(
    connections: &mut JoinSet<()>,
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    server: &Server,
) {
    let services = server.services.clone();
    let require_encryption = server.config.require_encryption;
    connections.spawn(async move {
        conn::handle_connection(stream, peer, services, require_encryption).await;
    });
}
