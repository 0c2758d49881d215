//! Shared in-process harness for end-to-end scenario tests against a real
//! `tresor-server`, grounded on `oprf-test/tests/tests.rs`'s shape: spin up
//! real infrastructure inside a `#[tokio::test]`, drive it over a real
//! transport, assert the outcome. There, the infrastructure is a local
//! Anvil chain plus a cluster of OPRF service processes reached over
//! websockets; here it is one [`tresor_service::Server`] bound to an
//! ephemeral loopback port and reached over plain TCP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tresor_client::{Applied, Client, ParticipateOutcome, ShardBook};
use tresor_service::config::{Environment, ServerConfig};
use tresor_service::services::storage::InMemoryStorage;
use tresor_service::Server;
use tresor_types::ids::OperationId;

/// A `tresor-server` instance running in a background task, bound to an
/// ephemeral loopback port.
pub struct RunningServer {
    /// The address the server accepted its listening socket on.
    pub addr: SocketAddr,
    cancellation_token: CancellationToken,
    task: JoinHandle<eyre::Result<()>>,
}

impl RunningServer {
    /// Cancels the accept loop and waits for every in-flight connection
    /// task to join (spec §5's graceful-shutdown guarantee), then
    /// propagates the server task's result.
    pub async fn shutdown(self) -> eyre::Result<()> {
        self.cancellation_token.cancel();
        self.task.await.expect("server task panicked")
    }
}

/// Starts a server with default settings (inline codec, no member cap
/// beyond the wire format's own limit) on an ephemeral port.
pub async fn spawn_server() -> RunningServer {
    spawn_server_with(false, None).await
}

/// Starts a server with the given encryption requirement and member cap.
pub async fn spawn_server_with(require_encryption: bool, max_members: Option<u8>) -> RunningServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("binding an ephemeral loopback port never fails");
    let addr = listener
        .local_addr()
        .expect("a bound listener always has a local address");

    let config = ServerConfig {
        environment: Environment::Dev,
        bind_addr: None,
        port: 0,
        require_encryption,
        max_members,
    };
    let storage = Arc::new(InMemoryStorage::new());
    let server = Server::new(config, storage);

    let cancellation_token = CancellationToken::new();
    let serve_token = cancellation_token.clone();
    let task = tokio::spawn(async move { server.serve_on(listener, serve_token).await });

    RunningServer {
        addr,
        cancellation_token,
        task,
    }
}

/// Connects, signs up, and logs in a fresh account in one call — the
/// boilerplate every scenario test repeats for each party.
pub async fn signed_up_client(
    addr: SocketAddr,
    require_encryption: bool,
    username: &str,
    password: &str,
) -> Client {
    let mut client = Client::connect(addr, require_encryption)
        .await
        .expect("connect");
    client.signup(username, password).await.expect("signup");
    client.login(username, password).await.expect("login");
    client
}

/// Drains `client`'s update queue purely to fold newly learned shard
/// material (`AddedAsMember`/`AddedAsOwner`) into `book`, ignoring any
/// other record kind. Used right after `make_userset` to learn the
/// creator's own shards, and by any other party that just needs to catch
/// up before acting as an initiator.
pub async fn learn_shards(client: &mut Client, book: &mut ShardBook) -> eyre::Result<()> {
    for record in client.update().await? {
        book.apply(record);
    }
    Ok(())
}

/// Drains `client`'s update queue, folding every record into `book`, and
/// answers any `ShouldParticipate` outcome by computing and submitting the
/// partial decryption directly. Leaves non-participation records (newly
/// learned shards, `ToDecrypt` notices) applied but otherwise untouched.
pub async fn drain_and_participate(client: &mut Client, book: &mut ShardBook) -> eyre::Result<()> {
    for record in client.update().await? {
        if let Applied::ShouldParticipate(op_id) = book.apply(record) {
            match client.decrypt_participate(op_id).await? {
                ParticipateOutcome::RegLayer(send) => {
                    client.contribute(book, &send, false).await?;
                }
                ParticipateOutcome::OwnerLayer(send) => {
                    client.contribute(book, &send, true).await?;
                }
                ParticipateOutcome::NotRequired => {}
            }
        }
    }
    Ok(())
}

/// Polls `client`'s update queue until it sees a `FinishedDecryption` for
/// `op_id`, folding every other record into `book` along the way. Intended
/// for the operation's initiator, who is never asked to participate in its
/// own operation over the wire (spec §4.D "Join").
pub async fn wait_for_finish(client: &mut Client, book: &mut ShardBook, op_id: OperationId) -> eyre::Result<Applied> {
    loop {
        let records = client.update().await?;
        if records.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
            continue;
        }
        for record in records {
            let applied = book.apply(record);
            if let Applied::Finished {
                op_id: finished_id, ..
            } = &applied
            {
                if *finished_id == op_id {
                    return Ok(applied);
                }
            }
        }
    }
}
