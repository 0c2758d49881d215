//! Configuration types and CLI/environment parsing for the server (spec §6
//! CLI, generalized from a bare `[port]` argv into a `clap` config carrying
//! the knobs the coordination layer actually needs).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::{Parser, ValueEnum};

/// The environment the service is running in.
///
/// Mirrors the teacher's `Environment` even though the core has no
/// dev-only collaborator to gate today; kept for parity and so a future
/// dev-only affordance (e.g. a debug endpoint) has somewhere to assert
/// against.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Environment {
    /// Production environment.
    Prod,
    /// Development environment.
    Dev,
}

impl Environment {
    /// Asserts that `Environment` is `dev`. Panics if not the case.
    pub fn assert_is_dev(&self) {
        assert!(matches!(self, Environment::Dev), "is not dev environment")
    }
}

/// The server's configuration. Configurable via environment variables or
/// command line arguments using `clap`.
#[derive(Parser, Debug, Clone)]
pub struct ServerConfig {
    /// The environment the server is running in.
    #[clap(long, env = "TRESOR_SERVER_ENVIRONMENT", default_value = "prod")]
    pub environment: Environment,

    /// The address to bind the listening socket to.
    #[clap(long, env = "TRESOR_SERVER_BIND_ADDR")]
    pub bind_addr: Option<IpAddr>,

    /// The port to listen on (spec §6: default `4435`).
    #[clap(long, env = "TRESOR_SERVER_PORT", default_value = "4435")]
    pub port: u16,

    /// Whether newly accepted connections must complete the encrypted
    /// (Diffie-Hellman key-exchange) handshake variant rather than the
    /// inline one (spec §4.E).
    #[clap(long, env = "TRESOR_SERVER_REQUIRE_ENCRYPTION")]
    pub require_encryption: bool,

    /// Maximum members (owners + registry members combined) a single
    /// userset may hold. Defaults to the wire format's hard cap
    /// ([`tresor_types::limits::MAX_MEMBERS`]); may be set lower, never
    /// higher.
    #[clap(long, env = "TRESOR_SERVER_MAX_MEMBERS")]
    pub max_members: Option<u8>,
}

impl ServerConfig {
    /// The socket address to bind, combining `bind_addr` (default
    /// `0.0.0.0`) and `port`.
    pub fn socket_addr(&self) -> SocketAddr {
        let ip = self
            .bind_addr
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::new(ip, self.port)
    }

    /// The effective userset member cap: `max_members`, or the wire
    /// format's hard limit if unset.
    pub fn effective_max_members(&self) -> u8 {
        self.max_members.unwrap_or(tresor_types::limits::MAX_MEMBERS)
    }
}
