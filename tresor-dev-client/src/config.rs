//! Command-line surface for the dev client, following
//! `oprf-dev-client/src/config.rs`'s shape: a top-level `clap::Parser`
//! config carrying the connection knobs every subcommand needs, plus a
//! `Command` enum of the things it can actually do.

use std::net::SocketAddr;

use clap::{Parser, Subcommand};

/// A reference client for poking at a running `tresor-server` by hand —
/// not the full interactive menu client a real profile-holding user would
/// run, just enough to exercise every protocol operation from a shell.
#[derive(Parser, Debug, Clone)]
pub struct DevClientConfig {
    /// Address of the server to connect to.
    #[clap(long, env = "TRESOR_DEV_CLIENT_SERVER_ADDR", default_value = "127.0.0.1:4435")]
    pub server_addr: SocketAddr,

    /// Complete the encrypted handshake variant instead of the inline one.
    #[clap(long, env = "TRESOR_DEV_CLIENT_REQUIRE_ENCRYPTION")]
    pub require_encryption: bool,

    /// The operation to run.
    #[clap(subcommand)]
    pub command: Command,
}

/// One dev-client operation.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Registers a new account.
    Signup {
        /// Account username.
        username: String,
        /// Account password.
        password: String,
    },
    /// Logs in, then immediately logs out — useful as a credentials check.
    Login {
        /// Account username.
        username: String,
        /// Account password.
        password: String,
    },
    /// Creates a userset and prints its id.
    MakeUserset {
        /// Account username to authenticate as (must already exist).
        username: String,
        /// Account password.
        password: String,
        /// Owner usernames (the caller is folded in server-side even if
        /// omitted here).
        #[clap(long, value_delimiter = ',')]
        owners: Vec<String>,
        /// Registry member usernames.
        #[clap(long, value_delimiter = ',')]
        reg_members: Vec<String>,
        /// Owner-layer reconstruction threshold.
        #[clap(long)]
        owners_threshold: u8,
        /// Registry-layer reconstruction threshold.
        #[clap(long)]
        reg_members_threshold: u8,
    },
    /// Lists the usersets an account belongs to.
    GetUsersets {
        /// Account username.
        username: String,
        /// Account password.
        password: String,
    },
    /// Drains an account's update queue and prints every record.
    Update {
        /// Account username.
        username: String,
        /// Account password.
        password: String,
    },
    /// Runs a minimal two-party (one owner/registry-member pair) signup
    /// through decrypt flow end to end against a live server, printing the
    /// recovered plaintext.
    Demo {
        /// The message to encrypt and collaboratively decrypt.
        #[clap(default_value = "hello from the dev client")]
        message: String,
    },
    /// Runs many independent two-party flows concurrently and reports
    /// timing, mirroring `oprf-dev-client`'s stress-test command.
    StressTest(StressTestCommand),
}

/// Arguments for [`Command::StressTest`].
#[derive(clap::Args, Debug, Clone)]
pub struct StressTestCommand {
    /// Number of concurrent end-to-end rounds to run.
    #[clap(long, default_value = "8")]
    pub rounds: usize,
    /// Length in bytes of the message each round encrypts and decrypts.
    #[clap(long, default_value = "64")]
    pub message_len: usize,
}
