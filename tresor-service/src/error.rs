//! The server's error taxonomy (spec §7): Protocol / Validation / Crypto /
//! Concurrency / Fatal.
//!
//! Only [`Error::Protocol`] and [`Error::Fatal`] ever terminate anything —
//! a `Protocol` error closes the one connection that raised it, `Fatal`
//! (not produced by this crate today; reserved for a future durable-storage
//! backend's I/O errors) would bring the whole server down. Every other
//! variant is rendered into an `ErrorResponse` and the connection stays
//! open, per §7's propagation policy.

use tresor_types::codec::CodecError;

/// Errors raised while handling one client connection or request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed frame, bad handshake, or any other failure of the
    /// transport itself. Fatal to the one connection.
    #[error(transparent)]
    Protocol(#[from] CodecError),

    /// The request referred to a user, userset, or operation that does not
    /// exist, or otherwise failed a precondition (wrong role, threshold out
    /// of range, userset too large). Rendered as `ErrorResponse`; the
    /// connection is kept open.
    #[error("{0}")]
    Validation(String),

    /// A username was already taken at signup.
    #[error("username {0:?} is already taken")]
    UsernameTaken(String),

    /// Login credentials did not match a stored account.
    #[error("invalid username or password")]
    InvalidCredentials,
}

impl Error {
    /// Renders this error as the free-form, non-machine-readable message
    /// carried by `ErrorResponse` (spec §7: "not part of the wire
    /// contract").
    pub fn to_message(&self) -> String {
        self.to_string()
    }
}
