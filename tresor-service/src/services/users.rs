//! `Users`: signup/login against [`ServerStorage`], plus the metrics that
//! accompany each outcome.
//!
//! Grounded on `examples/original_source/senc/server/storage/IServerStorage.hpp`'s
//! `new_user`/`user_has_password`, thin enough that this module is mostly
//! about where the `metrics` calls live — following `oprf-service`'s
//! pattern of recording a counter right where the outcome is decided
//! (`oprf-service/src/api/oprf.rs`'s `METRICS_ID_NODE_OPRF_SUCCESS`).

use std::sync::Arc;

use crate::error::Error;
use crate::metrics::{
    METRICS_ID_LOGIN_FAILURE, METRICS_ID_LOGIN_SUCCESS, METRICS_ID_SIGNUP_SUCCESS,
    METRICS_ID_SIGNUP_TAKEN,
};
use crate::services::storage::{ServerStorage, StorageError};

/// The account service. Cheap to clone.
#[derive(Clone)]
pub struct Users {
    storage: Arc<dyn ServerStorage>,
}

impl Users {
    /// Wires the service to its storage collaborator.
    pub fn new(storage: Arc<dyn ServerStorage>) -> Self {
        Self { storage }
    }

    /// Registers a new account. Maps a taken username to
    /// [`Error::UsernameTaken`].
    pub fn signup(&self, username: &str, password: &str) -> Result<(), Error> {
        match self.storage.new_user(username, password) {
            Ok(()) => {
                metrics::counter!(METRICS_ID_SIGNUP_SUCCESS).increment(1);
                Ok(())
            }
            Err(StorageError::UserExists(username)) => {
                metrics::counter!(METRICS_ID_SIGNUP_TAKEN).increment(1);
                Err(Error::UsernameTaken(username))
            }
            Err(other) => Err(Error::Validation(other.to_string())),
        }
    }

    /// Authenticates `username`/`password`. Never distinguishes "unknown
    /// user" from "wrong password" to the caller (both collapse to
    /// [`Error::InvalidCredentials`]).
    pub fn login(&self, username: &str, password: &str) -> Result<(), Error> {
        if self.storage.check_password(username, password) {
            metrics::counter!(METRICS_ID_LOGIN_SUCCESS).increment(1);
            Ok(())
        } else {
            metrics::counter!(METRICS_ID_LOGIN_FAILURE).increment(1);
            Err(Error::InvalidCredentials)
        }
    }
}
