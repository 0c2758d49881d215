//! Core services making up the coordination server.
//!
//! Each service encapsulates one piece of shared, lock-guarded state and is
//! cheap to clone (an `Arc` handle), following `oprf-service::services`'s
//! layout.
//!
//! # Services overview
//!
//! - [`storage`] – the `ServerStorage` trait and its in-memory implementation.
//! - [`users`] – signup/login against storage.
//! - [`usersets`] – the make-userset flow: key generation, Shamir sharing,
//!   shard-id assignment.
//! - [`operations`] – the decryption coordination state machine
//!   (prepare/lookup/collect/finish).
//! - [`updates`] – the per-user update-queue mailbox.

pub mod operations;
pub mod storage;
pub mod updates;
pub mod users;
pub mod usersets;
