//! Cryptographic core of the threshold-decryption messaging service.
//!
//! This crate is transport- and protocol-agnostic: it knows nothing about
//! usernames, connections, or wire framing. It provides:
//!
//! - [`group`] – the NIST P-256 EC group (scalars and points).
//! - [`aes`] – AES1L, the symmetric primitive protecting message bodies.
//! - [`hkdf`] – ECHKDF1L/ECHKDF2L, deriving AES keys from DH shared points.
//! - [`pbkdf2`] – the KDF protecting a client's profile file at rest.
//! - [`elgamal`] – two-layer hybrid ElGamal encryption/decryption.
//! - [`shamir`] – Shamir secret sharing and threshold partial decryption.

pub mod aes;
pub mod elgamal;
pub mod group;
pub mod hkdf;
pub mod pbkdf2;
pub mod shamir;
