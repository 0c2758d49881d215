#![deny(missing_docs)]
//! Shared data model and wire protocol types for the threshold-decryption
//! messaging service.
//!
//! - [`ids`] – newtype identifiers (`UserSetId`, `OperationId`, `ShardId`).
//! - [`userset`] / [`update`] – the data model. An in-flight decryption
//!   operation has no standalone public record of its own: its state lives
//!   server-side in `tresor_service::services::operations`, and what a
//!   client ever sees of one arrives piecemeal through `Update` drains
//!   ([`update::UpdateRecord`]) and the `Decrypt`/`SendLayerPart` packets.
//! - [`wire`] – the normative binary encoding and the `wire_struct!` macro
//!   generating it mechanically per packet.
//! - [`api::v1`] – the closed `Packet`/`PacketCode` enums.
//! - [`limits`] – fixed numeric limits baked into the wire format.
//! - [`codec`] – the framed, optionally-encrypted transport and its
//!   handshake, shared by client and server so the two can never drift.

pub mod api;
pub mod codec;
pub mod ids;
pub mod limits;
pub mod update;
pub mod userset;
pub mod wire;
