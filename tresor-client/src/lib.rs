#![deny(missing_docs)]
//! Client library for the threshold-decryption messaging service.
//!
//! [`Client`] drives one TCP connection through the handshake and the
//! request/response protocol of `tresor_types::api::v1`, mirroring
//! `oprf-client/src/lib.rs`'s shape (one async method per protocol step,
//! a `thiserror` `Error` enum) adapted from a websocket-per-service fan-out
//! to a single plain-TCP connection to one server.
//!
//! [`shards::ShardBook`] tracks the Shamir shards this client has learned
//! about through `Update` records, so it can carry out the local
//! cryptographic work (computing a partial decryption, combining the
//! initiator's own contribution with the parts the server collected) that
//! the protocol leaves to the client (spec §4.D "Join", §6).
//!
//! [`profile`] implements the client-side profile-at-rest file format
//! (spec §6) on top of [`tresor_core::aes`] and [`tresor_core::pbkdf2`].

use std::net::SocketAddr;

use tokio::net::TcpStream;

use tresor_core::elgamal::{Ciphertext, ElGamalError};
use tresor_core::group::{GroupError, Point};
use tresor_core::shamir::{self, Part, ShamirError};
use tresor_types::api::v1::{
    DecryptParticipateRequest, DecryptParticipateStatus, DecryptRequest, DecryptResponse,
    ErrorResponse, GetMembersRequest, GetMembersResponse, GetUserSetsRequest, GetUserSetsResponse,
    LoginRequest, LoginResponse, LogoutRequest, LogoutResponse, MakeUserSetRequest,
    MakeUserSetResponse, Packet, SendDecryptionPartRequest, SendDecryptionPartResponse,
    SendLayerPart, SignupRequest, SignupResponse, UpdateRequest, UpdateResponse,
};
use tresor_types::codec::{Codec, CodecError};
use tresor_types::ids::{OperationId, ShardId, UserSetId};
use tresor_types::update::UpdateRecord;

pub mod profile;
pub mod shards;

pub use shards::{Applied, OwnedShards, ShardBook};

/// Errors returned by this crate's client-side operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport, handshake, or framing failed.
    #[error(transparent)]
    Protocol(#[from] CodecError),
    /// The server returned an `ErrorResponse`.
    #[error("server rejected the request: {0}")]
    Rejected(String),
    /// The server's response did not match the request that was sent.
    #[error("unexpected response packet")]
    UnexpectedResponse,
    /// Local EC group arithmetic failed (malformed point from the server).
    #[error(transparent)]
    Group(#[from] GroupError),
    /// Local ElGamal decryption failed.
    #[error(transparent)]
    ElGamal(#[from] ElGamalError),
    /// Local Shamir combination failed (duplicate or reserved shard id).
    #[error(transparent)]
    Shamir(#[from] ShamirError),
    /// A decryption finished without this client holding a shard for the
    /// layer it needs to contribute to — it never initiated this operation
    /// and has no own-contribution to add.
    #[error("no local shard known for userset {0}")]
    MissingShard(UserSetId),
}

/// The outcome of asking to participate in a decryption operation (spec
/// §4.F.4 "Lookup").
#[derive(Debug, Clone)]
pub enum ParticipateOutcome {
    /// The registry layer needs this shard's partial decryption.
    RegLayer(SendLayerPart),
    /// The owner layer needs this shard's partial decryption.
    OwnerLayer(SendLayerPart),
    /// Nothing further is needed from this connection for this operation.
    NotRequired,
}

/// One authenticated (or about-to-authenticate) connection to the server.
pub struct Client {
    stream: TcpStream,
    codec: Codec,
}

impl Client {
    /// Connects to `addr`, runs the version handshake, and — if
    /// `require_encryption` — the DH key exchange establishing an AES1L
    /// session key (spec §4.E). The connection is unauthenticated until
    /// [`Client::signup`] or [`Client::login`] succeeds.
    pub async fn connect(addr: SocketAddr, require_encryption: bool) -> Result<Self, Error> {
        let mut stream = TcpStream::connect(addr).await.map_err(CodecError::from)?;
        tresor_types::codec::client_handshake(&mut stream).await?;
        let codec = if require_encryption {
            let key = tresor_types::codec::client_key_exchange(&mut stream).await?;
            Codec::Encrypted { key }
        } else {
            Codec::Inline
        };
        Ok(Self { stream, codec })
    }

    async fn roundtrip(&mut self, packet: Packet) -> Result<Packet, Error> {
        self.codec.write_packet(&mut self.stream, &packet).await?;
        let response = self.codec.read_packet(&mut self.stream).await?;
        if let Packet::ErrorResponse(ErrorResponse { message }) = response {
            return Err(Error::Rejected(message));
        }
        Ok(response)
    }

    /// Registers a new account (spec §4.F.2 stage 2).
    pub async fn signup(&mut self, username: &str, password: &str) -> Result<(), Error> {
        let req = Packet::SignupRequest(SignupRequest {
            username: username.to_owned(),
            password: password.to_owned(),
        });
        match self.roundtrip(req).await? {
            Packet::SignupResponse(SignupResponse {}) => Ok(()),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    /// Authenticates an existing account on this connection.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), Error> {
        let req = Packet::LoginRequest(LoginRequest {
            username: username.to_owned(),
            password: password.to_owned(),
        });
        match self.roundtrip(req).await? {
            Packet::LoginResponse(LoginResponse {}) => Ok(()),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    /// Ends the authenticated session. The server always acknowledges and
    /// closes the connection afterward; any transport error on the final
    /// read is not treated as a failure of the logout itself.
    pub async fn logout(&mut self) -> Result<(), Error> {
        let req = Packet::LogoutRequest(LogoutRequest {});
        self.codec.write_packet(&mut self.stream, &req).await?;
        let _ = self.codec.read_packet(&mut self.stream).await;
        Ok(())
    }

    /// Creates a new userset (spec §4.F.3). The caller is always folded
    /// into `owners` server-side; its own shards arrive later through
    /// [`Client::update`].
    pub async fn make_userset(
        &mut self,
        owners: Vec<String>,
        reg_members: Vec<String>,
        owners_threshold: u8,
        reg_members_threshold: u8,
    ) -> Result<UserSetId, Error> {
        let req = Packet::MakeUserSetRequest(MakeUserSetRequest {
            reg_members,
            owners,
            reg_members_threshold,
            owners_threshold,
        });
        match self.roundtrip(req).await? {
            Packet::MakeUserSetResponse(MakeUserSetResponse { user_set_id }) => Ok(user_set_id),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    /// Lists the usersets this account belongs to.
    pub async fn get_usersets(&mut self) -> Result<Vec<UserSetId>, Error> {
        let req = Packet::GetUserSetsRequest(GetUserSetsRequest {});
        match self.roundtrip(req).await? {
            Packet::GetUserSetsResponse(GetUserSetsResponse { user_set_ids }) => Ok(user_set_ids),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    /// Looks up a userset's membership lists.
    pub async fn get_members(
        &mut self,
        user_set_id: UserSetId,
    ) -> Result<GetMembersResponse, Error> {
        let req = Packet::GetMembersRequest(GetMembersRequest { user_set_id });
        match self.roundtrip(req).await? {
            Packet::GetMembersResponse(resp) => Ok(resp),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    /// Initiates collaborative decryption of `ciphertext` (owner-only,
    /// spec §4.F.4 "Preparation"). Returns the new operation's id; the
    /// result arrives later through [`Client::update`] as a
    /// `FinishedDecryption` record.
    pub async fn decrypt(
        &mut self,
        user_set_id: UserSetId,
        ciphertext: Ciphertext,
    ) -> Result<OperationId, Error> {
        let req = Packet::DecryptRequest(DecryptRequest {
            user_set_id,
            ciphertext,
        });
        match self.roundtrip(req).await? {
            Packet::DecryptResponse(DecryptResponse { op_id }) => Ok(op_id),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    /// Drains this account's update queue (spec §4.F.2 stage 3).
    pub async fn update(&mut self) -> Result<Vec<UpdateRecord>, Error> {
        let req = Packet::UpdateRequest(UpdateRequest {});
        match self.roundtrip(req).await? {
            Packet::UpdateResponse(UpdateResponse { records }) => Ok(records),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    /// Volunteers this connection's shard(s) toward `op_id`'s
    /// reconstruction set (spec §4.F.4 "Lookup").
    pub async fn decrypt_participate(
        &mut self,
        op_id: OperationId,
    ) -> Result<ParticipateOutcome, Error> {
        let req = Packet::DecryptParticipateRequest(DecryptParticipateRequest { op_id });
        match self.roundtrip(req).await? {
            Packet::DecryptParticipateResponse(DecryptParticipateStatus::SendRegLayerPart(part)) => {
                Ok(ParticipateOutcome::RegLayer(part))
            }
            Packet::DecryptParticipateResponse(DecryptParticipateStatus::SendOwnerLayerPart(
                part,
            )) => Ok(ParticipateOutcome::OwnerLayer(part)),
            Packet::DecryptParticipateResponse(DecryptParticipateStatus::NotRequired) => {
                Ok(ParticipateOutcome::NotRequired)
            }
            _ => Err(Error::UnexpectedResponse),
        }
    }

    /// Submits a shard's partial decryption for one layer of `op_id` (spec
    /// §4.F.4 "Collection"). The server always acknowledges, even if the
    /// operation already finished (spec §4.F.5).
    pub async fn send_decryption_part(
        &mut self,
        op_id: OperationId,
        shard_id: ShardId,
        part: Point,
        is_owner_layer: bool,
    ) -> Result<(), Error> {
        let req = Packet::SendDecryptionPartRequest(SendDecryptionPartRequest {
            op_id,
            shard_id,
            part,
            is_owner_layer,
        });
        match self.roundtrip(req).await? {
            Packet::SendDecryptionPartResponse(SendDecryptionPartResponse {}) => Ok(()),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    /// Computes this connection's partial decryption for `send` and submits
    /// it in one step — the usual way a participant answers a
    /// [`ParticipateOutcome::RegLayer`]/[`ParticipateOutcome::OwnerLayer`]
    /// using a shard it already holds in `book`.
    pub async fn contribute(
        &mut self,
        book: &ShardBook,
        send: &SendLayerPart,
        is_owner_layer: bool,
    ) -> Result<(), Error> {
        let owned = book
            .shards_for(send.user_set_id)
            .ok_or(Error::MissingShard(send.user_set_id))?;
        let shard = if is_owner_layer {
            owned.owner_shard
        } else {
            owned.reg_shard
        }
        .ok_or(Error::MissingShard(send.user_set_id))?;
        let part = shamir::partial_decrypt(&send.ciphertext_point, &shard);
        self.send_decryption_part(send.op_id, ShardId(part.id), part.point, is_owner_layer)
            .await
    }
}

/// Finishes a decryption the caller initiated: combines the parts the
/// server collected from other participants with the caller's own
/// locally-computed contribution (spec §4.D "Join" — the initiator's own
/// shard never travels over the wire as a `SendDecryptionPartRequest`; it
/// is folded in only at combine time).
pub fn finish_decryption(
    user_set_id: UserSetId,
    ciphertext: &Ciphertext,
    shards: &OwnedShards,
    reg_parts: &[Point],
    reg_shard_ids: &[ShardId],
    own_parts: &[Point],
    own_shard_ids: &[ShardId],
) -> Result<Vec<u8>, Error> {
    let reg_shard = shards.reg_shard.ok_or(Error::MissingShard(user_set_id))?;
    let own_shard = shards.owner_shard.ok_or(Error::MissingShard(user_set_id))?;

    let mut reg: Vec<Part> = reg_shard_ids
        .iter()
        .zip(reg_parts.iter())
        .map(|(id, point)| Part { id: id.0, point: *point })
        .collect();
    reg.push(shamir::partial_decrypt(&ciphertext.c1, &reg_shard));

    let mut own: Vec<Part> = own_shard_ids
        .iter()
        .zip(own_parts.iter())
        .map(|(id, point)| Part { id: id.0, point: *point })
        .collect();
    own.push(shamir::partial_decrypt(&ciphertext.c2, &own_shard));

    let shared1 = shamir::combine_parts(&reg)?;
    let shared2 = shamir::combine_parts(&own)?;
    tresor_core::elgamal::decrypt_with_shared(&shared1, &shared2, ciphertext).map_err(Into::into)
}
