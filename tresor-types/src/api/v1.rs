//! Version 1 wire packets: the closed `Packet` enum and its `PacketCode`
//! discriminants. Numeric order is part of the wire contract — never
//! renumber an existing code, only append.

use tresor_core::elgamal::Ciphertext;
use tresor_core::group::Point;

use crate::ids::{OperationId, ShardId, UserSetId};
use crate::update::UpdateRecord;
use crate::wire::{WireDecode, WireEncode, WireError};
use crate::wire_struct;

/// The one-byte discriminant prefixing every packet on the wire.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketCode {
    /// See [`ErrorResponse`].
    ErrorResponse = 0,
    /// See [`SignupRequest`].
    SignupRequest = 1,
    /// See [`SignupResponse`].
    SignupResponse = 2,
    /// See [`LoginRequest`].
    LoginRequest = 3,
    /// See [`LoginResponse`].
    LoginResponse = 4,
    /// See [`LogoutRequest`].
    LogoutRequest = 5,
    /// See [`LogoutResponse`].
    LogoutResponse = 6,
    /// See [`MakeUserSetRequest`].
    MakeUserSetRequest = 7,
    /// See [`MakeUserSetResponse`].
    MakeUserSetResponse = 8,
    /// See [`GetUserSetsRequest`].
    GetUserSetsRequest = 9,
    /// See [`GetUserSetsResponse`].
    GetUserSetsResponse = 10,
    /// See [`GetMembersRequest`].
    GetMembersRequest = 11,
    /// See [`GetMembersResponse`].
    GetMembersResponse = 12,
    /// See [`DecryptRequest`].
    DecryptRequest = 13,
    /// See [`DecryptResponse`].
    DecryptResponse = 14,
    /// See [`UpdateRequest`].
    UpdateRequest = 15,
    /// See [`UpdateResponse`].
    UpdateResponse = 16,
    /// See [`DecryptParticipateRequest`].
    DecryptParticipateRequest = 17,
    /// See [`DecryptParticipateStatus`].
    DecryptParticipateResponse = 18,
    /// See [`SendDecryptionPartRequest`].
    SendDecryptionPartRequest = 19,
    /// See [`SendDecryptionPartResponse`].
    SendDecryptionPartResponse = 20,
}

impl TryFrom<u8> for PacketCode {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use PacketCode::*;
        Ok(match value {
            0 => ErrorResponse,
            1 => SignupRequest,
            2 => SignupResponse,
            3 => LoginRequest,
            4 => LoginResponse,
            5 => LogoutRequest,
            6 => LogoutResponse,
            7 => MakeUserSetRequest,
            8 => MakeUserSetResponse,
            9 => GetUserSetsRequest,
            10 => GetUserSetsResponse,
            11 => GetMembersRequest,
            12 => GetMembersResponse,
            13 => DecryptRequest,
            14 => DecryptResponse,
            15 => UpdateRequest,
            16 => UpdateResponse,
            17 => DecryptParticipateRequest,
            18 => DecryptParticipateResponse,
            19 => SendDecryptionPartRequest,
            20 => SendDecryptionPartResponse,
            other => return Err(WireError::UnknownPacketCode(other)),
        })
    }
}

wire_struct! {
    /// Carries a human-readable failure reason for any request.
    pub struct ErrorResponse {
        /// Human-readable failure description.
        pub message: String,
    }
}

wire_struct! {
    /// Registers a new account.
    pub struct SignupRequest {
        /// The account's username.
        pub username: String,
        /// The account's password.
        pub password: String,
    }
}

wire_struct! {
    /// Empty acknowledgement of a successful signup.
    pub struct SignupResponse {}
}

wire_struct! {
    /// Authenticates an existing account for this connection.
    pub struct LoginRequest {
        /// The account's username.
        pub username: String,
        /// The account's password.
        pub password: String,
    }
}

wire_struct! {
    /// Empty acknowledgement of a successful login.
    pub struct LoginResponse {}
}

wire_struct! {
    /// Ends the authenticated session on this connection.
    pub struct LogoutRequest {}
}

wire_struct! {
    /// Empty acknowledgement of logout.
    pub struct LogoutResponse {}
}

wire_struct! {
    /// Creates a new userset with two Shamir-shared ElGamal layers.
    pub struct MakeUserSetRequest {
        /// Usernames of the registry-layer members.
        pub reg_members: Vec<String>,
        /// Usernames of the owner-layer members.
        pub owners: Vec<String>,
        /// Minimum number of registry-layer shards required to decrypt.
        pub reg_members_threshold: u8,
        /// Minimum number of owner-layer shards required to decrypt.
        pub owners_threshold: u8,
    }
}

wire_struct! {
    /// The id of the newly created userset.
    pub struct MakeUserSetResponse {
        /// The new userset's id.
        pub user_set_id: UserSetId,
    }
}

wire_struct! {
    /// Lists the usersets the caller belongs to.
    pub struct GetUserSetsRequest {}
}

wire_struct! {
    /// The usersets the caller belongs to.
    pub struct GetUserSetsResponse {
        /// Ids of every userset the caller belongs to.
        pub user_set_ids: Vec<UserSetId>,
    }
}

wire_struct! {
    /// Looks up the membership of a userset the caller belongs to.
    pub struct GetMembersRequest {
        /// The userset to look up.
        pub user_set_id: UserSetId,
    }
}

wire_struct! {
    /// A userset's membership lists.
    pub struct GetMembersResponse {
        /// Usernames of the registry-layer members.
        pub reg_members: Vec<String>,
        /// Usernames of the owner-layer members.
        pub owners: Vec<String>,
    }
}

wire_struct! {
    /// Requests collaborative decryption of a ciphertext under a userset's
    /// keys.
    pub struct DecryptRequest {
        /// The userset whose keys the ciphertext is encrypted under.
        pub user_set_id: UserSetId,
        /// The ciphertext to decrypt.
        pub ciphertext: Ciphertext,
    }
}

wire_struct! {
    /// The id assigned to the newly prepared decryption operation.
    pub struct DecryptResponse {
        /// The new operation's id.
        pub op_id: OperationId,
    }
}

wire_struct! {
    /// Drains the caller's update queue.
    pub struct UpdateRequest {}
}

wire_struct! {
    /// The records drained from the caller's update queue, in FIFO order.
    pub struct UpdateResponse {
        /// The drained records, oldest first.
        pub records: Vec<UpdateRecord>,
    }
}

wire_struct! {
    /// Volunteers this connection's shard(s) toward an operation's
    /// reconstruction set.
    pub struct DecryptParticipateRequest {
        /// The operation to participate in.
        pub op_id: OperationId,
    }
}

wire_struct! {
    /// The server wants this shard's partial decryption of `ciphertext_point`
    /// (a [`DecryptParticipateStatus::SendRegLayerPart`] /
    /// [`DecryptParticipateStatus::SendOwnerLayerPart`] payload).
    pub struct SendLayerPart {
        /// The operation this request belongs to.
        pub op_id: OperationId,
        /// The userset the requested shard belongs to — without this, a
        /// caller holding shards in more than one userset has no way to
        /// tell which of its shards with id `shard_id` to use.
        pub user_set_id: UserSetId,
        /// The ciphertext point (`c1` or `c2`) to partially decrypt.
        pub ciphertext_point: Point,
        /// Which shard the caller should use.
        pub shard_id: ShardId,
    }
}

/// Tag byte identifying a [`DecryptParticipateStatus`] variant within a
/// `DecryptParticipateResponse` payload.
#[repr(u8)]
enum StatusTag {
    SendRegLayerPart = 0,
    SendOwnerLayerPart = 1,
    NotRequired = 2,
}

/// The outcome of a `DecryptParticipateRequest` lookup (spec §4.E's single
/// `DecryptParticipateResponse` code, internally discriminated — mirroring
/// the original implementation's `Status` enum rather than splitting into
/// separate wire codes).
#[derive(Debug, Clone)]
pub enum DecryptParticipateStatus {
    /// The registry layer wants this shard's partial decryption.
    SendRegLayerPart(SendLayerPart),
    /// The owner layer wants this shard's partial decryption.
    SendOwnerLayerPart(SendLayerPart),
    /// This connection's shard is not needed for the operation.
    NotRequired,
}

impl WireEncode for DecryptParticipateStatus {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            DecryptParticipateStatus::SendRegLayerPart(part) => {
                (StatusTag::SendRegLayerPart as u8).encode(out);
                part.encode(out);
            }
            DecryptParticipateStatus::SendOwnerLayerPart(part) => {
                (StatusTag::SendOwnerLayerPart as u8).encode(out);
                part.encode(out);
            }
            DecryptParticipateStatus::NotRequired => {
                (StatusTag::NotRequired as u8).encode(out);
            }
        }
    }
}

impl WireDecode for DecryptParticipateStatus {
    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        let tag = u8::decode(buf)?;
        Ok(match tag {
            0 => DecryptParticipateStatus::SendRegLayerPart(SendLayerPart::decode(buf)?),
            1 => DecryptParticipateStatus::SendOwnerLayerPart(SendLayerPart::decode(buf)?),
            2 => DecryptParticipateStatus::NotRequired,
            other => return Err(WireError::UnknownPacketCode(other)),
        })
    }
}

wire_struct! {
    /// A shard's partial decryption, submitted for one layer.
    pub struct SendDecryptionPartRequest {
        /// The operation this partial decryption belongs to.
        pub op_id: OperationId,
        /// Which shard produced this partial decryption.
        pub shard_id: ShardId,
        /// The partial decryption point.
        pub part: Point,
        /// `true` for the owner layer, `false` for the registry layer.
        pub is_owner_layer: bool,
    }
}

wire_struct! {
    /// Empty acknowledgement that a partial decryption was accepted.
    pub struct SendDecryptionPartResponse {}
}

/// A single framed protocol message, tagged by its [`PacketCode`].
#[derive(Debug, Clone)]
pub enum Packet {
    /// See [`ErrorResponse`].
    ErrorResponse(ErrorResponse),
    /// See [`SignupRequest`].
    SignupRequest(SignupRequest),
    /// See [`SignupResponse`].
    SignupResponse(SignupResponse),
    /// See [`LoginRequest`].
    LoginRequest(LoginRequest),
    /// See [`LoginResponse`].
    LoginResponse(LoginResponse),
    /// See [`LogoutRequest`].
    LogoutRequest(LogoutRequest),
    /// See [`LogoutResponse`].
    LogoutResponse(LogoutResponse),
    /// See [`MakeUserSetRequest`].
    MakeUserSetRequest(MakeUserSetRequest),
    /// See [`MakeUserSetResponse`].
    MakeUserSetResponse(MakeUserSetResponse),
    /// See [`GetUserSetsRequest`].
    GetUserSetsRequest(GetUserSetsRequest),
    /// See [`GetUserSetsResponse`].
    GetUserSetsResponse(GetUserSetsResponse),
    /// See [`GetMembersRequest`].
    GetMembersRequest(GetMembersRequest),
    /// See [`GetMembersResponse`].
    GetMembersResponse(GetMembersResponse),
    /// See [`DecryptRequest`].
    DecryptRequest(DecryptRequest),
    /// See [`DecryptResponse`].
    DecryptResponse(DecryptResponse),
    /// See [`UpdateRequest`].
    UpdateRequest(UpdateRequest),
    /// See [`UpdateResponse`].
    UpdateResponse(UpdateResponse),
    /// See [`DecryptParticipateRequest`].
    DecryptParticipateRequest(DecryptParticipateRequest),
    /// See [`DecryptParticipateStatus`].
    DecryptParticipateResponse(DecryptParticipateStatus),
    /// See [`SendDecryptionPartRequest`].
    SendDecryptionPartRequest(SendDecryptionPartRequest),
    /// See [`SendDecryptionPartResponse`].
    SendDecryptionPartResponse(SendDecryptionPartResponse),
}

impl Packet {
    /// This packet's wire code.
    pub fn code(&self) -> PacketCode {
        match self {
            Packet::ErrorResponse(_) => PacketCode::ErrorResponse,
            Packet::SignupRequest(_) => PacketCode::SignupRequest,
            Packet::SignupResponse(_) => PacketCode::SignupResponse,
            Packet::LoginRequest(_) => PacketCode::LoginRequest,
            Packet::LoginResponse(_) => PacketCode::LoginResponse,
            Packet::LogoutRequest(_) => PacketCode::LogoutRequest,
            Packet::LogoutResponse(_) => PacketCode::LogoutResponse,
            Packet::MakeUserSetRequest(_) => PacketCode::MakeUserSetRequest,
            Packet::MakeUserSetResponse(_) => PacketCode::MakeUserSetResponse,
            Packet::GetUserSetsRequest(_) => PacketCode::GetUserSetsRequest,
            Packet::GetUserSetsResponse(_) => PacketCode::GetUserSetsResponse,
            Packet::GetMembersRequest(_) => PacketCode::GetMembersRequest,
            Packet::GetMembersResponse(_) => PacketCode::GetMembersResponse,
            Packet::DecryptRequest(_) => PacketCode::DecryptRequest,
            Packet::DecryptResponse(_) => PacketCode::DecryptResponse,
            Packet::UpdateRequest(_) => PacketCode::UpdateRequest,
            Packet::UpdateResponse(_) => PacketCode::UpdateResponse,
            Packet::DecryptParticipateRequest(_) => PacketCode::DecryptParticipateRequest,
            Packet::DecryptParticipateResponse(_) => PacketCode::DecryptParticipateResponse,
            Packet::SendDecryptionPartRequest(_) => PacketCode::SendDecryptionPartRequest,
            Packet::SendDecryptionPartResponse(_) => PacketCode::SendDecryptionPartResponse,
        }
    }

    /// Encodes this packet as `[code byte][payload]`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.code() as u8];
        match self {
            Packet::ErrorResponse(p) => p.encode(&mut out),
            Packet::SignupRequest(p) => p.encode(&mut out),
            Packet::SignupResponse(p) => p.encode(&mut out),
            Packet::LoginRequest(p) => p.encode(&mut out),
            Packet::LoginResponse(p) => p.encode(&mut out),
            Packet::LogoutRequest(p) => p.encode(&mut out),
            Packet::LogoutResponse(p) => p.encode(&mut out),
            Packet::MakeUserSetRequest(p) => p.encode(&mut out),
            Packet::MakeUserSetResponse(p) => p.encode(&mut out),
            Packet::GetUserSetsRequest(p) => p.encode(&mut out),
            Packet::GetUserSetsResponse(p) => p.encode(&mut out),
            Packet::GetMembersRequest(p) => p.encode(&mut out),
            Packet::GetMembersResponse(p) => p.encode(&mut out),
            Packet::DecryptRequest(p) => p.encode(&mut out),
            Packet::DecryptResponse(p) => p.encode(&mut out),
            Packet::UpdateRequest(p) => p.encode(&mut out),
            Packet::UpdateResponse(p) => p.encode(&mut out),
            Packet::DecryptParticipateRequest(p) => p.encode(&mut out),
            Packet::DecryptParticipateResponse(p) => p.encode(&mut out),
            Packet::SendDecryptionPartRequest(p) => p.encode(&mut out),
            Packet::SendDecryptionPartResponse(p) => p.encode(&mut out),
        }
        out
    }

    /// Decodes `[code byte][payload]` into a packet.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut rest = buf;
        let code_byte = u8::decode(&mut rest)?;
        let code = PacketCode::try_from(code_byte)?;
        Ok(match code {
            PacketCode::ErrorResponse => Packet::ErrorResponse(ErrorResponse::decode(&mut rest)?),
            PacketCode::SignupRequest => Packet::SignupRequest(SignupRequest::decode(&mut rest)?),
            PacketCode::SignupResponse => {
                Packet::SignupResponse(SignupResponse::decode(&mut rest)?)
            }
            PacketCode::LoginRequest => Packet::LoginRequest(LoginRequest::decode(&mut rest)?),
            PacketCode::LoginResponse => Packet::LoginResponse(LoginResponse::decode(&mut rest)?),
            PacketCode::LogoutRequest => Packet::LogoutRequest(LogoutRequest::decode(&mut rest)?),
            PacketCode::LogoutResponse => {
                Packet::LogoutResponse(LogoutResponse::decode(&mut rest)?)
            }
            PacketCode::MakeUserSetRequest => {
                Packet::MakeUserSetRequest(MakeUserSetRequest::decode(&mut rest)?)
            }
            PacketCode::MakeUserSetResponse => {
                Packet::MakeUserSetResponse(MakeUserSetResponse::decode(&mut rest)?)
            }
            PacketCode::GetUserSetsRequest => {
                Packet::GetUserSetsRequest(GetUserSetsRequest::decode(&mut rest)?)
            }
            PacketCode::GetUserSetsResponse => {
                Packet::GetUserSetsResponse(GetUserSetsResponse::decode(&mut rest)?)
            }
            PacketCode::GetMembersRequest => {
                Packet::GetMembersRequest(GetMembersRequest::decode(&mut rest)?)
            }
            PacketCode::GetMembersResponse => {
                Packet::GetMembersResponse(GetMembersResponse::decode(&mut rest)?)
            }
            PacketCode::DecryptRequest => {
                Packet::DecryptRequest(DecryptRequest::decode(&mut rest)?)
            }
            PacketCode::DecryptResponse => {
                Packet::DecryptResponse(DecryptResponse::decode(&mut rest)?)
            }
            PacketCode::UpdateRequest => Packet::UpdateRequest(UpdateRequest::decode(&mut rest)?),
            PacketCode::UpdateResponse => {
                Packet::UpdateResponse(UpdateResponse::decode(&mut rest)?)
            }
            PacketCode::DecryptParticipateRequest => {
                Packet::DecryptParticipateRequest(DecryptParticipateRequest::decode(&mut rest)?)
            }
            PacketCode::DecryptParticipateResponse => {
                Packet::DecryptParticipateResponse(DecryptParticipateStatus::decode(&mut rest)?)
            }
            PacketCode::SendDecryptionPartRequest => {
                Packet::SendDecryptionPartRequest(SendDecryptionPartRequest::decode(&mut rest)?)
            }
            PacketCode::SendDecryptionPartResponse => {
                Packet::SendDecryptionPartResponse(SendDecryptionPartResponse::decode(&mut rest)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_userset_request_round_trips() {
        let packet = Packet::MakeUserSetRequest(MakeUserSetRequest {
            reg_members: vec!["alice".into(), "bob".into()],
            owners: vec!["carol".into()],
            reg_members_threshold: 2,
            owners_threshold: 1,
        });
        let bytes = packet.encode();
        assert_eq!(bytes[0], PacketCode::MakeUserSetRequest as u8);
        let decoded = Packet::decode(&bytes).unwrap();
        match decoded {
            Packet::MakeUserSetRequest(r) => {
                assert_eq!(r.reg_members, vec!["alice", "bob"]);
                assert_eq!(r.owners, vec!["carol"]);
                assert_eq!(r.reg_members_threshold, 2);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn not_required_status_round_trips_under_one_code() {
        let packet = Packet::DecryptParticipateResponse(DecryptParticipateStatus::NotRequired);
        let bytes = packet.encode();
        assert_eq!(bytes, vec![PacketCode::DecryptParticipateResponse as u8, 2]);
        assert!(matches!(
            Packet::decode(&bytes).unwrap(),
            Packet::DecryptParticipateResponse(DecryptParticipateStatus::NotRequired)
        ));
    }

    #[test]
    fn send_layer_part_statuses_round_trip_under_the_same_code() {
        let send = SendLayerPart {
            op_id: OperationId::new_v4(),
            user_set_id: UserSetId::new_v4(),
            ciphertext_point: Point::from_scalar(&tresor_core::group::Scalar::sample(
                &mut rand::thread_rng(),
            )),
            shard_id: ShardId(3),
        };
        for status in [
            DecryptParticipateStatus::SendRegLayerPart(send.clone()),
            DecryptParticipateStatus::SendOwnerLayerPart(send.clone()),
        ] {
            let packet = Packet::DecryptParticipateResponse(status);
            let bytes = packet.encode();
            assert_eq!(bytes[0], PacketCode::DecryptParticipateResponse as u8);
            match Packet::decode(&bytes).unwrap() {
                Packet::DecryptParticipateResponse(DecryptParticipateStatus::SendRegLayerPart(p))
                | Packet::DecryptParticipateResponse(DecryptParticipateStatus::SendOwnerLayerPart(
                    p,
                )) => assert_eq!(p.shard_id.0, 3),
                _ => panic!("wrong variant"),
            }
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(Packet::decode(&[255]).is_err());
    }
}
