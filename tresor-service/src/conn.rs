//! Per-connection lifecycle and packet dispatch (spec §4.F.2–5).
//!
//! Adapted from `oprf-service/src/api/oprf.rs`'s per-connection
//! `#[instrument]`ed task (there, one Axum websocket upgrade handler;
//! here, one `tokio::net::TcpStream` driven directly by
//! `tresor_types::codec::Codec` since this protocol has no HTTP upgrade
//! step of its own) and on `oprf-service/src/services/open_sessions.rs`'s
//! drop-guard idiom for a gauge metric.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::TcpStream;

use tresor_core::elgamal::Ciphertext;
use tresor_types::api::v1::{
    DecryptParticipateRequest, DecryptParticipateStatus, DecryptRequest, DecryptResponse,
    ErrorResponse, GetMembersRequest, GetMembersResponse, GetUserSetsResponse, LoginRequest,
    LoginResponse, LogoutResponse, MakeUserSetRequest, MakeUserSetResponse, Packet,
    SendDecryptionPartRequest, SendDecryptionPartResponse, SendLayerPart, SignupRequest,
    SignupResponse, UpdateResponse,
};
use tresor_types::codec::{Codec, CodecError};
use tresor_types::ids::OperationId;
use tresor_types::update::UpdateRecord;

use crate::error::Error;
use crate::metrics::{
    METRICS_ID_CONNECTIONS_OPEN, METRICS_ID_OPERATIONS_FINISHED, METRICS_ID_OPERATIONS_PREPARED,
    METRICS_ID_PARTICIPATE_NOT_REQUIRED, METRICS_ID_SEND_PART_DURATION,
    METRICS_ID_USERSETS_CREATED,
};
use crate::services::operations::{LookupOutcome, Operations};
use crate::services::storage::ServerStorage;
use crate::services::updates::Updates;
use crate::services::users::Users;
use crate::services::usersets::UserSets;

/// Every shared service a connection's packet dispatch needs. Cheap to
/// clone; one clone lives per connection task.
#[derive(Clone)]
pub struct Services {
    pub storage: Arc<dyn ServerStorage>,
    pub users: Users,
    pub usersets: UserSets,
    pub operations: Operations,
    pub updates: Updates,
    /// Effective userset member cap (`ServerConfig::effective_max_members`).
    pub max_members: u8,
}

struct ConnectionGuard;

impl ConnectionGuard {
    fn open() -> Self {
        metrics::gauge!(METRICS_ID_CONNECTIONS_OPEN).increment(1);
        Self
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        metrics::gauge!(METRICS_ID_CONNECTIONS_OPEN).decrement(1);
    }
}

/// Drives one accepted connection end to end: handshake, unauthenticated
/// stage, authenticated stage (spec §4.F.2). Never panics; every error
/// either ends the connection (protocol-class) or is rendered as an
/// `ErrorResponse` and the loop continues.
#[tracing::instrument(level = "debug", skip_all, fields(peer = %peer))]
pub async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    services: Services,
    require_encryption: bool,
) {
    let _guard = ConnectionGuard::open();

    let codec = match negotiate_codec(&mut stream, require_encryption).await {
        Ok(Some(codec)) => codec,
        Ok(None) => {
            tracing::debug!("incompatible protocol version, closing");
            return;
        }
        Err(err) => {
            tracing::debug!("handshake failed: {err}");
            return;
        }
    };

    let username = match unauthenticated_stage(&mut stream, &codec, &services).await {
        Some(username) => username,
        None => return,
    };
    tracing::Span::current().record("user", tracing::field::display(&username));

    if let Err(err) = authenticated_stage(&mut stream, &codec, &services, &username).await {
        tracing::debug!("connection for {username:?} ended: {err}");
    }
}

async fn negotiate_codec(
    stream: &mut TcpStream,
    require_encryption: bool,
) -> Result<Option<Codec>, CodecError> {
    if !tresor_types::codec::server_handshake(stream).await? {
        return Ok(None);
    }
    if require_encryption {
        let key = tresor_types::codec::server_key_exchange(stream).await?;
        Ok(Some(Codec::Encrypted { key }))
    } else {
        Ok(Some(Codec::Inline))
    }
}

/// Spec §4.F.2 stage 2: loops accepting `Signup`/`Login` until one
/// succeeds (advancing to the authenticated stage) or the client logs out
/// or the connection fails.
async fn unauthenticated_stage(
    stream: &mut TcpStream,
    codec: &Codec,
    services: &Services,
) -> Option<String> {
    loop {
        let packet = match codec.read_packet(stream).await {
            Ok(packet) => packet,
            Err(err) => {
                tracing::debug!("read failed before authentication: {err}");
                return None;
            }
        };
        let result = match packet {
            Packet::SignupRequest(SignupRequest { username, password }) => {
                match services.users.signup(&username, &password) {
                    Ok(()) => Ok(Some((username, Packet::SignupResponse(SignupResponse {})))),
                    Err(err) => Err(err),
                }
            }
            Packet::LoginRequest(LoginRequest { username, password }) => {
                match services.users.login(&username, &password) {
                    Ok(()) => Ok(Some((username, Packet::LoginResponse(LoginResponse {})))),
                    Err(err) => Err(err),
                }
            }
            Packet::LogoutRequest(_) => {
                let _ = codec
                    .write_packet(stream, &Packet::LogoutResponse(LogoutResponse {}))
                    .await;
                return None;
            }
            _ => Err(Error::Validation(
                "must Signup or Login before any other request".to_owned(),
            )),
        };
        match result {
            Ok(Some((username, response))) => {
                if codec.write_packet(stream, &response).await.is_err() {
                    return None;
                }
                return Some(username);
            }
            Ok(None) => unreachable!("every Ok arm above carries a response"),
            Err(err) => {
                let message = err.to_message();
                if codec
                    .write_packet(stream, &error_response(message))
                    .await
                    .is_err()
                {
                    return None;
                }
            }
        }
    }
}

/// Spec §4.F.2 stage 3: dispatches every authenticated request by code
/// until `Logout` or a protocol-class failure.
async fn authenticated_stage(
    stream: &mut TcpStream,
    codec: &Codec,
    services: &Services,
    username: &str,
) -> Result<(), CodecError> {
    loop {
        let packet = codec.read_packet(stream).await?;
        if matches!(packet, Packet::LogoutRequest(_)) {
            codec
                .write_packet(stream, &Packet::LogoutResponse(LogoutResponse {}))
                .await?;
            return Ok(());
        }
        let response = match dispatch(services, username, packet).await {
            Ok(response) => response,
            Err(err) => error_response(err.to_message()),
        };
        codec.write_packet(stream, &response).await?;
    }
}

fn error_response(message: String) -> Packet {
    Packet::ErrorResponse(ErrorResponse { message })
}

async fn dispatch(services: &Services, username: &str, packet: Packet) -> Result<Packet, Error> {
    match packet {
        Packet::MakeUserSetRequest(req) => make_userset(services, username, req),
        Packet::GetUserSetsRequest(_) => Ok(Packet::GetUserSetsResponse(GetUserSetsResponse {
            user_set_ids: services.storage.usersets_owned_by(username),
        })),
        Packet::GetMembersRequest(req) => get_members(services, username, req),
        Packet::DecryptRequest(req) => decrypt_request(services, username, req),
        Packet::DecryptParticipateRequest(req) => decrypt_participate(services, username, req),
        Packet::SendDecryptionPartRequest(req) => send_decryption_part(services, req),
        Packet::UpdateRequest(_) => Ok(Packet::UpdateResponse(UpdateResponse {
            records: services.updates.drain(username),
        })),
        Packet::SignupRequest(_) | Packet::LoginRequest(_) => Err(Error::Validation(
            "already authenticated on this connection".to_owned(),
        )),
        _ => Err(Error::Validation("unexpected request".to_owned())),
    }
}

fn make_userset(
    services: &Services,
    username: &str,
    req: MakeUserSetRequest,
) -> Result<Packet, Error> {
    let user_set_id = services.usersets.create(
        username,
        req.owners,
        req.reg_members,
        req.owners_threshold,
        req.reg_members_threshold,
        services.max_members,
    )?;
    metrics::counter!(METRICS_ID_USERSETS_CREATED).increment(1);
    Ok(Packet::MakeUserSetResponse(MakeUserSetResponse {
        user_set_id,
    }))
}

fn get_members(
    services: &Services,
    username: &str,
    req: GetMembersRequest,
) -> Result<Packet, Error> {
    let userset = services
        .storage
        .get_userset(req.user_set_id)
        .map_err(|err| Error::Validation(err.to_string()))?;
    if !userset.is_owner(username) && !userset.is_reg_member(username) {
        return Err(Error::Validation(
            "not a member of this userset".to_owned(),
        ));
    }
    Ok(Packet::GetMembersResponse(GetMembersResponse {
        reg_members: userset.reg_members,
        owners: userset.owners,
    }))
}

fn decrypt_request(
    services: &Services,
    username: &str,
    req: DecryptRequest,
) -> Result<Packet, Error> {
    let userset_id = req.user_set_id;
    if !services.storage.user_is_owner(username, userset_id) {
        return Err(Error::Validation(
            "only an owner may initiate a decryption".to_owned(),
        ));
    }
    let userset = services
        .storage
        .get_userset(userset_id)
        .map_err(|err| Error::Validation(err.to_string()))?;
    let initiator_reg_shard_id = services
        .storage
        .reg_shard_id(username, userset_id)
        .ok_or_else(|| Error::Validation("missing registry-layer shard".to_owned()))?;
    let initiator_owner_shard_id = services
        .storage
        .owner_shard_id(username, userset_id)
        .ok_or_else(|| Error::Validation("missing owner-layer shard".to_owned()))?;

    let op_id = OperationId::new_v4();
    services.operations.register_operation(
        op_id,
        userset_id,
        username.to_owned(),
        req.ciphertext,
        initiator_reg_shard_id,
        initiator_owner_shard_id,
        userset.owners_threshold,
        userset.reg_members_threshold,
    );
    for member in userset.reg_participants() {
        if member != username {
            services.updates.push(member, UpdateRecord::OnLookup { op_id });
        }
    }
    metrics::counter!(METRICS_ID_OPERATIONS_PREPARED).increment(1);
    Ok(Packet::DecryptResponse(DecryptResponse { op_id }))
}

fn decrypt_participate(
    services: &Services,
    username: &str,
    req: DecryptParticipateRequest,
) -> Result<Packet, Error> {
    let Some(prepared) = services.operations.prepared(req.op_id) else {
        metrics::counter!(METRICS_ID_PARTICIPATE_NOT_REQUIRED).increment(1);
        return Ok(Packet::DecryptParticipateResponse(
            DecryptParticipateStatus::NotRequired,
        ));
    };
    let userset_id = prepared.userset_id;
    let Some(reg_shard_id) = services.storage.reg_shard_id(username, userset_id) else {
        metrics::counter!(METRICS_ID_PARTICIPATE_NOT_REQUIRED).increment(1);
        return Ok(Packet::DecryptParticipateResponse(
            DecryptParticipateStatus::NotRequired,
        ));
    };
    let is_owner = services.storage.user_is_owner(username, userset_id);
    let owner_shard_id = services.storage.owner_shard_id(username, userset_id);

    let outcome = services.operations.lookup(
        req.op_id,
        username,
        is_owner,
        reg_shard_id,
        owner_shard_id,
    );
    match outcome {
        LookupOutcome::SendOwnerLayerPart { shard_id, filled } => {
            notify_layer_filled(services, req.op_id, &prepared.ciphertext, true, filled);
            Ok(Packet::DecryptParticipateResponse(
                DecryptParticipateStatus::SendOwnerLayerPart(SendLayerPart {
                    op_id: req.op_id,
                    user_set_id: userset_id,
                    ciphertext_point: prepared.ciphertext.c2,
                    shard_id,
                }),
            ))
        }
        LookupOutcome::SendRegLayerPart { shard_id, filled } => {
            notify_layer_filled(services, req.op_id, &prepared.ciphertext, false, filled);
            Ok(Packet::DecryptParticipateResponse(
                DecryptParticipateStatus::SendRegLayerPart(SendLayerPart {
                    op_id: req.op_id,
                    user_set_id: userset_id,
                    ciphertext_point: prepared.ciphertext.c1,
                    shard_id,
                }),
            ))
        }
        LookupOutcome::NotRequired => {
            metrics::counter!(METRICS_ID_PARTICIPATE_NOT_REQUIRED).increment(1);
            Ok(Packet::DecryptParticipateResponse(
                DecryptParticipateStatus::NotRequired,
            ))
        }
    }
}

fn notify_layer_filled(
    services: &Services,
    op_id: OperationId,
    ciphertext: &Ciphertext,
    is_owner_layer: bool,
    filled: Option<crate::services::operations::LayerFilled>,
) {
    let Some(filled) = filled else {
        return;
    };
    for participant in &filled.participants {
        services.updates.push(
            participant,
            UpdateRecord::ToDecrypt {
                op_id,
                ciphertext: ciphertext.clone(),
                shard_ids: filled.shard_ids.clone(),
                is_owner_layer,
            },
        );
    }
}

fn send_decryption_part(
    services: &Services,
    req: SendDecryptionPartRequest,
) -> Result<Packet, Error> {
    let start = Instant::now();
    if let Some(finished) = services.operations.register_part(
        req.op_id,
        req.part,
        req.shard_id,
        req.is_owner_layer,
    ) {
        services.updates.push(
            &finished.requester,
            UpdateRecord::FinishedDecryption {
                op_id: finished.op_id,
                user_set_id: finished.userset_id,
                reg_parts: finished.reg_parts,
                own_parts: finished.own_parts,
                reg_shard_ids: finished.reg_shard_ids,
                own_shard_ids: finished.own_shard_ids,
            },
        );
        metrics::counter!(METRICS_ID_OPERATIONS_FINISHED).increment(1);
    }
    metrics::histogram!(METRICS_ID_SEND_PART_DURATION).record(start.elapsed().as_millis() as f64);
    // Per spec §4.F.5, a part for an already-finished or unknown operation
    // is dropped silently with a success response rather than an error.
    Ok(Packet::SendDecryptionPartResponse(
        SendDecryptionPartResponse {},
    ))
}
