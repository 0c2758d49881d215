//! The framed, length-prefixed, optionally-encrypted wire transport (spec
//! §4.E) laid over any `tokio` `AsyncRead + AsyncWrite` stream.
//!
//! Every exchange on the wire is a `u32`-little-endian-length-prefixed byte
//! string. On top of that framing, [`Codec::Inline`] writes `Packet::encode`
//! straight into one frame; [`Codec::Encrypted`] buffers the same bytes,
//! encrypts them under the session's AES1L key, and sends the resulting
//! `(iv, body)` pair as two frames — the redesign in spec §9 collapses what
//! the original expressed as two virtual-dispatch packet handlers into one
//! enum with two arms.

use rand::rngs::OsRng;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use tresor_core::aes::{self, AesError};
use tresor_core::group::{GroupError, Point, Scalar};
use tresor_core::hkdf::{self, HkdfError};

use crate::api::v1::Packet;
use crate::wire::{WireDecode, WireEncode, WireError};

/// The protocol version this build speaks. Bumped only on a wire-breaking
/// change to framing or packet shapes.
pub const PROTOCOL_VERSION: u8 = 1;

/// Largest frame this codec accepts, guarding against a malicious or
/// corrupt length prefix driving an unbounded allocation.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Errors from handshaking or framing a packet.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The underlying stream returned an I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A frame's declared length exceeded [`MAX_FRAME_LEN`].
    #[error("frame length {0} exceeds the {MAX_FRAME_LEN} byte limit")]
    FrameTooLarge(u32),
    /// The peer's protocol version byte was not understood.
    #[error("incompatible protocol version {0}")]
    IncompatibleVersion(u8),
    /// The peer's handshake point was malformed.
    #[error(transparent)]
    Group(#[from] GroupError),
    /// The derived session key could not be expanded.
    #[error(transparent)]
    Hkdf(#[from] HkdfError),
    /// The encrypted frame failed to decrypt (wrong key, or tampered body).
    #[error(transparent)]
    Aes(#[from] AesError),
    /// A decoded packet did not follow the normative wire encoding.
    #[error(transparent)]
    Wire(#[from] WireError),
}

async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, bytes: &[u8]) -> Result<(), CodecError> {
    let len = u32::try_from(bytes.len()).map_err(|_| CodecError::FrameTooLarge(u32::MAX))?;
    w.write_all(&len.to_le_bytes()).await?;
    w.write_all(bytes).await?;
    Ok(())
}

async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> Result<Vec<u8>, CodecError> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len as usize];
    r.read_exact(&mut body).await?;
    Ok(body)
}

/// A session's transport codec: either the plaintext `Inline` variant or the
/// `Encrypted` variant wrapping a Diffie-Hellman-derived AES1L key.
pub enum Codec {
    /// No encryption beyond whatever the transport itself provides.
    Inline,
    /// Every subsequent packet is AES1L-encrypted under `key`.
    Encrypted {
        /// The AES1L session key derived during the handshake.
        key: [u8; aes::KEY_BYTES],
    },
}

impl Codec {
    /// Writes `packet` as this codec's framing dictates.
    pub async fn write_packet<W: AsyncWrite + Unpin>(
        &self,
        w: &mut W,
        packet: &Packet,
    ) -> Result<(), CodecError> {
        let body = packet.encode();
        match self {
            Codec::Inline => write_frame(w, &body).await,
            Codec::Encrypted { key } => {
                let mut rng = OsRng;
                let (iv, ct) = aes::encrypt(&mut rng, key, &body)?;
                write_frame(w, &iv).await?;
                write_frame(w, &ct).await?;
                Ok(())
            }
        }
    }

    /// Reads the next packet as this codec's framing dictates.
    pub async fn read_packet<R: AsyncRead + Unpin>(&self, r: &mut R) -> Result<Packet, CodecError> {
        let body = match self {
            Codec::Inline => read_frame(r).await?,
            Codec::Encrypted { key } => {
                let iv = read_frame(r).await?;
                let ct = read_frame(r).await?;
                aes::decrypt(key, &iv, &ct)?
            }
        };
        Ok(Packet::decode(&body)?)
    }
}

fn encode_point(point: &Point) -> Vec<u8> {
    let mut out = Vec::new();
    point.encode(&mut out);
    out
}

fn decode_point(bytes: &[u8]) -> Result<Point, CodecError> {
    let mut buf = bytes;
    Ok(Point::decode(&mut buf)?)
}

/// Client side of the handshake (spec §4.E): sends the version byte, then
/// waits for the server's compatibility boolean. `Err` means the connection
/// must be closed without a response ever being read.
pub async fn client_handshake<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
) -> Result<(), CodecError> {
    stream.write_u8(PROTOCOL_VERSION).await?;
    stream.flush().await?;
    let compatible = stream.read_u8().await? != 0;
    if !compatible {
        return Err(CodecError::IncompatibleVersion(PROTOCOL_VERSION));
    }
    Ok(())
}

/// Server side of the handshake: reads the client's version byte and
/// replies with a compatibility boolean. `Ok(false)` means the caller must
/// close the connection (the byte has already been sent); `Err` means the
/// stream itself failed.
pub async fn server_handshake<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
) -> Result<bool, CodecError> {
    let version = stream.read_u8().await?;
    let compatible = version == PROTOCOL_VERSION;
    stream.write_u8(compatible as u8).await?;
    stream.flush().await?;
    Ok(compatible)
}

/// Runs the ephemeral-Diffie-Hellman key exchange as the client and returns
/// the derived session key. Must run immediately after a successful
/// [`client_handshake`].
pub async fn client_key_exchange<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
) -> Result<[u8; aes::KEY_BYTES], CodecError> {
    let mut rng = OsRng;
    let x = Scalar::sample(&mut rng);
    let gx = Point::from_scalar(&x);
    write_frame(stream, &encode_point(&gx)).await?;
    stream.flush().await?;
    let gy_bytes = read_frame(stream).await?;
    let gy = decode_point(&gy_bytes)?;
    let shared = gy * x;
    derive_session_key(&shared)
}

/// Runs the ephemeral-Diffie-Hellman key exchange as the server and returns
/// the derived session key. Must run immediately after a successful
/// [`server_handshake`] that returned `Ok(true)`.
pub async fn server_key_exchange<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
) -> Result<[u8; aes::KEY_BYTES], CodecError> {
    let mut rng = OsRng;
    let gx_bytes = read_frame(stream).await?;
    let gx = decode_point(&gx_bytes)?;
    let y = Scalar::sample(&mut rng);
    let gy = Point::from_scalar(&y);
    write_frame(stream, &encode_point(&gy)).await?;
    stream.flush().await?;
    let shared = gx * y;
    derive_session_key(&shared)
}

fn derive_session_key(shared: &Point) -> Result<[u8; aes::KEY_BYTES], CodecError> {
    let material = hkdf::echkdf1l(shared, hkdf::DEFAULT_OUTPUT_LEN)?;
    let mut key = [0u8; aes::KEY_BYTES];
    key.copy_from_slice(&material[..aes::KEY_BYTES]);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::v1::{LoginRequest, Packet};
    use tokio::io::duplex;

    #[tokio::test]
    async fn inline_handshake_agrees_on_compatible_version() {
        let (mut client, mut server) = duplex(1024);
        let client_task = tokio::spawn(async move { client_handshake(&mut client).await });
        let compatible = server_handshake(&mut server).await.unwrap();
        assert!(compatible);
        client_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn inline_packet_round_trips() {
        let (mut a, mut b) = duplex(4096);
        let packet = Packet::LoginRequest(LoginRequest {
            username: "alice".into(),
            password: "hunter2".into(),
        });
        Codec::Inline.write_packet(&mut a, &packet).await.unwrap();
        let decoded = Codec::Inline.read_packet(&mut b).await.unwrap();
        match decoded {
            Packet::LoginRequest(r) => assert_eq!(r.username, "alice"),
            _ => panic!("wrong variant"),
        }
    }

    #[tokio::test]
    async fn encrypted_key_exchange_agrees_on_both_sides() {
        let (mut client, mut server) = duplex(4096);
        let client_task = tokio::spawn(async move {
            client_handshake(&mut client).await.unwrap();
            let key = client_key_exchange(&mut client).await.unwrap();
            (client, key)
        });
        let compatible = server_handshake(&mut server).await.unwrap();
        assert!(compatible);
        let server_key = server_key_exchange(&mut server).await.unwrap();
        let (mut client, client_key) = client_task.await.unwrap();
        assert_eq!(client_key, server_key);

        let codec_a = Codec::Encrypted { key: client_key };
        let codec_b = Codec::Encrypted { key: server_key };
        let packet = Packet::LogoutRequest(crate::api::v1::LogoutRequest {});
        codec_a.write_packet(&mut client, &packet).await.unwrap();
        let decoded = codec_b.read_packet(&mut server).await.unwrap();
        assert!(matches!(decoded, Packet::LogoutRequest(_)));
    }

    #[tokio::test]
    async fn tampered_ciphertext_fails_to_decrypt() {
        let key = [9u8; aes::KEY_BYTES];
        let (mut a, mut b) = duplex(4096);
        let codec = Codec::Encrypted { key };
        let packet = Packet::LogoutRequest(crate::api::v1::LogoutRequest {});
        codec.write_packet(&mut a, &packet).await.unwrap();

        // Flip a bit in the ciphertext body frame before the reader sees it.
        let mut iv_len = [0u8; 4];
        b.read_exact(&mut iv_len).await.unwrap();
        let mut iv = vec![0u8; u32::from_le_bytes(iv_len) as usize];
        b.read_exact(&mut iv).await.unwrap();
        let mut body_len = [0u8; 4];
        b.read_exact(&mut body_len).await.unwrap();
        let mut body = vec![0u8; u32::from_le_bytes(body_len) as usize];
        b.read_exact(&mut body).await.unwrap();
        body[0] ^= 0x01;

        let (mut replay_a, mut replay_b) = duplex(4096);
        write_frame(&mut replay_a, &iv).await.unwrap();
        write_frame(&mut replay_a, &body).await.unwrap();
        let result = codec.read_packet(&mut replay_b).await;
        assert!(result.is_err());
    }
}
