//! # Authenticated Transport
//!
//! An [`InboundPacketTransformer`] that verifies a signed envelope around
//! every datagram:
//!
//! ```text
//! [marker: 1][client id: 16][HMAC-SHA1 signature: 20][body: N]
//! ```
//!
//! The signature is HMAC-SHA1 over the body, keyed with the user's token.
//! Only a verified body is forwarded. A connection is bound to the first
//! client id it authenticates as and may never present another.
//!
//! ## Processing Order
//!
//! 1. **Marker**: a datagram that does not start with the marker is
//!    unauthenticated. It passes through unchanged, or the connection is
//!    disconnected when `kick_unauthenticated` is set.
//! 2. **Length**: shorter than 37 bytes is rejected. Exactly 37 bytes has no
//!    body and yields an empty payload without further checks.
//! 3. **User lookup** by the lower-case hex client id.
//! 4. **Signature** verification in constant time.
//! 5. **Binding** of the connection to the client id.
//!
//! Every rejection disconnects the connection with the [`AuthError`] text as
//! the reason and forwards an empty payload.

use crate::config::{AuthConfig, UserConfig};
use crate::connection::{Connection, DisconnectReason};
use crate::preprocess::{AuthenticatedUser, InboundPacketTransformer, TransformedDatagram};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use polaris_protocol::{FramingError, MessageReader};
use sha1::Sha1;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

type HmacSha1 = Hmac<Sha1>;

pub const CLIENT_ID_LENGTH: usize = 16;
pub const SIGNATURE_LENGTH: usize = 20;
/// Marker, client id and signature.
pub const ENVELOPE_HEADER_LENGTH: usize = 1 + CLIENT_ID_LENGTH + SIGNATURE_LENGTH;

/// Connection metadata key holding the bound client id.
pub const CLIENT_ID_META_KEY: &str = "auth.client_id";
/// Connection metadata key holding the bound user's display name.
pub const DISPLAY_NAME_META_KEY: &str = "auth.display_name";

/// Reasons an inbound datagram is rejected. `Display` is the disconnect reason.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("This server does not support unauthenticated packets")]
    Unauthenticated,

    #[error("Invalid packet length")]
    InvalidLength { length: usize },

    #[error("Unknown user")]
    UnknownUser { client_id: String },

    #[error("Signature mismatch")]
    SignatureMismatch,

    #[error("Wrong connection for user")]
    WrongConnection { bound: String, presented: String },
}

impl From<FramingError> for AuthError {
    fn from(error: FramingError) -> Self {
        match error {
            FramingError::OutOfBounds { available, .. } => AuthError::InvalidLength { length: available },
            _ => AuthError::InvalidLength { length: 0 },
        }
    }
}

// ============================================================================
// Client Ids and Users
// ============================================================================

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Errors parsing a configured client id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientIdError {
    #[error("Client id must be {expected} hex digits, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("Client id contains a non-hex character")]
    InvalidHex,
}

/// 16-byte client identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub [u8; CLIENT_ID_LENGTH]);

impl ClientId {
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; CLIENT_ID_LENGTH]>::try_from(bytes).ok().map(ClientId)
    }

    /// Lower-case hex, the user lookup key.
    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ClientId {
    type Err = ClientIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != CLIENT_ID_LENGTH * 2 {
            return Err(ClientIdError::WrongLength {
                expected: CLIENT_ID_LENGTH * 2,
                actual: s.len(),
            });
        }
        if !s.is_ascii() {
            return Err(ClientIdError::InvalidHex);
        }

        let mut bytes = [0u8; CLIENT_ID_LENGTH];
        for (index, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[index * 2..index * 2 + 2], 16)
                .map_err(|_| ClientIdError::InvalidHex)?;
        }
        Ok(ClientId(bytes))
    }
}

/// A user allowed to authenticate.
#[derive(Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub client_id: ClientId,
    pub token: String,
    pub display_name: String,
}

impl fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRecord")
            .field("client_id", &self.client_id.to_hex())
            .field("token", &"<redacted>")
            .field("display_name", &self.display_name)
            .finish()
    }
}

impl TryFrom<&UserConfig> for UserRecord {
    type Error = ClientIdError;

    fn try_from(config: &UserConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            client_id: config.client_id.parse()?,
            token: config.token.clone(),
            display_name: config.name.clone(),
        })
    }
}

/// Users keyed by lower-case hex client id.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: HashMap<String, UserRecord>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a user.
    pub fn insert(&mut self, user: UserRecord) {
        self.users.insert(user.client_id.to_hex(), user);
    }

    pub fn get(&self, client_id_hex: &str) -> Option<&UserRecord> {
        self.users.get(client_id_hex)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl FromIterator<UserRecord> for UserDirectory {
    fn from_iter<I: IntoIterator<Item = UserRecord>>(iter: I) -> Self {
        let mut directory = UserDirectory::new();
        for user in iter {
            directory.insert(user);
        }
        directory
    }
}

// ============================================================================
// Signing
// ============================================================================

fn mac_for(token: &str, body: &[u8]) -> Option<HmacSha1> {
    // HMAC accepts keys of any length, so this is always `Some`
    let mut mac = <HmacSha1 as Mac>::new_from_slice(token.as_bytes()).ok()?;
    mac.update(body);
    Some(mac)
}

/// HMAC-SHA1 of `body` keyed with `token`.
pub fn sign(body: &[u8], token: &str) -> Option<[u8; SIGNATURE_LENGTH]> {
    let digest = mac_for(token, body)?.finalize().into_bytes();
    let mut signature = [0u8; SIGNATURE_LENGTH];
    signature.copy_from_slice(&digest);
    Some(signature)
}

/// Constant-time check of `signature` against `body` and `token`.
pub fn verify(signature: &[u8], body: &[u8], token: &str) -> bool {
    mac_for(token, body).is_some_and(|mac| mac.verify_slice(signature).is_ok())
}

/// Wraps `body` in a signed envelope.
pub fn sign_envelope(marker: u8, client_id: &ClientId, token: &str, body: &[u8]) -> Option<Bytes> {
    let signature = sign(body, token)?;

    let mut envelope = Vec::with_capacity(ENVELOPE_HEADER_LENGTH + body.len());
    envelope.push(marker);
    envelope.extend_from_slice(&client_id.0);
    envelope.extend_from_slice(&signature);
    envelope.extend_from_slice(body);
    Some(Bytes::from(envelope))
}

// ============================================================================
// Transformer
// ============================================================================

/// Result of a successful pass through the envelope checks.
#[derive(Debug)]
pub enum AuthOutcome {
    /// No marker, and unauthenticated datagrams are allowed
    Unauthenticated,
    /// A header-only envelope
    EmptyBody,
    /// A verified envelope
    Verified {
        body: MessageReader,
        user: AuthenticatedUser,
        newly_bound: bool,
    },
}

/// Verifies signed envelopes and strips them before dispatch.
#[derive(Debug, Clone)]
pub struct AuthenticatingTransformer {
    marker: u8,
    kick_unauthenticated: bool,
    users: UserDirectory,
}

impl AuthenticatingTransformer {
    pub fn new(marker: u8, kick_unauthenticated: bool, users: UserDirectory) -> Self {
        Self {
            marker,
            kick_unauthenticated,
            users,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, ClientIdError> {
        let users = config
            .users
            .iter()
            .map(UserRecord::try_from)
            .collect::<Result<UserDirectory, _>>()?;

        Ok(Self::new(config.marker, config.kick_unauthenticated, users))
    }

    pub fn marker(&self) -> u8 {
        self.marker
    }

    pub fn kicks_unauthenticated(&self) -> bool {
        self.kick_unauthenticated
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    /// Runs the envelope checks, binding `connection` on first success.
    pub fn authenticate(
        &self,
        connection: &Connection,
        datagram: &MessageReader,
    ) -> Result<AuthOutcome, AuthError> {
        if datagram.peek(0).ok() != Some(self.marker) {
            return if self.kick_unauthenticated {
                Err(AuthError::Unauthenticated)
            } else {
                Ok(AuthOutcome::Unauthenticated)
            };
        }

        let length = datagram.remaining();
        if length < ENVELOPE_HEADER_LENGTH {
            return Err(AuthError::InvalidLength { length });
        }
        if length == ENVELOPE_HEADER_LENGTH {
            return Ok(AuthOutcome::EmptyBody);
        }

        let mut reader = datagram.clone();
        reader.read_byte()?;
        let client_id = to_hex(reader.read_bytes(CLIENT_ID_LENGTH)?.buffer());

        let user = self
            .users
            .get(&client_id)
            .ok_or_else(|| AuthError::UnknownUser {
                client_id: client_id.clone(),
            })?;

        let signature = reader.read_bytes(SIGNATURE_LENGTH)?;
        let body = reader.read_remaining_bytes();
        if !verify(signature.buffer(), body.buffer(), &user.token) {
            return Err(AuthError::SignatureMismatch);
        }

        let newly_bound = match connection.get_meta_str(CLIENT_ID_META_KEY) {
            Some(bound) if bound != client_id => {
                return Err(AuthError::WrongConnection {
                    bound,
                    presented: client_id,
                });
            }
            Some(_) => false,
            None => {
                connection.set_meta(CLIENT_ID_META_KEY, client_id.clone());
                connection.set_meta(DISPLAY_NAME_META_KEY, user.display_name.clone());
                true
            }
        };

        Ok(AuthOutcome::Verified {
            body,
            user: AuthenticatedUser {
                client_id,
                display_name: user.display_name.clone(),
            },
            newly_bound,
        })
    }
}

impl InboundPacketTransformer for AuthenticatingTransformer {
    fn transform_inbound(&self, connection: &Connection, datagram: MessageReader) -> TransformedDatagram {
        match self.authenticate(connection, &datagram) {
            Ok(AuthOutcome::Unauthenticated) => {
                debug!(target: "auth", "Passing unauthenticated datagram from {} through", connection.remote_addr());
                TransformedDatagram::passthrough(datagram)
            }
            Ok(AuthOutcome::EmptyBody) => TransformedDatagram::dropped(),
            Ok(AuthOutcome::Verified {
                body,
                user,
                newly_bound,
            }) => {
                if newly_bound {
                    info!(
                        target: "auth",
                        "🔐 Connection {} authenticated as {} ({})",
                        connection.id(),
                        user.display_name,
                        user.client_id
                    );
                }

                TransformedDatagram {
                    payload: body,
                    newly_authenticated: newly_bound.then_some(user),
                }
            }
            Err(error) => {
                warn!(
                    target: "auth",
                    "🚫 Rejecting datagram from {}: {:?}",
                    connection.remote_addr(),
                    error
                );
                connection.disconnect(DisconnectReason::custom(error.to_string()));
                TransformedDatagram::dropped()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::sync::mpsc;

    const CODY: &str = "ec4435dfe404482b8e8a0946e12a9f9a";
    const CODY_TOKEN: &str = "3a6adcf92fec282614f9a77b9ad5d24bcacab84522631eaa789c05090156ca5135a4753236142993";
    const ROSE: &str = "fc54bb9de1434234986b7bd873e93c86";
    const ROSE_TOKEN: &str = "07f34399f3162ad5baf871f41646259e7b9d8cebb045b6e4648222de0cb38fe1b9a28bc177794648";

    fn users() -> UserDirectory {
        [(CODY, CODY_TOKEN, "Cody"), (ROSE, ROSE_TOKEN, "Rose")]
            .into_iter()
            .map(|(id, token, name)| UserRecord {
                client_id: id.parse().unwrap(),
                token: token.to_string(),
                display_name: name.to_string(),
            })
            .collect()
    }

    fn connection() -> (Connection, mpsc::UnboundedReceiver<crate::connection::OutboundDatagram>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let addr: SocketAddr = "127.0.0.1:41000".parse().unwrap();
        (Connection::new(1, addr, sender), receiver)
    }

    fn envelope(id: &str, token: &str, body: &[u8]) -> MessageReader {
        MessageReader::new(sign_envelope(0x69, &id.parse().unwrap(), token, body).unwrap())
    }

    #[test]
    fn test_sign_then_verify() {
        let body = b"\x01\x00\x07hello";
        let signature = sign(body, CODY_TOKEN).unwrap();
        assert!(verify(&signature, body, CODY_TOKEN));
        assert!(!verify(&signature, body, ROSE_TOKEN));
    }

    #[test]
    fn test_any_flipped_bit_fails_verification() {
        let body = b"hello world".to_vec();
        let signature = sign(&body, CODY_TOKEN).unwrap();

        for index in 0..body.len() {
            for bit in 0..8 {
                let mut tampered = body.clone();
                tampered[index] ^= 1 << bit;
                assert!(!verify(&signature, &tampered, CODY_TOKEN));
            }
        }

        for index in 0..signature.len() {
            for bit in 0..8 {
                let mut tampered = signature;
                tampered[index] ^= 1 << bit;
                assert!(!verify(&tampered, &body, CODY_TOKEN));
            }
        }
    }

    #[test]
    fn test_client_id_parsing() {
        let id: ClientId = CODY.parse().unwrap();
        assert_eq!(id.to_hex(), CODY);
        assert_eq!(
            "EC4435DFE404482B8E8A0946E12A9F9A".parse::<ClientId>().unwrap().to_hex(),
            CODY
        );
        assert!(matches!(
            "abc".parse::<ClientId>(),
            Err(ClientIdError::WrongLength { actual: 3, .. })
        ));
        assert_eq!(
            "zz4435dfe404482b8e8a0946e12a9f9a".parse::<ClientId>(),
            Err(ClientIdError::InvalidHex)
        );
    }

    #[test]
    fn test_verified_body_is_forwarded_and_bound() {
        let transformer = AuthenticatingTransformer::new(0x69, false, users());
        let (connection, _rx) = connection();

        let out = transformer.transform_inbound(&connection, envelope(CODY, CODY_TOKEN, b"\x00\x01"));
        assert_eq!(&out.payload.buffer()[..], b"\x00\x01");
        assert_eq!(
            out.newly_authenticated,
            Some(AuthenticatedUser {
                client_id: CODY.to_string(),
                display_name: "Cody".to_string()
            })
        );
        assert_eq!(connection.get_meta_str(CLIENT_ID_META_KEY).as_deref(), Some(CODY));

        let again = transformer.transform_inbound(&connection, envelope(CODY, CODY_TOKEN, b"\x00\x02"));
        assert_eq!(&again.payload.buffer()[..], b"\x00\x02");
        assert!(again.newly_authenticated.is_none());
        assert!(!connection.is_disconnected());
    }

    #[test]
    fn test_short_envelope_is_rejected_before_lookup() {
        // The client id here belongs to nobody; the length check must fire first
        let transformer = AuthenticatingTransformer::new(0x69, false, UserDirectory::new());
        let (connection, _rx) = connection();

        let mut short = vec![0x69];
        short.extend_from_slice(&[0xab; 35]);
        let result = transformer.authenticate(&connection, &MessageReader::new(short));
        assert_eq!(result.unwrap_err(), AuthError::InvalidLength { length: 36 });
    }

    #[test]
    fn test_header_only_envelope_yields_empty_payload() {
        let transformer = AuthenticatingTransformer::new(0x69, true, UserDirectory::new());
        let (connection, _rx) = connection();

        let out = transformer.transform_inbound(&connection, envelope(CODY, "irrelevant", b""));
        assert!(out.payload.is_empty());
        assert!(!connection.is_disconnected());
    }

    #[test]
    fn test_unknown_user() {
        let transformer = AuthenticatingTransformer::new(0x69, false, users());
        let (connection, _rx) = connection();

        let out = transformer.transform_inbound(
            &connection,
            envelope("3af27ba3f117422fb399093a1393ec0e", "secret", b"\x00"),
        );
        assert!(out.payload.is_empty());
        assert_eq!(
            connection.disconnect_reason(),
            Some(&DisconnectReason::custom("Unknown user"))
        );
    }

    #[test]
    fn test_second_identity_on_bound_connection_is_rejected() {
        let transformer = AuthenticatingTransformer::new(0x69, false, users());
        let (connection, _rx) = connection();

        transformer.transform_inbound(&connection, envelope(CODY, CODY_TOKEN, b"\x00"));
        let out = transformer.transform_inbound(&connection, envelope(ROSE, ROSE_TOKEN, b"\x00"));

        assert!(out.payload.is_empty());
        assert_eq!(
            connection.disconnect_reason(),
            Some(&DisconnectReason::custom("Wrong connection for user"))
        );
    }

    #[test]
    fn test_unauthenticated_policy() {
        let (connection, _rx) = connection();
        let plain = MessageReader::from_raw_bytes(&[0x01, 0x00, 0x01]);

        let permissive = AuthenticatingTransformer::new(0x69, false, users());
        let out = permissive.transform_inbound(&connection, plain.clone());
        assert_eq!(out.payload, plain);
        assert!(!connection.is_disconnected());

        let strict = AuthenticatingTransformer::new(0x69, true, users());
        let out = strict.transform_inbound(&connection, plain);
        assert!(out.payload.is_empty());
        assert_eq!(
            connection.disconnect_reason(),
            Some(&DisconnectReason::custom(
                "This server does not support unauthenticated packets"
            ))
        );
    }

    #[test]
    fn test_empty_datagram_is_unauthenticated() {
        let (connection, _rx) = connection();
        let strict = AuthenticatingTransformer::new(0x69, true, users());
        assert_eq!(
            strict.authenticate(&connection, &MessageReader::empty()).unwrap_err(),
            AuthError::Unauthenticated
        );
    }

    #[test]
    fn test_from_config_rejects_bad_client_id() {
        let config = AuthConfig {
            users: vec![UserConfig {
                client_id: "not-hex".into(),
                token: "t".into(),
                name: "n".into(),
            }],
            ..AuthConfig::default()
        };
        assert!(AuthenticatingTransformer::from_config(&config).is_err());
    }
}
