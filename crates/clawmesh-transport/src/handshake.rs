//! Mutual authentication over an already-accepted transport connection.
//! The canonical signing string and its verification are pure and
//! synchronous; the socket round-trip that carries them lives in
//! [`crate::listener`]/[`crate::dialer`].

use base64::Engine;
use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};

use clawmesh_identity::Identity;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Clock-drift tolerance for a handshake's `signedAtMs`.
pub const CLOCK_DRIFT_MS: i64 = 5 * 60 * 1000;

/// `mesh.connect | v1 | deviceId | signedAtMs [ | nonce ]`
pub fn canonical_signing_string(device_id: &str, signed_at_ms: i64, nonce: Option<&str>) -> String {
    match nonce {
        Some(nonce) => format!("mesh.connect|v1|{device_id}|{signed_at_ms}|{nonce}"),
        None => format!("mesh.connect|v1|{device_id}|{signed_at_ms}"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthPayload {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
    pub signature: String,
    #[serde(rename = "signedAtMs")]
    pub signed_at_ms: i64,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
}

impl AuthPayload {
    /// Build and sign an auth payload as the local identity.
    pub fn sign(
        identity: &Identity,
        signed_at_ms: i64,
        nonce: Option<&str>,
        display_name: Option<String>,
        capabilities: Option<Vec<String>>,
    ) -> Self {
        let message = canonical_signing_string(identity.device_id(), signed_at_ms, nonce);
        let signature = identity.sign(message.as_bytes());
        AuthPayload {
            device_id: identity.device_id().to_string(),
            public_key: B64.encode(identity.verifying_key().as_bytes()),
            signature: B64.encode(signature.to_bytes()),
            signed_at_ms,
            display_name,
            capabilities,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("INVALID_PARAMS")]
    InvalidParams,
    #[error("UNTRUSTED_PEER")]
    UntrustedPeer,
    #[error("AUTH_FAILED")]
    AuthFailed,
    #[error("TLS_FINGERPRINT_MISMATCH")]
    TlsFingerprintMismatch,
}

impl HandshakeError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParams => "INVALID_PARAMS",
            Self::UntrustedPeer => "UNTRUSTED_PEER",
            Self::AuthFailed => "AUTH_FAILED",
            Self::TlsFingerprintMismatch => "TLS_FINGERPRINT_MISMATCH",
        }
    }
}

/// Verify a received auth payload: trust membership, signature validity,
/// clock drift, and (if the peer was discovered with one) TLS fingerprint.
pub fn verify_auth_payload(
    payload: &AuthPayload,
    nonce: Option<&str>,
    now_ms: i64,
    is_trusted: impl FnOnce(&str) -> bool,
    expected_tls_fingerprint: Option<&str>,
    observed_tls_fingerprint: Option<&str>,
) -> Result<(), HandshakeError> {
    if !is_trusted(&payload.device_id) {
        return Err(HandshakeError::UntrustedPeer);
    }

    let public_key_bytes = B64
        .decode(&payload.public_key)
        .map_err(|_| HandshakeError::InvalidParams)?;
    let public_key_bytes: [u8; 32] = public_key_bytes
        .try_into()
        .map_err(|_| HandshakeError::InvalidParams)?;
    let verifying_key =
        VerifyingKey::from_bytes(&public_key_bytes).map_err(|_| HandshakeError::InvalidParams)?;

    let expected_device_id = Identity::device_id_for(&verifying_key);
    if expected_device_id != payload.device_id {
        return Err(HandshakeError::AuthFailed);
    }

    let signature_bytes = B64
        .decode(&payload.signature)
        .map_err(|_| HandshakeError::InvalidParams)?;
    let signature_bytes: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| HandshakeError::InvalidParams)?;
    let signature = Signature::from_bytes(&signature_bytes);

    if (now_ms - payload.signed_at_ms).abs() >= CLOCK_DRIFT_MS {
        return Err(HandshakeError::AuthFailed);
    }

    let message = canonical_signing_string(&payload.device_id, payload.signed_at_ms, nonce);
    clawmesh_identity::verify(&verifying_key, message.as_bytes(), &signature)
        .map_err(|_| HandshakeError::AuthFailed)?;

    if let Some(expected) = expected_tls_fingerprint {
        match observed_tls_fingerprint {
            Some(observed) if observed == expected => {}
            _ => return Err(HandshakeError::TlsFingerprintMismatch),
        }
    }

    Ok(())
}

/// When both peers discover each other concurrently, only the
/// lexicographically smaller `deviceId` initiates.
pub fn should_initiate(local_device_id: &str, remote_device_id: &str) -> bool {
    local_device_id < remote_device_id
}
