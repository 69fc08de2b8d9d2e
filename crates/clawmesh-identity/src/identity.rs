//! Device identity: a long-lived Ed25519 keypair and its derived `deviceId`.
//!
//! `deviceId` is the hex-encoded SHA-256 digest of the raw verifying-key
//! bytes — stable for the life of the node, independent of any transport
//! identity. Generated once on first run and persisted with owner-only
//! permissions, mirroring the secret-file handling in the teacher's bearer
//! token store (write-to-temp, fsync, rename, mode 0o600).

use std::path::{Path, PathBuf};

use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::IdentityError;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// This node's long-lived identity.
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
    device_id: String,
}

impl Identity {
    /// Derive the hex `deviceId` from a raw Ed25519 public key.
    pub fn device_id_for(verifying_key: &VerifyingKey) -> String {
        hex::encode(Sha256::digest(verifying_key.as_bytes()))
    }

    /// Generate a fresh identity (does not touch disk).
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let device_id = Self::device_id_for(&signing_key.verifying_key());
        Identity {
            signing_key,
            device_id,
        }
    }

    /// This node's stable `deviceId`.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The public verifying key, for handing out in handshakes.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Sign an arbitrary message with this node's private key.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// Load the identity at `path`, creating and persisting a new one if the
    /// file does not exist yet. Read-after-write consistent on the same host:
    /// a freshly created identity is fsynced and renamed into place before
    /// this call returns.
    pub fn load_or_create(path: &Path) -> Result<Self, IdentityError> {
        if path.exists() {
            return Self::load(path);
        }
        let identity = Self::generate();
        identity.save(path)?;
        tracing::info!(device_id = %identity.device_id, path = %path.display(), "generated new device identity");
        Ok(identity)
    }

    fn load(path: &Path) -> Result<Self, IdentityError> {
        let text = std::fs::read_to_string(path).map_err(|source| IdentityError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let on_disk: OnDiskIdentity =
            serde_json::from_str(&text).map_err(|e| IdentityError::Malformed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let secret_bytes = B64
            .decode(on_disk.signing_key.as_bytes())
            .map_err(|e| IdentityError::Encoding(e.to_string()))?;
        let secret_bytes: [u8; 32] = secret_bytes
            .try_into()
            .map_err(|_| IdentityError::Malformed {
                path: path.display().to_string(),
                reason: "signing_key must decode to 32 bytes".into(),
            })?;
        let signing_key = SigningKey::from_bytes(&secret_bytes);
        let device_id = Self::device_id_for(&signing_key.verifying_key());
        if device_id != on_disk.device_id {
            return Err(IdentityError::Malformed {
                path: path.display().to_string(),
                reason: "stored device_id does not match the stored key".into(),
            });
        }
        Ok(Identity {
            signing_key,
            device_id,
        })
    }

    fn save(&self, path: &Path) -> Result<(), IdentityError> {
        let on_disk = OnDiskIdentity {
            device_id: self.device_id.clone(),
            signing_key: B64.encode(self.signing_key.to_bytes()),
            verifying_key: B64.encode(self.verifying_key().as_bytes()),
        };
        let json = serde_json::to_string_pretty(&on_disk).map_err(|e| IdentityError::Malformed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        write_secret_file(path, json.as_bytes()).map_err(|source| IdentityError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct OnDiskIdentity {
    device_id: String,
    signing_key: String,
    verifying_key: String,
}

/// Verify that `signature` over `message` is valid under `public_key`.
pub fn verify(
    public_key: &VerifyingKey,
    message: &[u8],
    signature: &Signature,
) -> Result<(), IdentityError> {
    public_key
        .verify(message, signature)
        .map_err(|_| IdentityError::InvalidSignature)
}

/// Write `data` to `path` atomically (temp file + rename) with mode 0o600 on
/// Unix. The parent directory is created if missing.
pub(crate) fn write_secret_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = tmp_sibling(path);

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&tmp_path)?;
        f.write_all(data)?;
        f.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        std::fs::write(&tmp_path, data)?;
    }

    std::fs::rename(&tmp_path, path)
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".tmp-{}", std::process::id()));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_is_sha256_of_public_key() {
        let identity = Identity::generate();
        let expected = hex::encode(Sha256::digest(identity.verifying_key().as_bytes()));
        assert_eq!(identity.device_id(), expected);
    }

    #[test]
    fn sign_then_verify_succeeds() {
        let identity = Identity::generate();
        let msg = b"mesh.connect|v1|abc|123";
        let sig = identity.sign(msg);
        assert!(verify(&identity.verifying_key(), msg, &sig).is_ok());
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let identity = Identity::generate();
        let sig = identity.sign(b"original");
        assert!(verify(&identity.verifying_key(), b"tampered", &sig).is_err());
    }

    #[test]
    fn load_or_create_is_idempotent_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity/device.json");

        let first = Identity::load_or_create(&path).unwrap();
        let second = Identity::load_or_create(&path).unwrap();

        assert_eq!(first.device_id(), second.device_id());
        assert_eq!(
            first.verifying_key().as_bytes(),
            second.verifying_key().as_bytes()
        );
    }

    #[cfg(unix)]
    #[test]
    fn device_json_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");
        Identity::load_or_create(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
