//! The trusted-peer store: `deviceId -> TrustedPeer`, persisted as
//! `mesh/trusted-peers.json`.
//!
//! Writes are atomic (temp file + rename) and guarded by an OS advisory
//! exclusive lock on a sidecar `.lock` file so two processes touching the
//! same store (e.g. the running node and a pairing CLI) cannot interleave a
//! read-modify-write and corrupt it. Lock acquisition retries with jittered
//! backoff rather than blocking forever.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs4::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::TrustStoreError;
use crate::identity::write_secret_file;

/// An entry in the trust set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedPeer {
    pub device_id: String,
    pub display_name: Option<String>,
    /// Base64-encoded Ed25519 public key, if known ahead of the handshake.
    pub public_key: Option<String>,
    pub added_at_iso: String,
}

#[derive(Default, Serialize, Deserialize)]
struct OnDiskTrustStore {
    version: u32,
    peers: Vec<TrustedPeer>,
}

const STORE_VERSION: u32 = 1;
const LOCK_MAX_ATTEMPTS: u32 = 20;
const LOCK_BASE_BACKOFF: Duration = Duration::from_millis(10);

/// The trust set: `deviceId -> TrustedPeer`, insertion idempotent by
/// `deviceId`. Backed by a file; every mutating call re-reads, mutates, and
/// persists under the lock so concurrent writers never race.
pub struct TrustStore {
    path: PathBuf,
    peers: HashMap<String, TrustedPeer>,
}

impl TrustStore {
    /// Load the store at `path`, or start empty if the file does not exist
    /// yet (first run: nobody is trusted until explicitly added).
    pub fn load(path: &Path) -> Result<Self, TrustStoreError> {
        let peers = if path.exists() {
            Self::read_locked(path)?
        } else {
            HashMap::new()
        };
        Ok(TrustStore {
            path: path.to_path_buf(),
            peers,
        })
    }

    /// Is `device_id` currently trusted?
    pub fn contains(&self, device_id: &str) -> bool {
        self.peers.contains_key(device_id)
    }

    /// Look up a trusted peer's entry.
    pub fn get(&self, device_id: &str) -> Option<&TrustedPeer> {
        self.peers.get(device_id)
    }

    /// All trusted peers, in no particular order.
    pub fn list(&self) -> Vec<&TrustedPeer> {
        self.peers.values().collect()
    }

    /// Add or replace a trusted peer. Idempotent by `device_id`: re-adding
    /// the same id overwrites the stored display name / public key.
    pub fn add(&mut self, peer: TrustedPeer) -> Result<(), TrustStoreError> {
        self.mutate_locked(|peers| {
            peers.insert(peer.device_id.clone(), peer.clone());
        })
    }

    /// Remove a trusted peer. Returns whether it was present.
    pub fn remove(&mut self, device_id: &str) -> Result<bool, TrustStoreError> {
        let mut removed = false;
        self.mutate_locked(|peers| {
            removed = peers.remove(device_id).is_some();
        })?;
        Ok(removed)
    }

    /// Re-read the on-disk file under lock, apply `f` to the in-memory map,
    /// then persist. The lock is held for the whole read-modify-write cycle.
    fn mutate_locked(
        &mut self,
        f: impl FnOnce(&mut HashMap<String, TrustedPeer>),
    ) -> Result<(), TrustStoreError> {
        let lock_path = lock_sibling(&self.path);
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| TrustStoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let lock_file = acquire_lock(&lock_path)?;

        // Re-read so we don't clobber a concurrent writer's change.
        let mut peers = if self.path.exists() {
            Self::read_unlocked(&self.path)?
        } else {
            HashMap::new()
        };
        f(&mut peers);
        Self::persist(&self.path, &peers)?;
        self.peers = peers;

        FileExt::unlock(&lock_file).ok();
        Ok(())
    }

    fn read_locked(path: &Path) -> Result<HashMap<String, TrustedPeer>, TrustStoreError> {
        let lock_path = lock_sibling(path);
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| TrustStoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let lock_file = acquire_lock(&lock_path)?;
        let peers = Self::read_unlocked(path)?;
        FileExt::unlock(&lock_file).ok();
        Ok(peers)
    }

    fn read_unlocked(path: &Path) -> Result<HashMap<String, TrustedPeer>, TrustStoreError> {
        let text = std::fs::read_to_string(path).map_err(|source| TrustStoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let on_disk: OnDiskTrustStore =
            serde_json::from_str(&text).map_err(|e| TrustStoreError::Malformed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(on_disk
            .peers
            .into_iter()
            .map(|p| (p.device_id.clone(), p))
            .collect())
    }

    fn persist(path: &Path, peers: &HashMap<String, TrustedPeer>) -> Result<(), TrustStoreError> {
        let mut list: Vec<TrustedPeer> = peers.values().cloned().collect();
        list.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        let on_disk = OnDiskTrustStore {
            version: STORE_VERSION,
            peers: list,
        };
        let json = serde_json::to_string_pretty(&on_disk).map_err(|e| TrustStoreError::Malformed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        write_secret_file(path, json.as_bytes()).map_err(|source| TrustStoreError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

fn lock_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

/// Acquire an exclusive advisory lock on `lock_path`, retrying with jittered
/// backoff up to `LOCK_MAX_ATTEMPTS` times rather than blocking indefinitely.
fn acquire_lock(lock_path: &Path) -> Result<File, TrustStoreError> {
    let file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .map_err(|source| TrustStoreError::Io {
            path: lock_path.display().to_string(),
            source,
        })?;

    for attempt in 0..LOCK_MAX_ATTEMPTS {
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => return Ok(file),
            Err(_) => {
                let jitter = Duration::from_millis((attempt as u64 * 7) % 13);
                std::thread::sleep(LOCK_BASE_BACKOFF * (attempt + 1) + jitter);
            }
        }
    }
    Err(TrustStoreError::LockTimeout {
        attempts: LOCK_MAX_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_peer(id: &str) -> TrustedPeer {
        TrustedPeer {
            device_id: id.to_string(),
            display_name: Some("test-peer".into()),
            public_key: None,
            added_at_iso: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::load(&dir.path().join("trusted-peers.json")).unwrap();
        assert!(!store.contains("anything"));
        assert!(store.list().is_empty());
    }

    #[test]
    fn add_then_contains_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TrustStore::load(&dir.path().join("trusted-peers.json")).unwrap();
        store.add(sample_peer("abc")).unwrap();
        assert!(store.contains("abc"));
        assert_eq!(store.get("abc").unwrap().display_name.as_deref(), Some("test-peer"));
    }

    #[test]
    fn add_is_idempotent_by_device_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TrustStore::load(&dir.path().join("trusted-peers.json")).unwrap();
        store.add(sample_peer("abc")).unwrap();
        let mut updated = sample_peer("abc");
        updated.display_name = Some("renamed".into());
        store.add(updated).unwrap();
        assert_eq!(store.list().len(), 1);
        assert_eq!(store.get("abc").unwrap().display_name.as_deref(), Some("renamed"));
    }

    #[test]
    fn remove_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TrustStore::load(&dir.path().join("trusted-peers.json")).unwrap();
        store.add(sample_peer("abc")).unwrap();
        assert!(store.remove("abc").unwrap());
        assert!(!store.remove("abc").unwrap());
        assert!(!store.contains("abc"));
    }

    #[test]
    fn persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trusted-peers.json");
        {
            let mut store = TrustStore::load(&path).unwrap();
            store.add(sample_peer("abc")).unwrap();
        }
        let reloaded = TrustStore::load(&path).unwrap();
        assert!(reloaded.contains("abc"));
    }

    #[cfg(unix)]
    #[test]
    fn store_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trusted-peers.json");
        let mut store = TrustStore::load(&path).unwrap();
        store.add(sample_peer("abc")).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
