//! `deviceId -> set<capability>`. Capability matching is literal-string
//! equality — no wildcards, no type coercion.

use std::collections::{HashMap, HashSet};

use clawmesh_proto::Capability;

#[derive(Default)]
pub struct CapabilityRegistry {
    by_device: HashMap<String, HashSet<Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the full capability set for `device_id`.
    pub fn update_peer(&mut self, device_id: impl Into<String>, capabilities: HashSet<Capability>) {
        self.by_device.insert(device_id.into(), capabilities);
    }

    pub fn remove_peer(&mut self, device_id: &str) {
        self.by_device.remove(device_id);
    }

    pub fn find_peer_with_channel(&self, name: &str) -> Option<&str> {
        self.find_peer_with(&format!("channel:{name}"))
    }

    pub fn find_peer_with_skill(&self, name: &str) -> Option<&str> {
        self.find_peer_with(&format!("skill:{name}"))
    }

    /// First match, ordered by ascending `deviceId` for a stable result
    /// across identical registry snapshots.
    fn find_peer_with(&self, capability: &str) -> Option<&str> {
        let Ok(capability) = Capability::parse(capability) else {
            return None;
        };
        let mut candidates: Vec<&str> = self
            .by_device
            .iter()
            .filter(|(_, caps)| caps.contains(&capability))
            .map(|(device_id, _)| device_id.as_str())
            .collect();
        candidates.sort_unstable();
        candidates.into_iter().next()
    }

    pub fn find_peers_with_capability(&self, capability: &Capability) -> Vec<&str> {
        let mut found: Vec<&str> = self
            .by_device
            .iter()
            .filter(|(_, caps)| caps.contains(capability))
            .map(|(device_id, _)| device_id.as_str())
            .collect();
        found.sort_unstable();
        found
    }
}
