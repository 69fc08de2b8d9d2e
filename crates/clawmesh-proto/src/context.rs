//! Context gossip frames and the composite key used to index the world
//! model that accumulates them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFrame {
    pub id: String,
    #[serde(rename = "sourceDeviceId")]
    pub source_device_id: String,
    pub kind: String,
    /// A stable identity for this piece of data within `(source, kind)`,
    /// derived automatically from the frame's data by [`derive_identity_key`]
    /// — never supplied by the broadcaster — used to decide whether a later
    /// frame supersedes an earlier one rather than coexisting with it.
    #[serde(rename = "identityKey")]
    pub identity_key: String,
    pub payload: serde_json::Value,
    #[serde(rename = "hopCount")]
    pub hop_count: u32,
    #[serde(rename = "maxHops")]
    pub max_hops: u32,
    #[serde(rename = "createdAtMs")]
    pub created_at_ms: i64,
}

impl ContextFrame {
    /// The composite key a world model stores this frame's latest value
    /// under: `(sourceDeviceId, kind, identityKey)`.
    pub fn world_model_key(&self) -> WorldModelKey {
        WorldModelKey {
            source_device_id: self.source_device_id.clone(),
            kind: self.kind.clone(),
            identity_key: self.identity_key.clone(),
        }
    }

    /// Has this frame exhausted its hop budget? A frame at `hop_count ==
    /// max_hops` has been relayed its last allowed time and should not be
    /// gossiped further, though it is still applied locally.
    pub fn exhausted(&self) -> bool {
        self.hop_count >= self.max_hops
    }

    /// A copy of this frame with `hop_count` incremented, for relaying one
    /// hop onward.
    pub fn relayed(&self) -> ContextFrame {
        let mut next = self.clone();
        next.hop_count += 1;
        next
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldModelKey {
    pub source_device_id: String,
    pub kind: String,
    pub identity_key: String,
}

/// Derive a frame's stable identity from its data, never from caller input.
/// `observation` frames whose data carries both `zone` and `metric` are
/// identified by that pair; everything else is identified by the canonical
/// JSON of `data` (serde_json's default map is key-sorted, so this is
/// already canonical without extra work).
pub fn derive_identity_key(kind: &str, data: &serde_json::Value) -> String {
    if kind == "observation" {
        if let (Some(zone), Some(metric)) = (data.get("zone"), data.get("metric")) {
            return canonical_json(&serde_json::json!({ "zone": zone, "metric": metric }));
        }
    }
    canonical_json(data)
}

fn canonical_json(value: &serde_json::Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
