//! The local world model: a latest-wins store keyed by
//! `(sourceDeviceId, kind, identityKey)`, plus a bounded ring buffer of raw
//! frames for recency queries that don't care about supersession.

use std::collections::HashMap;
use std::collections::VecDeque;

use clawmesh_proto::{ContextFrame, WorldModelKey};

const DEFAULT_MAX_HISTORY: usize = 1000;

struct Entry {
    frame: ContextFrame,
    update_count: u64,
}

pub struct WorldModel {
    latest: HashMap<WorldModelKey, Entry>,
    seen_frame_ids: std::collections::HashSet<String>,
    history: VecDeque<ContextFrame>,
    max_history: usize,
}

impl Default for WorldModel {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl WorldModel {
    pub fn new(max_history: usize) -> Self {
        WorldModel {
            latest: HashMap::new(),
            seen_frame_ids: std::collections::HashSet::new(),
            history: VecDeque::new(),
            max_history,
        }
    }

    /// Ingest a frame. A repeat of an already-seen `frameId` is a no-op
    /// (idempotent under gossip replay). Otherwise upserts the latest-wins
    /// entry for the frame's key and appends to the bounded history.
    pub fn ingest(&mut self, frame: ContextFrame) -> bool {
        if !self.seen_frame_ids.insert(frame.id.clone()) {
            return false;
        }

        let key = frame.world_model_key();
        let update_count = self.latest.get(&key).map(|e| e.update_count + 1).unwrap_or(1);
        self.latest.insert(
            key,
            Entry {
                frame: frame.clone(),
                update_count,
            },
        );

        self.history.push_back(frame);
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
        true
    }

    pub fn get(&self, key: &WorldModelKey) -> Option<&ContextFrame> {
        self.latest.get(key).map(|e| &e.frame)
    }

    pub fn update_count(&self, key: &WorldModelKey) -> u64 {
        self.latest.get(key).map(|e| e.update_count).unwrap_or(0)
    }

    pub fn get_by_kind(&self, kind: &str) -> Vec<&ContextFrame> {
        let mut found: Vec<&ContextFrame> = self
            .latest
            .values()
            .filter(|e| e.frame.kind == kind)
            .map(|e| &e.frame)
            .collect();
        found.sort_by(|a, b| a.world_model_key().cmp(&b.world_model_key()));
        found
    }

    pub fn get_all(&self) -> Vec<&ContextFrame> {
        let mut found: Vec<&ContextFrame> = self.latest.values().map(|e| &e.frame).collect();
        found.sort_by(|a, b| a.world_model_key().cmp(&b.world_model_key()));
        found
    }

    /// The `limit` most recently ingested raw frames, newest last, fresh
    /// replays included even if they did not change the latest-wins entry.
    pub fn get_recent_frames(&self, limit: usize) -> Vec<&ContextFrame> {
        let skip = self.history.len().saturating_sub(limit);
        self.history.iter().skip(skip).collect()
    }

    pub fn size(&self) -> usize {
        self.latest.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: &str, source: &str, kind: &str, identity: &str, hop: u32) -> ContextFrame {
        ContextFrame {
            id: id.into(),
            source_device_id: source.into(),
            kind: kind.into(),
            identity_key: identity.into(),
            payload: serde_json::json!({}),
            hop_count: hop,
            max_hops: 3,
            created_at_ms: 0,
        }
    }

    #[test]
    fn ingest_stores_by_composite_key() {
        let mut wm = WorldModel::default();
        wm.ingest(frame("f1", "dev-a", "sensor.temp", "kitchen", 0));
        let key = WorldModelKey {
            source_device_id: "dev-a".into(),
            kind: "sensor.temp".into(),
            identity_key: "kitchen".into(),
        };
        assert!(wm.get(&key).is_some());
        assert_eq!(wm.size(), 1);
    }

    #[test]
    fn later_frame_with_same_key_supersedes_earlier_one() {
        let mut wm = WorldModel::default();
        wm.ingest(frame("f1", "dev-a", "sensor.temp", "kitchen", 0));
        let mut second = frame("f2", "dev-a", "sensor.temp", "kitchen", 0);
        second.payload = serde_json::json!({"celsius": 22});
        wm.ingest(second);
        let key = WorldModelKey {
            source_device_id: "dev-a".into(),
            kind: "sensor.temp".into(),
            identity_key: "kitchen".into(),
        };
        assert_eq!(wm.get(&key).unwrap().id, "f2");
        assert_eq!(wm.update_count(&key), 2);
        assert_eq!(wm.size(), 1, "same key replaces, it does not add a new entry");
    }

    #[test]
    fn repeated_frame_id_is_ignored() {
        let mut wm = WorldModel::default();
        assert!(wm.ingest(frame("f1", "dev-a", "sensor.temp", "kitchen", 0)));
        assert!(!wm.ingest(frame("f1", "dev-a", "sensor.temp", "kitchen", 1)));
    }

    #[test]
    fn history_is_bounded_and_keeps_most_recent() {
        let mut wm = WorldModel::new(2);
        wm.ingest(frame("f1", "dev-a", "sensor.temp", "a", 0));
        wm.ingest(frame("f2", "dev-a", "sensor.temp", "b", 0));
        wm.ingest(frame("f3", "dev-a", "sensor.temp", "c", 0));
        let recent: Vec<&str> = wm.get_recent_frames(10).iter().map(|f| f.id.as_str()).collect();
        assert_eq!(recent, vec!["f2", "f3"]);
    }

    #[test]
    fn get_by_kind_filters() {
        let mut wm = WorldModel::default();
        wm.ingest(frame("f1", "dev-a", "sensor.temp", "a", 0));
        wm.ingest(frame("f2", "dev-a", "task.status", "b", 0));
        assert_eq!(wm.get_by_kind("sensor.temp").len(), 1);
        assert_eq!(wm.get_by_kind("task.status").len(), 1);
        assert_eq!(wm.get_by_kind("nonexistent").len(), 0);
    }
}
