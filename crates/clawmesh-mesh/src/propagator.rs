//! Hop-limited context gossip: broadcast a frame to every connected peer,
//! and relay an inbound frame onward (minus the peer it arrived from) until
//! its hop budget is exhausted. A bounded seen-set makes both broadcast and
//! relay idempotent under replay without growing forever.

use std::collections::{HashSet, VecDeque};

use uuid::Uuid;

use clawmesh_proto::ContextFrame;

use crate::world_model::WorldModel;
use clawmesh_transport::SessionRegistryHandle;

pub const DEFAULT_MAX_GOSSIP_HOPS: u32 = 3;
pub const DEFAULT_MAX_SEEN_IDS: usize = 5000;

pub struct ContextPropagator {
    local_device_id: String,
    max_hops: u32,
    max_seen_ids: usize,
    seen_order: VecDeque<String>,
    seen_set: HashSet<String>,
}

impl ContextPropagator {
    pub fn new(local_device_id: impl Into<String>) -> Self {
        Self::with_limits(local_device_id, DEFAULT_MAX_GOSSIP_HOPS, DEFAULT_MAX_SEEN_IDS)
    }

    pub fn with_limits(local_device_id: impl Into<String>, max_hops: u32, max_seen_ids: usize) -> Self {
        ContextPropagator {
            local_device_id: local_device_id.into(),
            max_hops,
            max_seen_ids,
            seen_order: VecDeque::new(),
            seen_set: HashSet::new(),
        }
    }

    /// Records `id` as seen. Returns `false` if it was already known. When
    /// the bound is exceeded, trims down to the most recent 75% rather than
    /// evicting one at a time, so a burst doesn't thrash the eviction path.
    fn mark_seen(&mut self, id: &str) -> bool {
        if self.seen_set.contains(id) {
            return false;
        }
        self.seen_set.insert(id.to_string());
        self.seen_order.push_back(id.to_string());
        if self.seen_order.len() > self.max_seen_ids {
            let keep = (self.max_seen_ids * 3) / 4;
            let drop_count = self.seen_order.len() - keep;
            for _ in 0..drop_count {
                if let Some(old) = self.seen_order.pop_front() {
                    self.seen_set.remove(&old);
                }
            }
        }
        true
    }

    /// Originate a new frame from this node: derives its identity key from
    /// `payload` (per [`clawmesh_proto::derive_identity_key`]), stamps
    /// id/source/timestamp/hop count, ingests it locally, and emits it to
    /// every connected peer.
    pub fn broadcast(
        &mut self,
        registry: &SessionRegistryHandle,
        world_model: &mut WorldModel,
        kind: impl Into<String>,
        payload: serde_json::Value,
        now_ms: i64,
    ) -> ContextFrame {
        let kind = kind.into();
        let identity_key = clawmesh_proto::derive_identity_key(&kind, &payload);
        self.stamp_and_publish(registry, world_model, kind, identity_key, payload, now_ms)
    }

    fn stamp_and_publish(
        &mut self,
        registry: &SessionRegistryHandle,
        world_model: &mut WorldModel,
        kind: String,
        identity_key: String,
        payload: serde_json::Value,
        now_ms: i64,
    ) -> ContextFrame {
        let frame = ContextFrame {
            id: Uuid::new_v4().to_string(),
            source_device_id: self.local_device_id.clone(),
            kind,
            identity_key,
            payload,
            hop_count: 0,
            max_hops: self.max_hops,
            created_at_ms: now_ms,
        };
        self.mark_seen(&frame.id);
        world_model.ingest(frame.clone());
        registry.broadcast_event(
            "context.frame",
            serde_json::to_value(&frame).expect("context frame serializes"),
        );
        frame
    }

    /// Handle a frame relayed by `from_device_id`. Own frames that looped
    /// back are dropped (and marked seen, so a second loop is cheaper to
    /// detect); already-seen frames are dropped silently; otherwise the
    /// frame is ingested into the world model and, if it has hop budget
    /// left, relayed to every peer except the one it arrived from.
    pub async fn handle_inbound(
        &mut self,
        registry: &SessionRegistryHandle,
        world_model: &mut WorldModel,
        frame: ContextFrame,
        from_device_id: &str,
    ) {
        if frame.source_device_id == self.local_device_id {
            self.mark_seen(&frame.id);
            return;
        }
        if !self.mark_seen(&frame.id) {
            return;
        }

        world_model.ingest(frame.clone());

        if frame.exhausted() {
            return;
        }

        let relayed = frame.relayed();
        let payload = serde_json::to_value(&relayed).expect("context frame serializes");
        for peer in registry.list_connected().await {
            if peer.device_id != from_device_id {
                registry.send_event(peer.device_id, "context.frame", payload.clone());
            }
        }
    }

    /// Identity is derived from `data` itself, before it's wrapped in the
    /// `{data, trust}` envelope — the envelope's `trust` block must never
    /// factor into a frame's identity.
    fn broadcast_tagged(
        &mut self,
        registry: &SessionRegistryHandle,
        world_model: &mut WorldModel,
        kind: &str,
        data: serde_json::Value,
        evidence_source: &str,
        evidence_trust_tier: &str,
        now_ms: i64,
    ) -> ContextFrame {
        let identity_key = clawmesh_proto::derive_identity_key(kind, &data);
        let payload = serde_json::json!({
            "data": data,
            "trust": {
                "evidenceSources": [evidence_source],
                "evidenceTrustTier": evidence_trust_tier,
            },
        });
        self.stamp_and_publish(registry, world_model, kind.to_string(), identity_key, payload, now_ms)
    }

    /// A sensor or other machine-observed fact — `T2_operational_observation`.
    pub fn broadcast_observation(
        &mut self,
        registry: &SessionRegistryHandle,
        world_model: &mut WorldModel,
        data: serde_json::Value,
        now_ms: i64,
    ) -> ContextFrame {
        self.broadcast_tagged(
            registry,
            world_model,
            "observation",
            data,
            "sensor",
            "T2_operational_observation",
            now_ms,
        )
    }

    /// Direct human input — `T3_verified_action_evidence`.
    pub fn broadcast_human_input(
        &mut self,
        registry: &SessionRegistryHandle,
        world_model: &mut WorldModel,
        data: serde_json::Value,
        now_ms: i64,
    ) -> ContextFrame {
        self.broadcast_tagged(
            registry,
            world_model,
            "human_input",
            data,
            "human",
            "T3_verified_action_evidence",
            now_ms,
        )
    }

    /// Model-generated inference or plan — `T0_planning_inference`.
    pub fn broadcast_inference(
        &mut self,
        registry: &SessionRegistryHandle,
        world_model: &mut WorldModel,
        data: serde_json::Value,
        now_ms: i64,
    ) -> ContextFrame {
        self.broadcast_tagged(
            registry,
            world_model,
            "inference",
            data,
            "llm",
            "T0_planning_inference",
            now_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: &str, source: &str, hop: u32, max_hops: u32) -> ContextFrame {
        ContextFrame {
            id: id.into(),
            source_device_id: source.into(),
            kind: "observation".into(),
            identity_key: "kitchen".into(),
            payload: serde_json::json!({}),
            hop_count: hop,
            max_hops,
            created_at_ms: 0,
        }
    }

    #[tokio::test]
    async fn broadcast_stamps_and_ingests_locally() {
        let registry = SessionRegistryHandle::spawn();
        let mut propagator = ContextPropagator::new("node-local");
        let mut world_model = WorldModel::default();
        let frame = propagator.broadcast(
            &registry,
            &mut world_model,
            "observation",
            serde_json::json!({"zone": "kitchen", "metric": "temperature", "celsius": 21}),
            1_700_000_000_000,
        );
        assert_eq!(frame.source_device_id, "node-local");
        assert_eq!(frame.hop_count, 0);
        assert_eq!(
            frame.identity_key,
            clawmesh_proto::derive_identity_key(
                "observation",
                &serde_json::json!({"zone": "kitchen", "metric": "temperature"})
            )
        );
        assert_eq!(world_model.size(), 1);
    }

    #[tokio::test]
    async fn inbound_own_frame_is_dropped_as_a_loop() {
        let registry = SessionRegistryHandle::spawn();
        let mut propagator = ContextPropagator::new("node-local");
        let mut world_model = WorldModel::default();
        propagator
            .handle_inbound(&registry, &mut world_model, frame("f1", "node-local", 0, 3), "node-b")
            .await;
        assert_eq!(world_model.size(), 0, "a looped-back own frame must not be ingested");
    }

    #[tokio::test]
    async fn inbound_frame_past_hop_limit_is_ingested_but_not_relayed() {
        let registry = SessionRegistryHandle::spawn();
        let mut propagator = ContextPropagator::new("node-local");
        let mut world_model = WorldModel::default();
        propagator
            .handle_inbound(&registry, &mut world_model, frame("f1", "node-remote", 3, 3), "node-b")
            .await;
        assert_eq!(world_model.size(), 1, "still applied locally even at the hop limit");
    }

    #[tokio::test]
    async fn duplicate_inbound_frame_is_ignored() {
        let registry = SessionRegistryHandle::spawn();
        let mut propagator = ContextPropagator::new("node-local");
        let mut world_model = WorldModel::default();
        propagator
            .handle_inbound(&registry, &mut world_model, frame("f1", "node-remote", 0, 3), "node-b")
            .await;
        let mut updated = frame("f1", "node-remote", 0, 3);
        updated.payload = serde_json::json!({"celsius": 99});
        propagator
            .handle_inbound(&registry, &mut world_model, updated, "node-b")
            .await;
        let key = clawmesh_proto::WorldModelKey {
            source_device_id: "node-remote".into(),
            kind: "observation".into(),
            identity_key: "kitchen".into(),
        };
        assert_eq!(world_model.get(&key).unwrap().payload, serde_json::json!({}));
    }

    #[test]
    fn seen_set_trims_to_three_quarters_when_bound_exceeded() {
        let mut propagator = ContextPropagator::with_limits("node-local", 3, 4);
        for i in 0..5 {
            propagator.mark_seen(&format!("id-{i}"));
        }
        assert_eq!(propagator.seen_order.len(), 3);
        assert!(!propagator.seen_set.contains("id-0"));
        assert!(propagator.seen_set.contains("id-4"));
    }

    #[tokio::test]
    async fn broadcast_observation_tags_sensor_and_operational_tier() {
        let registry = SessionRegistryHandle::spawn();
        let mut propagator = ContextPropagator::new("node-local");
        let mut world_model = WorldModel::default();
        let frame = propagator.broadcast_observation(
            &registry,
            &mut world_model,
            serde_json::json!({"zone": "kitchen", "metric": "temperature", "celsius": 21}),
            0,
        );
        assert_eq!(frame.payload["trust"]["evidenceSources"][0], "sensor");
        assert_eq!(frame.payload["trust"]["evidenceTrustTier"], "T2_operational_observation");
        assert_eq!(
            frame.identity_key,
            clawmesh_proto::derive_identity_key(
                "observation",
                &serde_json::json!({"zone": "kitchen", "metric": "temperature"})
            )
        );
    }

    #[tokio::test]
    async fn broadcast_observation_without_zone_and_metric_falls_back_to_canonical_data() {
        let registry = SessionRegistryHandle::spawn();
        let mut propagator = ContextPropagator::new("node-local");
        let mut world_model = WorldModel::default();
        let data = serde_json::json!({"celsius": 21});
        let frame = propagator.broadcast_observation(&registry, &mut world_model, data.clone(), 0);
        assert_eq!(frame.identity_key, clawmesh_proto::derive_identity_key("observation", &data));
    }
}
