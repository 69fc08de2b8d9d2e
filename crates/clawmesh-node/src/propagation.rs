//! A cloneable handle bundling the context propagator and world model so
//! the rest of the node never has to reason about lock ordering between
//! them — always propagator, then world model.

use std::sync::Arc;

use tokio::sync::Mutex;

use clawmesh_mesh::{ContextPropagator, WorldModel};
use clawmesh_proto::{ContextFrame, WorldModelKey};
use clawmesh_transport::SessionRegistryHandle;

#[derive(Clone)]
pub struct Propagation {
    propagator: Arc<Mutex<ContextPropagator>>,
    world_model: Arc<Mutex<WorldModel>>,
}

impl Propagation {
    pub fn new(local_device_id: impl Into<String>) -> Self {
        Propagation {
            propagator: Arc::new(Mutex::new(ContextPropagator::new(local_device_id))),
            world_model: Arc::new(Mutex::new(WorldModel::default())),
        }
    }

    pub async fn handle_inbound(
        &self,
        registry: &SessionRegistryHandle,
        frame: ContextFrame,
        from_device_id: &str,
    ) {
        let mut propagator = self.propagator.lock().await;
        let mut world_model = self.world_model.lock().await;
        propagator
            .handle_inbound(registry, &mut world_model, frame, from_device_id)
            .await;
    }

    pub async fn broadcast(
        &self,
        registry: &SessionRegistryHandle,
        kind: impl Into<String>,
        payload: serde_json::Value,
        now_ms: i64,
    ) -> ContextFrame {
        let mut propagator = self.propagator.lock().await;
        let mut world_model = self.world_model.lock().await;
        propagator.broadcast(registry, &mut world_model, kind, payload, now_ms)
    }

    pub async fn broadcast_observation(
        &self,
        registry: &SessionRegistryHandle,
        data: serde_json::Value,
        now_ms: i64,
    ) -> ContextFrame {
        let mut propagator = self.propagator.lock().await;
        let mut world_model = self.world_model.lock().await;
        propagator.broadcast_observation(registry, &mut world_model, data, now_ms)
    }

    pub async fn broadcast_human_input(
        &self,
        registry: &SessionRegistryHandle,
        data: serde_json::Value,
        now_ms: i64,
    ) -> ContextFrame {
        let mut propagator = self.propagator.lock().await;
        let mut world_model = self.world_model.lock().await;
        propagator.broadcast_human_input(registry, &mut world_model, data, now_ms)
    }

    pub async fn broadcast_inference(
        &self,
        registry: &SessionRegistryHandle,
        data: serde_json::Value,
        now_ms: i64,
    ) -> ContextFrame {
        let mut propagator = self.propagator.lock().await;
        let mut world_model = self.world_model.lock().await;
        propagator.broadcast_inference(registry, &mut world_model, data, now_ms)
    }

    pub async fn get(&self, key: &WorldModelKey) -> Option<ContextFrame> {
        self.world_model.lock().await.get(key).cloned()
    }

    pub async fn get_all(&self) -> Vec<ContextFrame> {
        self.world_model
            .lock()
            .await
            .get_all()
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn size(&self) -> usize {
        self.world_model.lock().await.size()
    }
}
