//! The standard method/event dispatch table: `mesh.peers`, `mesh.status`,
//! `mesh.trust.{list,add,remove}`, `mesh.message.forward`, and `context.frame`.
//! `mesh.connect` is not dispatched here — it is consumed entirely inside
//! the transport handshake and never reaches a running session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;

use clawmesh_identity::TrustStore;
use clawmesh_mesh::MeshForwardHandler;
use clawmesh_proto::ContextFrame;
use clawmesh_transport::{EventHandler, RequestHandler, SessionRegistryHandle, WireError};

use crate::propagation::Propagation;

pub struct NodeRequestHandler {
    pub(crate) local_device_id: String,
    pub(crate) registry: SessionRegistryHandle,
    pub(crate) trust_store: Arc<Mutex<TrustStore>>,
    pub(crate) forward_handler: MeshForwardHandler,
    pub(crate) extra: HashMap<String, Arc<dyn RequestHandler>>,
}

#[derive(Deserialize)]
struct TrustMutationParams {
    #[serde(rename = "deviceId")]
    device_id: String,
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
    #[serde(rename = "publicKey", default)]
    public_key: Option<String>,
}

#[derive(Deserialize)]
struct TrustRemovalParams {
    #[serde(rename = "deviceId")]
    device_id: String,
}

#[async_trait]
impl RequestHandler for NodeRequestHandler {
    async fn handle(
        &self,
        from_device_id: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, WireError> {
        match method {
            "mesh.peers" => {
                let peers = self.registry.list_connected().await;
                Ok(serde_json::json!({
                    "peers": peers.into_iter().map(|p| serde_json::json!({
                        "deviceId": p.device_id,
                        "displayName": p.display_name,
                        "outbound": p.outbound,
                        "capabilities": p.capabilities,
                        "connectedAtMs": p.connected_at_ms,
                    })).collect::<Vec<_>>(),
                }))
            }
            "mesh.status" => {
                let peers = self.registry.list_connected().await;
                Ok(serde_json::json!({
                    "localDeviceId": self.local_device_id,
                    "connectedPeers": peers.len(),
                    "peers": peers.into_iter().map(|p| serde_json::json!({
                        "deviceId": p.device_id,
                        "displayName": p.display_name,
                        "outbound": p.outbound,
                        "capabilities": p.capabilities,
                        "connectedAtMs": p.connected_at_ms,
                    })).collect::<Vec<_>>(),
                }))
            }
            "mesh.trust.list" => {
                let store = self.trust_store.lock().unwrap();
                let peers: Vec<_> = store
                    .list()
                    .into_iter()
                    .map(|p| {
                        serde_json::json!({
                            "deviceId": p.device_id,
                            "displayName": p.display_name,
                            "addedAtIso": p.added_at_iso,
                        })
                    })
                    .collect();
                Ok(serde_json::json!({ "peers": peers }))
            }
            "mesh.trust.add" => {
                let params: TrustMutationParams = serde_json::from_value(params)
                    .map_err(|e| WireError::new("INVALID_PARAMS", e.to_string()))?;
                if params.device_id.is_empty() {
                    return Err(WireError::new("INVALID_PARAMS", "deviceId is required"));
                }
                let peer = clawmesh_identity::TrustedPeer {
                    device_id: params.device_id.clone(),
                    display_name: params.display_name,
                    public_key: params.public_key,
                    added_at_iso: chrono::Utc::now().to_rfc3339(),
                };
                let mut store = self.trust_store.lock().unwrap();
                store
                    .add(peer)
                    .map_err(|e| WireError::new("INTERNAL_ERROR", e.to_string()))?;
                Ok(serde_json::json!({ "added": true, "deviceId": params.device_id }))
            }
            "mesh.trust.remove" => {
                let params: TrustRemovalParams = serde_json::from_value(params)
                    .map_err(|e| WireError::new("INVALID_PARAMS", e.to_string()))?;
                if params.device_id.is_empty() {
                    return Err(WireError::new("INVALID_PARAMS", "deviceId is required"));
                }
                let mut store = self.trust_store.lock().unwrap();
                let removed = store
                    .remove(&params.device_id)
                    .map_err(|e| WireError::new("INTERNAL_ERROR", e.to_string()))?;
                Ok(serde_json::json!({ "removed": removed, "deviceId": params.device_id }))
            }
            "mesh.message.forward" => {
                self.forward_handler.handle(from_device_id, method, params).await
            }
            other => match self.extra.get(other) {
                Some(handler) => handler.handle(from_device_id, other, params).await,
                None => Err(WireError::new("UNKNOWN_METHOD", other)),
            },
        }
    }
}

pub struct NodeEventHandler {
    pub(crate) propagation: Propagation,
    pub(crate) registry: SessionRegistryHandle,
    pub(crate) extra: Option<Arc<dyn EventHandler>>,
}

#[async_trait]
impl EventHandler for NodeEventHandler {
    async fn handle(&self, from_device_id: &str, event: &str, payload: serde_json::Value) {
        if event == "context.frame" {
            match serde_json::from_value::<ContextFrame>(payload) {
                Ok(frame) => {
                    self.propagation
                        .handle_inbound(&self.registry, frame, from_device_id)
                        .await;
                }
                Err(e) => {
                    tracing::warn!(from = %from_device_id, error = %e, "malformed context.frame event");
                }
            }
            return;
        }

        if let Some(extra) = &self.extra {
            extra.handle(from_device_id, event, payload).await;
        }
    }
}
