//! Outbound side: dial a peer's WebSocket listener and run the client half
//! of the handshake.

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use clawmesh_identity::Identity;

use crate::conn::Conn;
use crate::driver::{run_connection, EventHandler, RequestHandler};
use crate::handshake::{verify_auth_payload, AuthPayload, HandshakeError};
use crate::registry::SessionRegistryHandle;
use crate::session::PeerSession;
use crate::wire::WireFrame;

/// Dial `url`, complete the handshake, register the resulting session, and
/// spawn its connection driver. Returns the remote peer's `deviceId` on
/// success.
#[allow(clippy::too_many_arguments)]
pub async fn dial(
    url: &str,
    identity: Arc<Identity>,
    is_trusted: Arc<dyn Fn(&str) -> bool + Send + Sync>,
    expected_tls_fingerprint: Option<String>,
    registry: SessionRegistryHandle,
    request_handler: Arc<dyn RequestHandler>,
    event_handler: Arc<dyn EventHandler>,
    local_capabilities: Vec<String>,
) -> Result<String, HandshakeError> {
    let (ws, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|_| HandshakeError::InvalidParams)?;
    let mut conn = Conn::new(ws);

    let nonce = match conn.recv().await.map_err(|_| HandshakeError::InvalidParams)? {
        Some(WireFrame::Event { event, payload }) if event == "mesh.connect.challenge" => payload
            .get("nonce")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or(HandshakeError::InvalidParams)?,
        _ => return Err(HandshakeError::InvalidParams),
    };

    let now_ms = chrono::Utc::now().timestamp_millis();
    let client_payload = AuthPayload::sign(&identity, now_ms, Some(&nonce), None, Some(local_capabilities));
    let req_id = Uuid::new_v4().to_string();
    conn.send(&WireFrame::Req {
        id: req_id.clone(),
        method: "mesh.connect".into(),
        params: serde_json::to_value(&client_payload).expect("auth payload serializes"),
    })
    .await
    .map_err(|_| HandshakeError::InvalidParams)?;

    let server_payload: AuthPayload = match conn.recv().await.map_err(|_| HandshakeError::InvalidParams)? {
        Some(WireFrame::Res { id, ok, payload, .. }) if id == req_id && ok => {
            serde_json::from_value(payload.ok_or(HandshakeError::InvalidParams)?)
                .map_err(|_| HandshakeError::InvalidParams)?
        }
        _ => return Err(HandshakeError::AuthFailed),
    };

    verify_auth_payload(
        &server_payload,
        Some(&nonce),
        now_ms,
        |device_id| is_trusted(device_id),
        expected_tls_fingerprint.as_deref(),
        None,
    )?;

    let conn_id = Uuid::new_v4().to_string();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let device_id = server_payload.device_id.clone();
    let session = PeerSession {
        conn_id: conn_id.clone(),
        device_id: device_id.clone(),
        display_name: server_payload.display_name,
        capabilities: server_payload.capabilities.unwrap_or_default(),
        outbound: true,
        connected_at_ms: now_ms,
        outbound_tx,
    };
    registry.register(session).await;

    tokio::spawn(run_connection(
        conn,
        conn_id,
        device_id.clone(),
        outbound_rx,
        registry,
        request_handler,
        event_handler,
    ));

    Ok(device_id)
}
