//! Inbound side: accept a TCP connection, upgrade to WebSocket, run the
//! server half of the handshake, then hand off to the connection driver.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use uuid::Uuid;

use clawmesh_identity::Identity;

use crate::conn::Conn;
use crate::driver::{run_connection, EventHandler, RequestHandler};
use crate::handshake::{verify_auth_payload, AuthPayload, HandshakeError};
use crate::registry::SessionRegistryHandle;
use crate::session::PeerSession;
use crate::wire::WireFrame;

/// Accept connections forever, spawning one driver task per successful
/// handshake. A failed handshake is logged and the connection dropped; it
/// never brings down the accept loop.
#[allow(clippy::too_many_arguments)]
pub async fn accept_loop(
    listener: TcpListener,
    identity: Arc<Identity>,
    is_trusted: Arc<dyn Fn(&str) -> bool + Send + Sync>,
    registry: SessionRegistryHandle,
    request_handler: Arc<dyn RequestHandler>,
    event_handler: Arc<dyn EventHandler>,
    local_capabilities: Vec<String>,
) {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "tcp accept failed");
                continue;
            }
        };

        let identity = identity.clone();
        let is_trusted = is_trusted.clone();
        let registry = registry.clone();
        let request_handler = request_handler.clone();
        let event_handler = event_handler.clone();
        let local_capabilities = local_capabilities.clone();

        tokio::spawn(async move {
            if let Err(e) = accept_one(
                stream,
                peer_addr,
                identity,
                is_trusted,
                registry,
                request_handler,
                event_handler,
                local_capabilities,
            )
            .await
            {
                tracing::warn!(peer = %peer_addr, error = %e, "inbound handshake failed");
            }
        });
    }
}

#[allow(clippy::too_many_arguments)]
async fn accept_one(
    stream: TcpStream,
    _peer_addr: SocketAddr,
    identity: Arc<Identity>,
    is_trusted: Arc<dyn Fn(&str) -> bool + Send + Sync>,
    registry: SessionRegistryHandle,
    request_handler: Arc<dyn RequestHandler>,
    event_handler: Arc<dyn EventHandler>,
    local_capabilities: Vec<String>,
) -> Result<(), HandshakeError> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|_| HandshakeError::InvalidParams)?;
    let mut conn = Conn::new(ws);

    let nonce = Uuid::new_v4().to_string();
    conn.send(&WireFrame::Event {
        event: "mesh.connect.challenge".into(),
        payload: serde_json::json!({ "nonce": nonce }),
    })
    .await
    .map_err(|_| HandshakeError::InvalidParams)?;

    let (req_id, client_payload) = match conn.recv().await.map_err(|_| HandshakeError::InvalidParams)? {
        Some(WireFrame::Req { id, method, params }) if method == "mesh.connect" => {
            let payload: AuthPayload =
                serde_json::from_value(params).map_err(|_| HandshakeError::InvalidParams)?;
            (id, payload)
        }
        _ => return Err(HandshakeError::InvalidParams),
    };

    let now_ms = chrono::Utc::now().timestamp_millis();
    verify_auth_payload(
        &client_payload,
        Some(&nonce),
        now_ms,
        |device_id| is_trusted(device_id),
        None,
        None,
    )?;

    let server_payload = AuthPayload::sign(
        &identity,
        now_ms,
        Some(&nonce),
        None,
        Some(local_capabilities),
    );
    conn.send(&WireFrame::ok_response(
        req_id,
        serde_json::to_value(&server_payload).expect("auth payload serializes"),
    ))
    .await
    .map_err(|_| HandshakeError::AuthFailed)?;

    let conn_id = Uuid::new_v4().to_string();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let device_id = client_payload.device_id.clone();
    let session = PeerSession {
        conn_id: conn_id.clone(),
        device_id: device_id.clone(),
        display_name: client_payload.display_name,
        capabilities: client_payload.capabilities.unwrap_or_default(),
        outbound: false,
        connected_at_ms: now_ms,
        outbound_tx,
    };
    registry.register(session).await;

    run_connection(
        conn,
        conn_id,
        device_id,
        outbound_rx,
        registry,
        request_handler,
        event_handler,
    )
    .await;

    Ok(())
}
