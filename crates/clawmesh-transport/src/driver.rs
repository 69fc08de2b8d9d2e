//! The per-connection driver task: one per accepted or dialed socket,
//! after a successful handshake. Owns the `Conn` exclusively, so it is the
//! only writer; incoming requests are dispatched to a handler and the
//! response written back inline, incoming responses feed the registry's
//! pending-RPC table, and incoming events go to an event handler.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::conn::Conn;
use crate::registry::SessionRegistryHandle;
use crate::wire::{WireError, WireFrame};

#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(
        &self,
        from_device_id: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, WireError>;
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, from_device_id: &str, event: &str, payload: serde_json::Value);
}

/// Drive one connection until it closes. `conn_id` must already be
/// registered with `registry` under `device_id` before this is called.
pub async fn run_connection<S>(
    mut conn: Conn<S>,
    conn_id: String,
    device_id: String,
    mut outbound_rx: UnboundedReceiver<WireFrame>,
    registry: SessionRegistryHandle,
    request_handler: std::sync::Arc<dyn RequestHandler>,
    event_handler: std::sync::Arc<dyn EventHandler>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(frame) => {
                        if conn.send(&frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = conn.recv() => {
                match inbound {
                    Ok(Some(WireFrame::Req { id, method, params })) => {
                        let result = request_handler.handle(&device_id, &method, params).await;
                        let response = match result {
                            Ok(payload) => WireFrame::ok_response(id, payload),
                            Err(error) => WireFrame::err_response(id, error),
                        };
                        if conn.send(&response).await.is_err() {
                            break;
                        }
                    }
                    Ok(Some(WireFrame::Res { id, ok, payload, error })) => {
                        registry.handle_rpc_result(id, ok, payload, error).await;
                    }
                    Ok(Some(WireFrame::Event { event, payload })) => {
                        event_handler.handle(&device_id, &event, payload).await;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(device_id = %device_id, error = %e, "connection read failed");
                        break;
                    }
                }
            }
        }
    }

    conn.close().await;
    registry.unregister(conn_id).await;
}
