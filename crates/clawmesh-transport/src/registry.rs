//! The peer session registry: the dual index `deviceId -> session` /
//! `connId -> deviceId`, plus the pending-RPC table. Single-owner by actor
//! task, mirroring the teacher's `P2pHandle`/`P2pCommand` split — a
//! cheap-to-clone handle that only ever talks to the owning task over a
//! channel, so the indexes themselves are never shared behind a lock.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::RpcError;
use crate::session::{ConnectedPeer, PeerSession};
use crate::wire::{WireError, WireFrame};

const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

enum Command {
    Register {
        session: PeerSession,
        reply: oneshot::Sender<()>,
    },
    Unregister {
        conn_id: String,
        reply: oneshot::Sender<()>,
    },
    Invoke {
        device_id: String,
        method: String,
        params: serde_json::Value,
        timeout: Duration,
        reply: oneshot::Sender<Result<serde_json::Value, RpcError>>,
    },
    Timeout {
        id: String,
    },
    HandleRpcResult {
        id: String,
        ok: bool,
        payload: Option<serde_json::Value>,
        error: Option<WireError>,
        reply: oneshot::Sender<bool>,
    },
    BroadcastEvent {
        event: String,
        payload: serde_json::Value,
    },
    SendEvent {
        device_id: String,
        event: String,
        payload: serde_json::Value,
    },
    ListConnected {
        reply: oneshot::Sender<Vec<ConnectedPeer>>,
    },
    Shutdown {
        reply: oneshot::Sender<usize>,
    },
}

struct PendingRpc {
    device_id: String,
    reply: oneshot::Sender<Result<serde_json::Value, RpcError>>,
}

struct Inner {
    by_device: HashMap<String, PeerSession>,
    conn_to_device: HashMap<String, String>,
    pending: HashMap<String, PendingRpc>,
}

/// A cheap-to-clone handle to the registry actor.
#[derive(Clone)]
pub struct SessionRegistryHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SessionRegistryHandle {
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        let self_tx = tx.clone();

        tokio::spawn(async move {
            let mut inner = Inner {
                by_device: HashMap::new(),
                conn_to_device: HashMap::new(),
                pending: HashMap::new(),
            };

            while let Some(cmd) = rx.recv().await {
                handle_command(&mut inner, cmd, &self_tx);
            }
        });

        SessionRegistryHandle { tx }
    }

    /// Register a session, evicting any existing session for the same
    /// `device_id` first (closing nothing itself — eviction here means its
    /// pending RPCs fail and its mapping is dropped; the socket close is the
    /// caller's responsibility once this returns).
    pub async fn register(&self, session: PeerSession) {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(Command::Register { session, reply });
        let _ = rx.await;
    }

    pub async fn unregister(&self, conn_id: impl Into<String>) {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(Command::Unregister {
            conn_id: conn_id.into(),
            reply,
        });
        let _ = rx.await;
    }

    pub async fn invoke(
        &self,
        device_id: impl Into<String>,
        method: impl Into<String>,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, RpcError> {
        self.invoke_with_timeout(device_id, method, params, DEFAULT_RPC_TIMEOUT)
            .await
    }

    pub async fn invoke_with_timeout(
        &self,
        device_id: impl Into<String>,
        method: impl Into<String>,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, RpcError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(Command::Invoke {
            device_id: device_id.into(),
            method: method.into(),
            params,
            timeout,
            reply,
        });
        rx.await.unwrap_or(Err(RpcError::PeerDisconnected))
    }

    /// Match a response to a pending request. Returns whether a pending
    /// request with this id existed.
    pub async fn handle_rpc_result(
        &self,
        id: impl Into<String>,
        ok: bool,
        payload: Option<serde_json::Value>,
        error: Option<WireError>,
    ) -> bool {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(Command::HandleRpcResult {
            id: id.into(),
            ok,
            payload,
            error,
            reply,
        });
        rx.await.unwrap_or(false)
    }

    pub fn broadcast_event(&self, event: impl Into<String>, payload: serde_json::Value) {
        let _ = self.tx.send(Command::BroadcastEvent {
            event: event.into(),
            payload,
        });
    }

    pub fn send_event(
        &self,
        device_id: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) {
        let _ = self.tx.send(Command::SendEvent {
            device_id: device_id.into(),
            event: event.into(),
            payload,
        });
    }

    pub async fn list_connected(&self) -> Vec<ConnectedPeer> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(Command::ListConnected { reply });
        rx.await.unwrap_or_default()
    }

    /// Drop every live session and fail every pending RPC with
    /// `PeerDisconnected`. Dropping a session's `outbound_tx` makes its
    /// `run_connection` task observe a closed outbound channel on its next
    /// `select!` turn, which closes that session's socket and unregisters it.
    /// Returns the number of sessions that were live at the time of the call.
    pub async fn shutdown(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(Command::Shutdown { reply });
        rx.await.unwrap_or(0)
    }
}

fn handle_command(inner: &mut Inner, cmd: Command, self_tx: &mpsc::UnboundedSender<Command>) {
    match cmd {
        Command::Register { session, reply } => {
            if let Some(old) = inner.by_device.remove(&session.device_id) {
                inner.conn_to_device.remove(&old.conn_id);
                fail_pending(inner, &old.device_id, RpcError::PeerDisconnected);
            }
            inner
                .conn_to_device
                .insert(session.conn_id.clone(), session.device_id.clone());
            inner.by_device.insert(session.device_id.clone(), session);
            let _ = reply.send(());
        }
        Command::Unregister { conn_id, reply } => {
            if let Some(device_id) = inner.conn_to_device.get(&conn_id).cloned() {
                let still_current = inner
                    .by_device
                    .get(&device_id)
                    .map(|s| s.conn_id == conn_id)
                    .unwrap_or(false);
                if still_current {
                    inner.by_device.remove(&device_id);
                    inner.conn_to_device.remove(&conn_id);
                    fail_pending(inner, &device_id, RpcError::PeerDisconnected);
                }
            }
            let _ = reply.send(());
        }
        Command::Invoke {
            device_id,
            method,
            params,
            timeout,
            reply,
        } => {
            let Some(session) = inner.by_device.get(&device_id) else {
                let _ = reply.send(Err(RpcError::NotConnected));
                return;
            };
            let id = Uuid::new_v4().to_string();
            let frame = WireFrame::Req {
                id: id.clone(),
                method,
                params,
            };
            if session.outbound_tx.send(frame).is_err() {
                let _ = reply.send(Err(RpcError::SendFailed));
                return;
            }
            inner.pending.insert(
                id.clone(),
                PendingRpc {
                    device_id,
                    reply,
                },
            );
            let timeout_tx = self_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let _ = timeout_tx.send(Command::Timeout { id });
            });
        }
        Command::Timeout { id } => {
            if let Some(pending) = inner.pending.remove(&id) {
                let _ = pending.reply.send(Err(RpcError::Timeout));
            }
        }
        Command::HandleRpcResult {
            id,
            ok,
            payload,
            error,
            reply,
        } => {
            let Some(pending) = inner.pending.remove(&id) else {
                let _ = reply.send(false);
                return;
            };
            let result = if ok {
                Ok(payload.unwrap_or(serde_json::Value::Null))
            } else {
                let error = error.unwrap_or_else(|| WireError::new("UNKNOWN", "no error detail"));
                Err(RpcError::Remote(error.code, error.message))
            };
            let _ = pending.reply.send(result);
            let _ = reply.send(true);
        }
        Command::BroadcastEvent { event, payload } => {
            for session in inner.by_device.values() {
                let frame = WireFrame::Event {
                    event: event.clone(),
                    payload: payload.clone(),
                };
                let _ = session.outbound_tx.send(frame);
            }
        }
        Command::SendEvent {
            device_id,
            event,
            payload,
        } => {
            if let Some(session) = inner.by_device.get(&device_id) {
                let _ = session.outbound_tx.send(WireFrame::Event { event, payload });
            }
        }
        Command::ListConnected { reply } => {
            let snapshot = inner.by_device.values().map(ConnectedPeer::from).collect();
            let _ = reply.send(snapshot);
        }
        Command::Shutdown { reply } => {
            let count = inner.by_device.len();
            inner.by_device.clear();
            inner.conn_to_device.clear();
            for (_, pending) in inner.pending.drain() {
                let _ = pending.reply.send(Err(RpcError::PeerDisconnected));
            }
            let _ = reply.send(count);
        }
    }
}

fn fail_pending(inner: &mut Inner, device_id: &str, err: RpcError) {
    let ids: Vec<String> = inner
        .pending
        .iter()
        .filter(|(_, p)| p.device_id == device_id)
        .map(|(id, _)| id.clone())
        .collect();
    for id in ids {
        if let Some(pending) = inner.pending.remove(&id) {
            let _ = pending.reply.send(Err(err.clone()));
        }
    }
}
