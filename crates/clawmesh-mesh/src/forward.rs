//! `forwardMessageToPeer` (sender side) and the `mesh.message.forward`
//! receiver handler. The trust policy gate runs at both: sender-side to
//! fail fast, receiver-side before any local side effect — both must
//! refuse the same inputs for the same reasons, since both call the same
//! pure functions in `clawmesh-proto`.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use clawmesh_proto::{
    create_command_envelope, evaluate_forward_trust, resolve_forward_trust, CommandEnvelope,
    CommandSource, CommandTarget, ForwardPayload, Operation, RawTrust, ResolveError, TrustDenial,
};
use clawmesh_transport::{RequestHandler, RpcError, SessionRegistryHandle, WireError};

/// The not-yet-materialized half of a forward: build an envelope from
/// scratch rather than passing an already-built one.
pub struct CommandDraft {
    pub source: CommandSource,
    pub target: CommandTarget,
    pub operation: Operation,
    pub trust: Option<RawTrust>,
    pub note: Option<String>,
}

pub struct ForwardRequest {
    pub peer_device_id: String,
    pub channel: String,
    pub to: String,
    pub message: Option<String>,
    pub media_url: Option<String>,
    pub account_id: Option<String>,
    pub origin_gateway_id: String,
    pub idempotency_key: Option<String>,
    pub command: Option<CommandEnvelope>,
    pub command_draft: Option<CommandDraft>,
    pub trust: Option<RawTrust>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForwardAck {
    pub ok: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForwardError {
    #[error("INVALID_COMMAND_ENVELOPE")]
    InvalidCommandEnvelope,
    #[error("TRUST_ENVELOPE_MISMATCH")]
    TrustEnvelopeMismatch,
    #[error("{0}")]
    TrustDenial(TrustDenial),
    #[error("{0}")]
    Rpc(RpcError),
}

impl From<ResolveError> for ForwardError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::InvalidCommandEnvelope => Self::InvalidCommandEnvelope,
            ResolveError::TrustEnvelopeMismatch => Self::TrustEnvelopeMismatch,
        }
    }
}

/// Sender side. Materializes a draft into an envelope if given, derives
/// top-level trust from the envelope when not supplied, generates an
/// `idempotencyKey` if missing, evaluates policy locally before sending,
/// then invokes `mesh.message.forward` on the peer.
pub async fn forward_message_to_peer(
    req: ForwardRequest,
    registry: &SessionRegistryHandle,
    now_ms: i64,
) -> Result<ForwardAck, ForwardError> {
    let command = match (req.command, req.command_draft) {
        (Some(envelope), _) => Some(envelope),
        (None, Some(draft)) => Some(create_command_envelope(
            Uuid::new_v4().to_string(),
            now_ms,
            draft.source,
            draft.target,
            draft.operation,
            draft.trust,
            draft.note,
        )),
        (None, None) => None,
    };

    let trust = req
        .trust
        .clone()
        .or_else(|| command.as_ref().and_then(|c| c.trust.clone()));
    let idempotency_key = req
        .idempotency_key
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let payload = ForwardPayload {
        channel: req.channel,
        to: req.to,
        message: req.message,
        media_url: req.media_url,
        account_id: req.account_id,
        origin_gateway_id: req.origin_gateway_id,
        idempotency_key,
        command: command
            .as_ref()
            .map(|c| serde_json::to_value(c).expect("envelope serializes")),
        trust,
    };

    let resolved = resolve_forward_trust(&payload)?;
    evaluate_forward_trust(resolved.as_ref()).map_err(ForwardError::TrustDenial)?;

    let response = registry
        .invoke(
            req.peer_device_id,
            "mesh.message.forward",
            serde_json::to_value(&payload).expect("forward payload serializes"),
        )
        .await
        .map_err(ForwardError::Rpc)?;

    let message_id = response
        .get("messageId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    Ok(ForwardAck {
        ok: true,
        message_id,
        error: None,
    })
}

/// The actual side effect a forward causes once accepted — handed in by the
/// host application (e.g. "send this WhatsApp message"), so this crate never
/// needs to know about any specific channel implementation.
#[async_trait]
pub trait ForwardSink: Send + Sync {
    async fn deliver(&self, payload: &ForwardPayload) -> Result<String, String>;
}

/// The `mesh.message.forward` receiver handler.
pub struct MeshForwardHandler {
    local_device_id: String,
    sink: Arc<dyn ForwardSink>,
}

impl MeshForwardHandler {
    pub fn new(local_device_id: impl Into<String>, sink: Arc<dyn ForwardSink>) -> Self {
        MeshForwardHandler {
            local_device_id: local_device_id.into(),
            sink,
        }
    }
}

#[async_trait]
impl RequestHandler for MeshForwardHandler {
    async fn handle(
        &self,
        _from_device_id: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, WireError> {
        if method != "mesh.message.forward" {
            return Err(WireError::new("UNKNOWN_METHOD", method));
        }

        let payload: ForwardPayload = serde_json::from_value(params)
            .map_err(|e| WireError::new("INVALID_PARAMS", e.to_string()))?;

        if payload.channel.is_empty() || payload.to.is_empty() || payload.origin_gateway_id.is_empty() {
            return Err(WireError::new(
                "INVALID_PARAMS",
                "channel, to, and originGatewayId are required",
            ));
        }
        if payload.origin_gateway_id == self.local_device_id {
            return Err(WireError::new("LOOP_DETECTED", "forward originated from this node"));
        }

        let resolved = resolve_forward_trust(&payload).map_err(|e| match e {
            ResolveError::InvalidCommandEnvelope => {
                WireError::new("INVALID_COMMAND_ENVELOPE", e.to_string())
            }
            ResolveError::TrustEnvelopeMismatch => {
                WireError::new("TRUST_ENVELOPE_MISMATCH", e.to_string())
            }
        })?;

        if let Err(denial) = evaluate_forward_trust(resolved.as_ref()) {
            return Err(WireError::new(denial.code(), denial.to_string()));
        }

        match self.sink.deliver(&payload).await {
            Ok(message_id) => Ok(serde_json::json!({
                "messageId": message_id,
                "channel": payload.channel,
            })),
            Err(reason) => Err(WireError::new("DELIVERY_FAILED", reason)),
        }
    }
}
