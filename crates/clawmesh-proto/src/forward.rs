//! `mesh.message.forward` payload shape and resolution of its authoritative
//! trust block (top-level `trust` vs. an embedded command envelope's
//! `trust`, which must agree when both are present).

use serde::{Deserialize, Serialize};

use crate::envelope::{validate_command_envelope, RawTrust};
use crate::error::ResolveError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardPayload {
    pub channel: String,
    pub to: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "mediaUrl", default)]
    pub media_url: Option<String>,
    #[serde(rename = "accountId", default)]
    pub account_id: Option<String>,
    #[serde(rename = "originGatewayId")]
    pub origin_gateway_id: String,
    #[serde(rename = "idempotencyKey")]
    pub idempotency_key: String,
    /// Raw JSON so a malformed embedded envelope can be reported as
    /// `INVALID_COMMAND_ENVELOPE` rather than failing the whole payload parse.
    #[serde(default)]
    pub command: Option<serde_json::Value>,
    #[serde(default)]
    pub trust: Option<RawTrust>,
}

/// Resolve the trust block that governs this forward.
///
/// - Neither present: `Ok(None)`, the legacy path.
/// - Only one present: that one is authoritative.
/// - Both present: they must agree under [`RawTrust::canonical`] comparison,
///   else [`ResolveError::TrustEnvelopeMismatch`].
/// - An embedded `command` that fails envelope validation is
///   [`ResolveError::InvalidCommandEnvelope`], independent of whether its
///   trust block would otherwise have mattered.
pub fn resolve_forward_trust(payload: &ForwardPayload) -> Result<Option<RawTrust>, ResolveError> {
    let envelope_trust = match &payload.command {
        None => None,
        Some(raw) => {
            let envelope = validate_command_envelope(raw)
                .map_err(|_| ResolveError::InvalidCommandEnvelope)?;
            envelope.trust
        }
    };

    match (&envelope_trust, &payload.trust) {
        (Some(e), Some(t)) => {
            if e.canonical() != t.canonical() {
                return Err(ResolveError::TrustEnvelopeMismatch);
            }
            Ok(Some(e.clone()))
        }
        (Some(e), None) => Ok(Some(e.clone())),
        (None, Some(t)) => Ok(Some(t.clone())),
        (None, None) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{create_command_envelope, CommandSource, CommandTarget, Operation, TargetKind};

    fn trust_block() -> RawTrust {
        RawTrust {
            action_type: Some("actuation".into()),
            evidence_trust_tier: Some("T3_verified_action_evidence".into()),
            minimum_trust_tier: Some("T2_operational_observation".into()),
            verification_required: Some("none".into()),
            verification_satisfied: None,
            evidence_sources: Some(vec!["sensor".into(), "device".into()]),
            approved_by: None,
        }
    }

    fn base_payload() -> ForwardPayload {
        ForwardPayload {
            channel: "whatsapp".into(),
            to: "+15551230000".into(),
            message: Some("hello".into()),
            media_url: None,
            account_id: None,
            origin_gateway_id: "node-a".into(),
            idempotency_key: "idem-1".into(),
            command: None,
            trust: None,
        }
    }

    #[test]
    fn neither_present_resolves_to_none() {
        assert_eq!(resolve_forward_trust(&base_payload()), Ok(None));
    }

    #[test]
    fn only_top_level_trust_is_authoritative() {
        let mut payload = base_payload();
        payload.trust = Some(trust_block());
        assert_eq!(resolve_forward_trust(&payload), Ok(Some(trust_block())));
    }

    #[test]
    fn matching_envelope_and_top_level_trust_agree() {
        let envelope = create_command_envelope(
            "cmd-1",
            0,
            CommandSource {
                node_id: "node-a".into(),
                role: None,
            },
            CommandTarget {
                kind: TargetKind::Capability,
                reference: "channel:whatsapp".into(),
            },
            Operation {
                name: "send".into(),
                params: None,
            },
            Some(trust_block()),
            None,
        );
        let mut payload = base_payload();
        payload.command = Some(serde_json::to_value(&envelope).unwrap());
        // reordered evidence_sources — still canonically equal
        let mut reordered = trust_block();
        reordered.evidence_sources = Some(vec!["device".into(), "sensor".into()]);
        payload.trust = Some(reordered);
        assert!(resolve_forward_trust(&payload).is_ok());
    }

    #[test]
    fn disagreeing_envelope_and_top_level_trust_mismatch() {
        let envelope = create_command_envelope(
            "cmd-1",
            0,
            CommandSource {
                node_id: "node-a".into(),
                role: None,
            },
            CommandTarget {
                kind: TargetKind::Capability,
                reference: "channel:whatsapp".into(),
            },
            Operation {
                name: "send".into(),
                params: None,
            },
            Some(trust_block()),
            None,
        );
        let mut payload = base_payload();
        payload.command = Some(serde_json::to_value(&envelope).unwrap());
        let mut different = trust_block();
        different.verification_required = Some("device".into());
        payload.trust = Some(different);
        assert_eq!(
            resolve_forward_trust(&payload),
            Err(ResolveError::TrustEnvelopeMismatch)
        );
    }

    #[test]
    fn malformed_embedded_envelope_is_invalid_command_envelope() {
        let mut payload = base_payload();
        payload.command = Some(serde_json::json!({ "version": 1, "kind": "not-a-command" }));
        assert_eq!(
            resolve_forward_trust(&payload),
            Err(ResolveError::InvalidCommandEnvelope)
        );
    }
}
