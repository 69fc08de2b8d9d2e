//! The signed, versioned command envelope (v1) and its structural
//! validation. Validation here is shape-and-domain only; policy (can this
//! actuation actually proceed) lives in [`crate::trust_policy`].

use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;
use crate::tier::{ActionType, TrustTier, VerificationRequirement};

pub const ENVELOPE_VERSION: u32 = 1;
pub const ENVELOPE_KIND: &str = "command";

/// Wire-level trust block. Tier/verification/action fields are kept as raw
/// strings so an out-of-domain value can be reported as a typed policy
/// denial (`INVALID_TRUST_POLICY`) instead of a hard deserialization error
/// from a single malformed peer killing the whole envelope parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTrust {
    pub action_type: Option<String>,
    pub evidence_trust_tier: Option<String>,
    pub minimum_trust_tier: Option<String>,
    pub verification_required: Option<String>,
    #[serde(default)]
    pub verification_satisfied: Option<bool>,
    #[serde(default)]
    pub evidence_sources: Option<Vec<String>>,
    #[serde(default)]
    pub approved_by: Option<Vec<String>>,
}

impl RawTrust {
    /// A canonical form for cross-comparison: sorted `evidence_sources` and
    /// `approved_by` so set-equal-but-reordered blocks compare equal.
    pub fn canonical(&self) -> RawTrust {
        let mut c = self.clone();
        if let Some(sources) = &mut c.evidence_sources {
            sources.sort();
        }
        if let Some(approvers) = &mut c.approved_by {
            approvers.sort();
        }
        c
    }

    pub(crate) fn parsed_action_type(&self) -> Option<ActionType> {
        self.action_type.as_deref().and_then(ActionType::parse)
    }

    pub(crate) fn parsed_evidence_tier(&self) -> Result<Option<TrustTier>, ()> {
        parse_optional(&self.evidence_trust_tier, TrustTier::parse)
    }

    pub(crate) fn parsed_minimum_tier(&self) -> Result<Option<TrustTier>, ()> {
        parse_optional(&self.minimum_trust_tier, TrustTier::parse)
    }

    pub(crate) fn parsed_verification_required(
        &self,
    ) -> Result<Option<VerificationRequirement>, ()> {
        parse_optional(&self.verification_required, VerificationRequirement::parse)
    }
}

fn parse_optional<T>(value: &Option<String>, parse: impl Fn(&str) -> Option<T>) -> Result<Option<T>, ()> {
    match value {
        None => Ok(None),
        Some(s) => parse(s).map(Some).ok_or(()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSource {
    pub node_id: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Capability,
    Device,
    Peer,
    Task,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTarget {
    pub kind: TargetKind,
    #[serde(rename = "ref")]
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

/// The command envelope itself. `trust` is optional at this layer: a
/// missing trust block is the legacy path and is accepted here; whether a
/// given *forward* is allowed to omit it is a forwarding-layer rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub version: u32,
    pub kind: String,
    #[serde(rename = "commandId")]
    pub command_id: String,
    #[serde(rename = "createdAtMs")]
    pub created_at_ms: i64,
    pub source: CommandSource,
    pub target: CommandTarget,
    pub operation: Operation,
    #[serde(default)]
    pub trust: Option<RawTrust>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Build a well-formed v1 envelope. Does not validate `trust` beyond
/// constructing it as given — callers that care call
/// [`validate_command_envelope`] on the result, same as for any
/// received envelope.
#[allow(clippy::too_many_arguments)]
pub fn create_command_envelope(
    command_id: impl Into<String>,
    created_at_ms: i64,
    source: CommandSource,
    target: CommandTarget,
    operation: Operation,
    trust: Option<RawTrust>,
    note: Option<String>,
) -> CommandEnvelope {
    CommandEnvelope {
        version: ENVELOPE_VERSION,
        kind: ENVELOPE_KIND.to_string(),
        command_id: command_id.into(),
        created_at_ms,
        source,
        target,
        operation,
        trust,
        note,
    }
}

/// Validate a received envelope's shape and, if a trust block is present,
/// the domain of its enum fields. Returns the parsed envelope on success.
pub fn validate_command_envelope(value: &serde_json::Value) -> Result<CommandEnvelope, EnvelopeError> {
    let envelope: CommandEnvelope =
        serde_json::from_value(value.clone()).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

    if envelope.version != ENVELOPE_VERSION {
        return Err(EnvelopeError::UnsupportedVersion(envelope.version));
    }
    if envelope.kind != ENVELOPE_KIND {
        return Err(EnvelopeError::UnsupportedKind(envelope.kind));
    }
    if envelope.command_id.is_empty() {
        return Err(EnvelopeError::EmptyCommandId);
    }

    if let Some(trust) = &envelope.trust {
        if let Some(action_type) = &trust.action_type {
            if ActionType::parse(action_type).is_none() {
                return Err(EnvelopeError::Malformed(format!(
                    "unknown trust.action_type {action_type:?}"
                )));
            }
        }
        if trust.parsed_evidence_tier().is_err() {
            return Err(EnvelopeError::Malformed(
                "trust.evidence_trust_tier outside its domain".into(),
            ));
        }
        if trust.parsed_minimum_tier().is_err() {
            return Err(EnvelopeError::Malformed(
                "trust.minimum_trust_tier outside its domain".into(),
            ));
        }
        if trust.parsed_verification_required().is_err() {
            return Err(EnvelopeError::Malformed(
                "trust.verification_required outside its domain".into(),
            ));
        }
    }

    Ok(envelope)
}
