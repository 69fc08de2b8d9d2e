//! The trust policy gate applied to a forwarded message: given a (possibly
//! absent) trust block, decide whether the action it describes may proceed.
//! Pure and synchronous — no I/O, no suspension — so it can run inline on
//! the hot forwarding path.

use crate::envelope::RawTrust;
use crate::tier::{ActionType, EvidenceSource, VerificationRequirement};

/// Why a forward was denied. Each variant maps to exactly one wire error
/// code (see [`TrustDenial::code`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustDenial {
    InvalidTrustPolicy,
    TrustMetadataRequired,
    LlmOnlyActuationBlocked,
    InsufficientTrustTier,
    VerificationRequired,
}

impl TrustDenial {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTrustPolicy => "INVALID_TRUST_POLICY",
            Self::TrustMetadataRequired => "TRUST_METADATA_REQUIRED",
            Self::LlmOnlyActuationBlocked => "LLM_ONLY_ACTUATION_BLOCKED",
            Self::InsufficientTrustTier => "INSUFFICIENT_TRUST_TIER",
            Self::VerificationRequired => "VERIFICATION_REQUIRED",
        }
    }
}

impl std::fmt::Display for TrustDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Evaluate whether a forward may proceed given its resolved trust block.
///
/// A missing block is the legacy path and is allowed outright. Enum domain
/// violations are checked first (`INVALID_TRUST_POLICY`), independent of
/// `action_type`; everything past that only applies to `actuation` —
/// `communication`/`observation` pass once their enum shapes validate.
pub fn evaluate_forward_trust(trust: Option<&RawTrust>) -> Result<(), TrustDenial> {
    let Some(trust) = trust else {
        return Ok(());
    };

    let action_type = trust
        .action_type
        .as_deref()
        .and_then(ActionType::parse)
        .ok_or(TrustDenial::InvalidTrustPolicy)?;

    let evidence_tier = trust
        .parsed_evidence_tier()
        .map_err(|_| TrustDenial::InvalidTrustPolicy)?;
    let minimum_tier = trust
        .parsed_minimum_tier()
        .map_err(|_| TrustDenial::InvalidTrustPolicy)?;
    let verification_required = trust
        .parsed_verification_required()
        .map_err(|_| TrustDenial::InvalidTrustPolicy)?;
    let evidence_sources: Option<Vec<EvidenceSource>> = match &trust.evidence_sources {
        None => None,
        Some(raw) => Some(
            raw.iter()
                .map(|s| EvidenceSource::parse(s).ok_or(TrustDenial::InvalidTrustPolicy))
                .collect::<Result<Vec<_>, _>>()?,
        ),
    };

    if action_type != ActionType::Actuation {
        return Ok(());
    }

    let (evidence_tier, minimum_tier, verification_required) =
        match (evidence_tier, minimum_tier, verification_required) {
            (Some(e), Some(m), Some(v)) => (e, m, v),
            _ => return Err(TrustDenial::TrustMetadataRequired),
        };

    if let Some(sources) = &evidence_sources {
        if !sources.is_empty() && sources.iter().all(|s| *s == EvidenceSource::Llm) {
            return Err(TrustDenial::LlmOnlyActuationBlocked);
        }
    }

    if evidence_tier < minimum_tier {
        return Err(TrustDenial::InsufficientTrustTier);
    }

    if verification_required != VerificationRequirement::None
        && trust.verification_satisfied != Some(true)
    {
        return Err(TrustDenial::VerificationRequired);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actuation_trust() -> RawTrust {
        RawTrust {
            action_type: Some("actuation".into()),
            evidence_trust_tier: Some("T3_verified_action_evidence".into()),
            minimum_trust_tier: Some("T2_operational_observation".into()),
            verification_required: Some("none".into()),
            verification_satisfied: None,
            evidence_sources: Some(vec!["sensor".into()]),
            approved_by: None,
        }
    }

    #[test]
    fn missing_trust_is_allowed() {
        assert_eq!(evaluate_forward_trust(None), Ok(()));
    }

    #[test]
    fn communication_passes_without_tiers() {
        let trust = RawTrust {
            action_type: Some("communication".into()),
            ..Default::default()
        };
        assert_eq!(evaluate_forward_trust(Some(&trust)), Ok(()));
    }

    #[test]
    fn invalid_action_type_is_invalid_policy() {
        let trust = RawTrust {
            action_type: Some("bogus".into()),
            ..Default::default()
        };
        assert_eq!(
            evaluate_forward_trust(Some(&trust)),
            Err(TrustDenial::InvalidTrustPolicy)
        );
    }

    #[test]
    fn actuation_missing_required_fields_is_trust_metadata_required() {
        let trust = RawTrust {
            action_type: Some("actuation".into()),
            ..Default::default()
        };
        assert_eq!(
            evaluate_forward_trust(Some(&trust)),
            Err(TrustDenial::TrustMetadataRequired)
        );
    }

    #[test]
    fn actuation_with_all_llm_evidence_is_blocked() {
        let mut trust = actuation_trust();
        trust.evidence_sources = Some(vec!["llm".into(), "llm".into()]);
        assert_eq!(
            evaluate_forward_trust(Some(&trust)),
            Err(TrustDenial::LlmOnlyActuationBlocked)
        );
    }

    #[test]
    fn actuation_with_mixed_evidence_is_not_llm_only_blocked() {
        let mut trust = actuation_trust();
        trust.evidence_sources = Some(vec!["llm".into(), "sensor".into()]);
        assert_eq!(evaluate_forward_trust(Some(&trust)), Ok(()));
    }

    #[test]
    fn insufficient_tier_is_denied() {
        let mut trust = actuation_trust();
        trust.evidence_trust_tier = Some("T1_unverified_observation".into());
        assert_eq!(
            evaluate_forward_trust(Some(&trust)),
            Err(TrustDenial::InsufficientTrustTier)
        );
    }

    #[test]
    fn verification_required_but_not_satisfied_is_denied() {
        let mut trust = actuation_trust();
        trust.verification_required = Some("device".into());
        trust.verification_satisfied = None;
        assert_eq!(
            evaluate_forward_trust(Some(&trust)),
            Err(TrustDenial::VerificationRequired)
        );
    }

    #[test]
    fn verification_satisfied_allows_actuation() {
        let mut trust = actuation_trust();
        trust.verification_required = Some("device_or_human".into());
        trust.verification_satisfied = Some(true);
        assert_eq!(evaluate_forward_trust(Some(&trust)), Ok(()));
    }
}
