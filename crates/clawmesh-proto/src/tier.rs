//! The enum domains that make up a trust block. Each is given an explicit
//! wire spelling rather than a derived `rename_all`, since `T0_planning_inference`
//! does not fall out of any single case-conversion rule.

use serde::{Deserialize, Serialize};

/// A total order over evidence strength, T0 (weakest) to T3 (strongest).
/// Declaration order is the comparison order: `derive(PartialOrd, Ord)`
/// compares enums variant-index-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrustTier {
    #[serde(rename = "T0_planning_inference")]
    T0PlanningInference,
    #[serde(rename = "T1_unverified_observation")]
    T1UnverifiedObservation,
    #[serde(rename = "T2_operational_observation")]
    T2OperationalObservation,
    #[serde(rename = "T3_verified_action_evidence")]
    T3VerifiedActionEvidence,
}

impl TrustTier {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "T0_planning_inference" => Some(Self::T0PlanningInference),
            "T1_unverified_observation" => Some(Self::T1UnverifiedObservation),
            "T2_operational_observation" => Some(Self::T2OperationalObservation),
            "T3_verified_action_evidence" => Some(Self::T3VerifiedActionEvidence),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::T0PlanningInference => "T0_planning_inference",
            Self::T1UnverifiedObservation => "T1_unverified_observation",
            Self::T2OperationalObservation => "T2_operational_observation",
            Self::T3VerifiedActionEvidence => "T3_verified_action_evidence",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Communication,
    Observation,
    Actuation,
}

impl ActionType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "communication" => Some(Self::Communication),
            "observation" => Some(Self::Observation),
            "actuation" => Some(Self::Actuation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationRequirement {
    None,
    Device,
    Human,
    DeviceOrHuman,
}

impl VerificationRequirement {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "device" => Some(Self::Device),
            "human" => Some(Self::Human),
            "device_or_human" => Some(Self::DeviceOrHuman),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    Llm,
    Sensor,
    Device,
    Human,
    Mixed,
}

impl EvidenceSource {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "llm" => Some(Self::Llm),
            "sensor" => Some(Self::Sensor),
            "device" => Some(Self::Device),
            "human" => Some(Self::Human),
            "mixed" => Some(Self::Mixed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_ordering_is_t0_below_t3() {
        assert!(TrustTier::T0PlanningInference < TrustTier::T3VerifiedActionEvidence);
        assert!(TrustTier::T2OperationalObservation > TrustTier::T1UnverifiedObservation);
    }

    #[test]
    fn tier_round_trips_through_json() {
        let tier = TrustTier::T3VerifiedActionEvidence;
        let json = serde_json::to_string(&tier).unwrap();
        assert_eq!(json, "\"T3_verified_action_evidence\"");
        let back: TrustTier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tier);
    }

    #[test]
    fn unknown_tier_string_fails_to_parse() {
        assert!(TrustTier::parse("T4_made_up").is_none());
    }
}
