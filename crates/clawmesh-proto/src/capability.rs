//! Capabilities are matched as literal strings: `type:name[:scope]`. No
//! wildcards, no semantic matching — a peer advertises exactly what it can
//! do and routing looks up exactly that string.

use std::fmt;

const RESERVED_PREFIXES: &[&str] = &[
    "channel", "skill", "task", "sensor", "actuator", "vision", "planner",
];

/// A parsed, validated capability string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Capability {
    raw: String,
}

impl Capability {
    /// Parse and validate a capability string of the form `type:name` or
    /// `type:name:scope`, where `type` is one of the reserved prefixes.
    pub fn parse(s: &str) -> Result<Self, CapabilityError> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(CapabilityError::Malformed(s.to_string()));
        }
        if !RESERVED_PREFIXES.contains(&parts[0]) {
            return Err(CapabilityError::UnknownType(parts[0].to_string()));
        }
        if parts.iter().any(|p| p.is_empty()) {
            return Err(CapabilityError::Malformed(s.to_string()));
        }
        Ok(Capability { raw: s.to_string() })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> &str {
        self.raw.split(':').next().unwrap_or("")
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("malformed capability string: {0:?}")]
    Malformed(String),
    #[error("unknown capability type: {0:?}")]
    UnknownType(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_type_and_name() {
        let cap = Capability::parse("channel:whatsapp").unwrap();
        assert_eq!(cap.kind(), "channel");
        assert_eq!(cap.as_str(), "channel:whatsapp");
    }

    #[test]
    fn parses_with_scope() {
        let cap = Capability::parse("skill:translate:es").unwrap();
        assert_eq!(cap.as_str(), "skill:translate:es");
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(Capability::parse("bogus:thing").is_err());
    }

    #[test]
    fn parses_all_reserved_types() {
        for cap in [
            "channel:whatsapp",
            "skill:translate",
            "task:cleanup",
            "sensor:temperature",
            "actuator:mock:valve-1",
            "vision:camera-1",
            "planner:route",
        ] {
            assert!(Capability::parse(cap).is_ok(), "{cap} should parse");
        }
    }

    #[test]
    fn rejects_empty_segment() {
        assert!(Capability::parse("channel:").is_err());
    }

    #[test]
    fn matching_is_exact_string_equality() {
        let a = Capability::parse("channel:whatsapp").unwrap();
        let b = Capability::parse("channel:whatsapp").unwrap();
        let c = Capability::parse("channel:whatsapp:business").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
