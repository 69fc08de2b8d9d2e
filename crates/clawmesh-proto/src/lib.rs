//! Wire data model: capabilities, the signed command envelope, the trust
//! policy gate, and context-gossip frames. Everything here is a pure value
//! type or a synchronous pure function — no I/O, no async — so the
//! transport and mesh layers can call straight through on the hot path.

mod capability;
mod context;
mod envelope;
mod error;
mod forward;
mod tier;
mod trust_policy;

pub use capability::{Capability, CapabilityError};
pub use context::{derive_identity_key, ContextFrame, WorldModelKey};
pub use envelope::{
    create_command_envelope, validate_command_envelope, CommandEnvelope, CommandSource,
    CommandTarget, Operation, RawTrust, TargetKind, ENVELOPE_KIND, ENVELOPE_VERSION,
};
pub use error::{EnvelopeError, ResolveError};
pub use forward::{resolve_forward_trust, ForwardPayload};
pub use tier::{ActionType, EvidenceSource, TrustTier, VerificationRequirement};
pub use trust_policy::{evaluate_forward_trust, TrustDenial};
