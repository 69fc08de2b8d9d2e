//! Capability routing, trust-gated forwarding, and hop-limited context
//! gossip — the policy layer that sits on top of the peer session registry.

mod forward;
mod propagator;
mod registry;
mod route;
mod world_model;

pub use forward::{
    forward_message_to_peer, CommandDraft, ForwardAck, ForwardError, ForwardRequest,
    ForwardSink, MeshForwardHandler,
};
pub use propagator::{ContextPropagator, DEFAULT_MAX_GOSSIP_HOPS, DEFAULT_MAX_SEEN_IDS};
pub use registry::CapabilityRegistry;
pub use route::{resolve_route, Route};
pub use world_model::WorldModel;
