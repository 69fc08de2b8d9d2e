//! Local-first capability routing.

use std::collections::HashSet;

use clawmesh_proto::Capability;

use crate::registry::CapabilityRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Local,
    Mesh(String),
    Unavailable,
}

/// Local availability always wins; mesh routing only applies when the
/// channel is not locally handled.
pub fn resolve_route(
    channel: &str,
    registry: &CapabilityRegistry,
    local_caps: Option<&HashSet<Capability>>,
) -> Route {
    let channel_cap = match Capability::parse(&format!("channel:{channel}")) {
        Ok(cap) => cap,
        Err(_) => return Route::Unavailable,
    };

    if let Some(local_caps) = local_caps {
        if local_caps.contains(&channel_cap) {
            return Route::Local;
        }
    }

    match registry.find_peer_with_channel(channel) {
        Some(device_id) => Route::Mesh(device_id.to_string()),
        None => Route::Unavailable,
    }
}
