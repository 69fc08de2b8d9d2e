use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::DiscoveryError;
use crate::types::DiscoveryEvent;

/// Backend-agnostic discovery seam: a caller holds a `Box<dyn
/// DiscoveryBackend>` and never needs to know whether it is mDNS, a static
/// list, or something else entirely.
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// Begin advertising the local node and browsing for others, emitting
    /// events on `tx` as they occur. Returns once advertising/browsing is
    /// underway; events continue to arrive asynchronously after return.
    async fn start(&self, tx: UnboundedSender<DiscoveryEvent>) -> Result<(), DiscoveryError>;

    /// Stop advertising and browsing. Idempotent.
    async fn stop(&self) -> Result<(), DiscoveryError>;
}
