//! The static backend: peers taken verbatim from configuration. Emits each
//! exactly once at `start()` and never emits `peer-lost` — a configured
//! peer is assumed reachable until proven otherwise by the transport layer.

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::backend::DiscoveryBackend;
use crate::error::DiscoveryError;
use crate::types::{DiscoveredPeer, DiscoveryEvent};

pub struct StaticDiscovery {
    self_device_id: String,
    peers: Vec<DiscoveredPeer>,
}

impl StaticDiscovery {
    pub fn new(self_device_id: impl Into<String>, peers: Vec<DiscoveredPeer>) -> Self {
        StaticDiscovery {
            self_device_id: self_device_id.into(),
            peers,
        }
    }
}

#[async_trait]
impl DiscoveryBackend for StaticDiscovery {
    async fn start(&self, tx: UnboundedSender<DiscoveryEvent>) -> Result<(), DiscoveryError> {
        for peer in &self.peers {
            if peer.device_id == self.self_device_id {
                continue;
            }
            // Closed receiver means the caller has already given up; not
            // our error to report.
            let _ = tx.send(DiscoveryEvent::PeerDiscovered(peer.clone()));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), DiscoveryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn peer(id: &str) -> DiscoveredPeer {
        DiscoveredPeer {
            device_id: id.into(),
            display_name: None,
            host: Some("10.0.0.5".into()),
            port: 7780,
            tls_fingerprint: None,
        }
    }

    #[tokio::test]
    async fn emits_each_configured_peer_once() {
        let backend = StaticDiscovery::new("self-id", vec![peer("peer-a"), peer("peer-b")]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        backend.start(tx).await.unwrap();

        let mut seen = vec![];
        while let Ok(event) = rx.try_recv() {
            if let DiscoveryEvent::PeerDiscovered(p) = event {
                seen.push(p.device_id);
            }
        }
        assert_eq!(seen, vec!["peer-a", "peer-b"]);
    }

    #[tokio::test]
    async fn filters_self() {
        let backend = StaticDiscovery::new("self-id", vec![peer("self-id"), peer("peer-b")]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        backend.start(tx).await.unwrap();

        let mut seen = vec![];
        while let Ok(event) = rx.try_recv() {
            if let DiscoveryEvent::PeerDiscovered(p) = event {
                seen.push(p.device_id);
            }
        }
        assert_eq!(seen, vec!["peer-b"]);
    }

    #[tokio::test]
    async fn never_emits_peer_lost() {
        let backend = StaticDiscovery::new("self-id", vec![peer("peer-a")]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        backend.start(tx).await.unwrap();
        drop(backend);

        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, DiscoveryEvent::PeerLost(_)));
        }
    }
}
