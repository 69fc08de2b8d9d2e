//! Runs any number of backends concurrently and merges their events,
//! de-duplicating `peer-discovered` by `deviceId` within a continuous-
//! presence window (a peer already known present does not re-fire until a
//! `peer-lost` clears it).

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::backend::DiscoveryBackend;
use crate::error::DiscoveryError;
use crate::types::DiscoveryEvent;

pub struct CompositeDiscovery {
    backends: Vec<Box<dyn DiscoveryBackend>>,
}

impl CompositeDiscovery {
    pub fn new(backends: Vec<Box<dyn DiscoveryBackend>>) -> Self {
        CompositeDiscovery { backends }
    }
}

#[async_trait]
impl DiscoveryBackend for CompositeDiscovery {
    async fn start(&self, tx: UnboundedSender<DiscoveryEvent>) -> Result<(), DiscoveryError> {
        let (inner_tx, mut inner_rx) = mpsc::unbounded_channel();
        for backend in &self.backends {
            backend.start(inner_tx.clone()).await?;
        }
        drop(inner_tx);

        tokio::spawn(async move {
            let mut present: HashSet<String> = HashSet::new();
            while let Some(event) = inner_rx.recv().await {
                match event {
                    DiscoveryEvent::PeerDiscovered(peer) => {
                        if present.insert(peer.device_id.clone())
                            && tx.send(DiscoveryEvent::PeerDiscovered(peer)).is_err()
                        {
                            break;
                        }
                    }
                    DiscoveryEvent::PeerLost(device_id) => {
                        if present.remove(&device_id)
                            && tx.send(DiscoveryEvent::PeerLost(device_id)).is_err()
                        {
                            break;
                        }
                    }
                }
            }
        });

        Ok(())
    }

    async fn stop(&self) -> Result<(), DiscoveryError> {
        for backend in &self.backends {
            backend.stop().await?;
        }
        Ok(())
    }
}
