//! Real LAN multicast discovery via `mdns-sd`, advertising
//! `_clawmesh._tcp.local.` with `deviceId`/`version` TXT records and
//! browsing for the same service type.

use std::sync::Mutex;

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::sync::mpsc::UnboundedSender;

use crate::backend::DiscoveryBackend;
use crate::error::DiscoveryError;
use crate::types::{DiscoveredPeer, DiscoveryEvent};

const SERVICE_TYPE: &str = "_clawmesh._tcp.local.";

pub struct MdnsDiscovery {
    device_id: String,
    port: u16,
    version: String,
    daemon: Mutex<Option<ServiceDaemon>>,
}

impl MdnsDiscovery {
    pub fn new(device_id: impl Into<String>, port: u16, version: impl Into<String>) -> Self {
        MdnsDiscovery {
            device_id: device_id.into(),
            port,
            version: version.into(),
            daemon: Mutex::new(None),
        }
    }
}

#[async_trait]
impl DiscoveryBackend for MdnsDiscovery {
    async fn start(&self, tx: UnboundedSender<DiscoveryEvent>) -> Result<(), DiscoveryError> {
        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::Mdns(e.to_string()))?;

        let host_name = format!("{}.local.", self.device_id);
        let properties = [
            ("deviceId", self.device_id.as_str()),
            ("version", self.version.as_str()),
        ];
        let service_info = ServiceInfo::new(
            SERVICE_TYPE,
            &self.device_id,
            &host_name,
            "",
            self.port,
            &properties[..],
        )
        .map_err(|e| DiscoveryError::Mdns(e.to_string()))?
        .enable_addr_auto();

        daemon
            .register(service_info)
            .map_err(|e| DiscoveryError::Mdns(e.to_string()))?;

        let receiver = daemon
            .browse(SERVICE_TYPE)
            .map_err(|e| DiscoveryError::Mdns(e.to_string()))?;

        let self_device_id = self.device_id.clone();
        tokio::spawn(async move {
            while let Ok(event) = receiver.recv_async().await {
                match event {
                    ServiceEvent::ServiceResolved(info) => {
                        let Some(found_id) = info.get_property_val_str("deviceId") else {
                            continue;
                        };
                        if found_id == self_device_id {
                            continue;
                        }
                        let peer = DiscoveredPeer {
                            device_id: found_id.to_string(),
                            display_name: None,
                            host: info.get_addresses().iter().next().map(|ip| ip.to_string()),
                            port: info.get_port(),
                            tls_fingerprint: None,
                        };
                        if tx.send(DiscoveryEvent::PeerDiscovered(peer)).is_err() {
                            break;
                        }
                    }
                    ServiceEvent::ServiceRemoved(_ty, fullname) => {
                        let Some(found_id) = fullname.split('.').next() else {
                            continue;
                        };
                        if found_id == self_device_id {
                            continue;
                        }
                        if tx.send(DiscoveryEvent::PeerLost(found_id.to_string())).is_err() {
                            break;
                        }
                    }
                    _ => {}
                }
            }
            tracing::debug!("mdns browse task ended");
        });

        *self.daemon.lock().unwrap() = Some(daemon);
        Ok(())
    }

    async fn stop(&self) -> Result<(), DiscoveryError> {
        let daemon = self.daemon.lock().unwrap().take();
        if let Some(daemon) = daemon {
            daemon
                .shutdown()
                .map_err(|e| DiscoveryError::Mdns(e.to_string()))?;
        }
        Ok(())
    }
}
