/// A peer surfaced by a discovery backend. Discovery is a signal source
/// only — it does not decide trust and does not initiate connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeer {
    pub device_id: String,
    pub display_name: Option<String>,
    pub host: Option<String>,
    pub port: u16,
    pub tls_fingerprint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    PeerDiscovered(DiscoveredPeer),
    PeerLost(String),
}
