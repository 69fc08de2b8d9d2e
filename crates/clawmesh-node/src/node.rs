//! Node runtime: owns identity, trust store, sessions, and context state,
//! and wires them into the transport's accept/dial entry points per the
//! standard method table in [`crate::handlers`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use clawmesh_discovery::{
    CompositeDiscovery, DiscoveredPeer, DiscoveryBackend, DiscoveryEvent, MdnsDiscovery,
    StaticDiscovery,
};
use clawmesh_identity::{Identity, TrustStore};
use clawmesh_mesh::{
    forward_message_to_peer, CapabilityRegistry, ForwardRequest, ForwardSink, MeshForwardHandler,
    Route,
};
use clawmesh_transport::{
    accept_loop, dial, should_initiate, EventHandler, RequestHandler, SessionRegistryHandle,
};

use crate::config::Config;
use crate::error::NodeError;
use crate::handlers::{NodeEventHandler, NodeRequestHandler};
use crate::propagation::Propagation;
use crate::state::NodeState;

const PROTOCOL_VERSION: &str = "v1";

pub struct Node {
    identity: Arc<Identity>,
    trust_store: Arc<Mutex<TrustStore>>,
    registry: SessionRegistryHandle,
    propagation: Propagation,
    config: Config,
    state: Mutex<NodeState>,
    listener_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Node {
    pub fn new(identity: Arc<Identity>, trust_store: TrustStore, config: Config) -> Self {
        let device_id = identity.device_id().to_string();
        Node {
            identity,
            trust_store: Arc::new(Mutex::new(trust_store)),
            registry: SessionRegistryHandle::spawn(),
            propagation: Propagation::new(device_id),
            config,
            state: Mutex::new(NodeState::Init),
            listener_task: Mutex::new(None),
        }
    }

    pub fn device_id(&self) -> &str {
        self.identity.device_id()
    }

    pub fn registry(&self) -> &SessionRegistryHandle {
        &self.registry
    }

    pub fn propagation(&self) -> &Propagation {
        &self.propagation
    }

    pub fn state(&self) -> NodeState {
        *self.state.lock().unwrap()
    }

    /// Add a peer to this node's trust store directly, bypassing the
    /// `mesh.trust.add` RPC — for pre-seeding trust (e.g. out-of-band
    /// pairing) before any connection is made.
    pub fn add_trusted_peer(
        &self,
        peer: clawmesh_identity::TrustedPeer,
    ) -> Result<(), clawmesh_identity::TrustStoreError> {
        self.trust_store.lock().unwrap().add(peer)
    }

    fn set_state(&self, state: NodeState) {
        *self.state.lock().unwrap() = state;
    }

    /// A snapshot of mesh-wide capability routing built fresh from whoever
    /// is connected right now. There is no push-synchronized copy to keep
    /// consistent: connections are few and `list_connected` is cheap, so a
    /// snapshot taken at the moment routing is needed is simpler than a
    /// second source of truth that could drift from the registry.
    pub async fn capability_snapshot(&self) -> CapabilityRegistry {
        let mut snapshot = CapabilityRegistry::new();
        for peer in self.registry.list_connected().await {
            let caps = peer
                .capabilities
                .iter()
                .filter_map(|c| clawmesh_proto::Capability::parse(c).ok())
                .collect();
            snapshot.update_peer(peer.device_id, caps);
        }
        snapshot
    }

    pub async fn resolve_route(&self, channel: &str) -> Route {
        let local_caps: std::collections::HashSet<_> = self
            .config
            .capabilities
            .iter()
            .filter_map(|c| clawmesh_proto::Capability::parse(c).ok())
            .collect();
        let snapshot = self.capability_snapshot().await;
        clawmesh_mesh::resolve_route(channel, &snapshot, Some(&local_caps))
    }

    fn is_trusted_fn(&self) -> Arc<dyn Fn(&str) -> bool + Send + Sync> {
        let trust_store = self.trust_store.clone();
        Arc::new(move |device_id: &str| trust_store.lock().unwrap().contains(device_id))
    }

    /// Bind the listener, start accepting and dialing, and start LAN
    /// discovery if enabled. Returns once the listener is bound and the
    /// accept loop has been spawned; discovery and dialing continue in the
    /// background for the life of the returned `Node`.
    pub async fn start(
        self: Arc<Self>,
        bind_addr: SocketAddr,
        forward_sink: Arc<dyn ForwardSink>,
        extra_request_handlers: HashMap<String, Arc<dyn RequestHandler>>,
        extra_event_handler: Option<Arc<dyn EventHandler>>,
    ) -> Result<(), NodeError> {
        self.set_state(NodeState::Listening);

        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|source| NodeError::Bind { addr: bind_addr.to_string(), source })?;

        let forward_handler = MeshForwardHandler::new(self.device_id(), forward_sink);
        let request_handler: Arc<dyn RequestHandler> = Arc::new(NodeRequestHandler {
            local_device_id: self.device_id().to_string(),
            registry: self.registry.clone(),
            trust_store: self.trust_store.clone(),
            forward_handler,
            extra: extra_request_handlers,
        });
        let event_handler: Arc<dyn EventHandler> = Arc::new(NodeEventHandler {
            propagation: self.propagation.clone(),
            registry: self.registry.clone(),
            extra: extra_event_handler,
        });

        let listener_task = tokio::spawn(accept_loop(
            listener,
            self.identity.clone(),
            self.is_trusted_fn(),
            self.registry.clone(),
            request_handler.clone(),
            event_handler.clone(),
            self.config.capabilities.clone(),
        ));
        *self.listener_task.lock().unwrap() = Some(listener_task);
        self.set_state(NodeState::Serving);
        tracing::info!(device_id = %self.device_id(), addr = %bind_addr, "listening");

        for peer in self.config.peers.clone() {
            let node = self.clone();
            let request_handler = request_handler.clone();
            let event_handler = event_handler.clone();
            tokio::spawn(async move {
                match dial(
                    &peer.url,
                    node.identity.clone(),
                    node.is_trusted_fn(),
                    peer.tls_fingerprint.clone(),
                    node.registry.clone(),
                    request_handler,
                    event_handler,
                    node.config.capabilities.clone(),
                )
                .await
                {
                    Ok(device_id) => {
                        tracing::info!(url = %peer.url, device_id = %device_id, "dialed configured peer");
                    }
                    Err(e) => {
                        tracing::warn!(url = %peer.url, error = %e, "failed to dial configured peer");
                    }
                }
            });
        }

        if self.config.enabled {
            self.clone()
                .spawn_discovery(request_handler, event_handler)
                .await;
        }

        Ok(())
    }

    async fn spawn_discovery(
        self: Arc<Self>,
        request_handler: Arc<dyn RequestHandler>,
        event_handler: Arc<dyn EventHandler>,
    ) {
        let configured: Vec<DiscoveredPeer> = self
            .config
            .peers
            .iter()
            .map(|p| DiscoveredPeer {
                device_id: p.device_id.clone(),
                display_name: None,
                host: None,
                port: 0,
                tls_fingerprint: p.tls_fingerprint.clone(),
            })
            .collect();

        let backends: Vec<Box<dyn DiscoveryBackend>> = vec![
            Box::new(MdnsDiscovery::new(
                self.device_id().to_string(),
                0,
                PROTOCOL_VERSION,
            )),
            Box::new(StaticDiscovery::new(
                self.device_id().to_string(),
                configured,
            )),
        ];
        let composite = CompositeDiscovery::new(backends);
        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Err(e) = composite.start(tx).await {
            tracing::warn!(error = %e, "discovery failed to start");
            return;
        }

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let DiscoveryEvent::PeerDiscovered(peer) = event else {
                    continue;
                };
                if peer.host.is_none() || peer.port == 0 {
                    continue;
                }
                if !self.trust_store.lock().unwrap().contains(&peer.device_id) {
                    continue;
                }
                if !should_initiate(self.device_id(), &peer.device_id) {
                    continue;
                }
                let already_connected = self
                    .registry
                    .list_connected()
                    .await
                    .iter()
                    .any(|p| p.device_id == peer.device_id);
                if already_connected {
                    continue;
                }

                let url = format!("ws://{}:{}", peer.host.as_ref().unwrap(), peer.port);
                let node = self.clone();
                let request_handler = request_handler.clone();
                let event_handler = event_handler.clone();
                tokio::spawn(async move {
                    match dial(
                        &url,
                        node.identity.clone(),
                        node.is_trusted_fn(),
                        peer.tls_fingerprint.clone(),
                        node.registry.clone(),
                        request_handler,
                        event_handler,
                        node.config.capabilities.clone(),
                    )
                    .await
                    {
                        Ok(device_id) => {
                            tracing::info!(url = %url, device_id = %device_id, "dialed discovered peer");
                        }
                        Err(e) => {
                            tracing::warn!(url = %url, error = %e, "failed to dial discovered peer");
                        }
                    }
                });
            }
        });
    }

    /// Forward a message to a mesh peer by `deviceId`, running the same
    /// trust evaluation locally before the RPC leaves this node.
    pub async fn forward_to_peer(
        &self,
        req: ForwardRequest,
        now_ms: i64,
    ) -> Result<clawmesh_mesh::ForwardAck, clawmesh_mesh::ForwardError> {
        forward_message_to_peer(req, &self.registry, now_ms).await
    }

    /// Stop accepting new connections, close every live session's socket,
    /// and await the listener task's actual shutdown before returning.
    pub async fn stop(&self) {
        self.set_state(NodeState::Stopping);
        tracing::info!(device_id = %self.device_id(), "stopping");

        let listener_task = self.listener_task.lock().unwrap().take();
        if let Some(task) = listener_task {
            task.abort();
            let _ = task.await;
        }

        let closed = self.registry.shutdown().await;
        tracing::info!(device_id = %self.device_id(), sessions_closed = closed, "stopped");

        self.set_state(NodeState::Stopped);
    }
}
