//! Two real nodes over loopback TCP: handshake, trust-gated forwarding,
//! loop prevention, and envelope/top-level trust mismatch detection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use clawmesh_identity::{Identity, TrustStore, TrustedPeer};
use clawmesh_mesh::ForwardSink;
use clawmesh_node::Node;
use clawmesh_proto::{
    create_command_envelope, CommandSource, CommandTarget, ForwardPayload, Operation, RawTrust,
    TargetKind,
};
use clawmesh_transport::RpcError;

struct RecordingSink {
    delivered: Mutex<Vec<ForwardPayload>>,
}

#[async_trait]
impl ForwardSink for RecordingSink {
    async fn deliver(&self, payload: &ForwardPayload) -> Result<String, String> {
        self.delivered.lock().unwrap().push(payload.clone());
        Ok("msg-delivered".into())
    }
}

async fn spin_up_node(state_dir: &std::path::Path) -> (Arc<Node>, Identity, std::net::SocketAddr) {
    let identity = Identity::load_or_create(&state_dir.join("identity.json")).unwrap();
    let trust_store = TrustStore::load(&state_dir.join("trusted-peers.json")).unwrap();
    let node = Arc::new(Node::new(
        Arc::new(identity.clone()),
        trust_store,
        clawmesh_node::Config::default(),
    ));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    node.clone()
        .start(
            addr,
            Arc::new(RecordingSink { delivered: Mutex::new(vec![]) }),
            HashMap::new(),
            None,
        )
        .await
        .unwrap();

    (node, identity, addr)
}

/// Wires two nodes, has each trust the other, dials `a -> b`, and returns
/// both once the handshake has completed.
async fn connected_pair() -> (Arc<Node>, Arc<Node>) {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let (node_a, identity_a, _addr_a) = spin_up_node(dir_a.path()).await;
    let (node_b, identity_b, addr_b) = spin_up_node(dir_b.path()).await;

    let peer_a = TrustedPeer {
        device_id: identity_a.device_id().to_string(),
        display_name: None,
        public_key: None,
        added_at_iso: "2026-01-01T00:00:00Z".into(),
    };
    let peer_b = TrustedPeer {
        device_id: identity_b.device_id().to_string(),
        display_name: None,
        public_key: None,
        added_at_iso: "2026-01-01T00:00:00Z".into(),
    };
    node_a.add_trusted_peer(peer_b).unwrap();
    node_b.add_trusted_peer(peer_a).unwrap();

    let remote_device_id = identity_b.device_id().to_string();
    clawmesh_transport::dial(
        &format!("ws://{addr_b}"),
        Arc::new(identity_a.clone()),
        Arc::new(move |device_id: &str| device_id == remote_device_id),
        None,
        node_a.registry().clone(),
        Arc::new(PassthroughRequestHandler),
        Arc::new(PassthroughEventHandler),
        vec![],
    )
    .await
    .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    (node_a, node_b)
}

struct PassthroughRequestHandler;

#[async_trait]
impl clawmesh_transport::RequestHandler for PassthroughRequestHandler {
    async fn handle(
        &self,
        _from_device_id: &str,
        method: &str,
        _params: serde_json::Value,
    ) -> Result<serde_json::Value, clawmesh_transport::WireError> {
        Err(clawmesh_transport::WireError::new("UNKNOWN_METHOD", method))
    }
}

struct PassthroughEventHandler;

#[async_trait]
impl clawmesh_transport::EventHandler for PassthroughEventHandler {
    async fn handle(&self, _from_device_id: &str, _event: &str, _payload: serde_json::Value) {}
}

fn verified_actuation_trust() -> RawTrust {
    RawTrust {
        action_type: Some("actuation".into()),
        evidence_trust_tier: Some("T3_verified_action_evidence".into()),
        minimum_trust_tier: Some("T2_operational_observation".into()),
        verification_required: Some("none".into()),
        verification_satisfied: None,
        evidence_sources: Some(vec!["device".into()]),
        approved_by: None,
    }
}

fn llm_only_actuation_trust() -> RawTrust {
    RawTrust {
        action_type: Some("actuation".into()),
        evidence_trust_tier: Some("T3_verified_action_evidence".into()),
        minimum_trust_tier: Some("T2_operational_observation".into()),
        verification_required: Some("none".into()),
        verification_satisfied: None,
        evidence_sources: Some(vec!["llm".into()]),
        approved_by: None,
    }
}

#[tokio::test]
async fn verified_actuation_is_forwarded_and_delivered() {
    let (node_a, node_b) = connected_pair().await;
    let payload = ForwardPayload {
        channel: "actuator".into(),
        to: "thermostat-1".into(),
        message: Some("set 21C".into()),
        media_url: None,
        account_id: None,
        origin_gateway_id: node_a.device_id().to_string(),
        idempotency_key: "idem-s1".into(),
        command: None,
        trust: Some(verified_actuation_trust()),
    };
    let result = node_a
        .registry()
        .invoke(
            node_b.device_id().to_string(),
            "mesh.message.forward",
            serde_json::to_value(&payload).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(result["messageId"], "msg-delivered");
}

#[tokio::test]
async fn llm_only_actuation_is_blocked_before_delivery() {
    let (node_a, node_b) = connected_pair().await;
    let payload = ForwardPayload {
        channel: "actuator".into(),
        to: "thermostat-1".into(),
        message: Some("set 21C".into()),
        media_url: None,
        account_id: None,
        origin_gateway_id: node_a.device_id().to_string(),
        idempotency_key: "idem-s2".into(),
        command: None,
        trust: Some(llm_only_actuation_trust()),
    };
    let err = node_a
        .registry()
        .invoke(
            node_b.device_id().to_string(),
            "mesh.message.forward",
            serde_json::to_value(&payload).unwrap(),
        )
        .await
        .unwrap_err();
    match err {
        RpcError::Remote(code, _) => assert_eq!(code, "LLM_ONLY_ACTUATION_BLOCKED"),
        other => panic!("expected a remote denial, got {other:?}"),
    }
}

#[tokio::test]
async fn forward_claiming_to_originate_from_the_receiver_is_loop_detected() {
    let (node_a, node_b) = connected_pair().await;
    let payload = ForwardPayload {
        channel: "channel".into(),
        to: "+15551230000".into(),
        message: Some("hi".into()),
        media_url: None,
        account_id: None,
        origin_gateway_id: node_b.device_id().to_string(),
        idempotency_key: "idem-s3".into(),
        command: None,
        trust: None,
    };
    let err = node_a
        .registry()
        .invoke(
            node_b.device_id().to_string(),
            "mesh.message.forward",
            serde_json::to_value(&payload).unwrap(),
        )
        .await
        .unwrap_err();
    match err {
        RpcError::Remote(code, _) => assert_eq!(code, "LOOP_DETECTED"),
        other => panic!("expected a remote denial, got {other:?}"),
    }
}

#[tokio::test]
async fn disagreeing_envelope_and_top_level_trust_is_rejected() {
    let (node_a, node_b) = connected_pair().await;
    let envelope = create_command_envelope(
        "cmd-s6",
        1_700_000_000_000,
        CommandSource { node_id: node_a.device_id().to_string(), role: None },
        CommandTarget { kind: TargetKind::Capability, reference: "channel:whatsapp".into() },
        Operation { name: "send_message".into(), params: None },
        Some(verified_actuation_trust()),
        None,
    );
    let mut mismatched = verified_actuation_trust();
    mismatched.verification_required = Some("device".into());

    let payload = ForwardPayload {
        channel: "whatsapp".into(),
        to: "+15551230000".into(),
        message: Some("hi".into()),
        media_url: None,
        account_id: None,
        origin_gateway_id: node_a.device_id().to_string(),
        idempotency_key: "idem-s6".into(),
        command: Some(serde_json::to_value(&envelope).unwrap()),
        trust: Some(mismatched),
    };
    let err = node_a
        .registry()
        .invoke(
            node_b.device_id().to_string(),
            "mesh.message.forward",
            serde_json::to_value(&payload).unwrap(),
        )
        .await
        .unwrap_err();
    match err {
        RpcError::Remote(code, _) => assert_eq!(code, "TRUST_ENVELOPE_MISMATCH"),
        other => panic!("expected a remote denial, got {other:?}"),
    }
}
