//! The JSON wire frame: request, response, or event, tagged by `type`.

use serde::{Deserialize, Serialize};

/// 10 MiB, per the external-interfaces frame size limit.
pub const MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireFrame {
    #[serde(rename = "req")]
    Req {
        id: String,
        method: String,
        params: serde_json::Value,
    },
    #[serde(rename = "res")]
    Res {
        id: String,
        ok: bool,
        #[serde(default)]
        payload: Option<serde_json::Value>,
        #[serde(default)]
        error: Option<WireError>,
    },
    #[serde(rename = "event")]
    Event {
        event: String,
        payload: serde_json::Value,
    },
}

impl WireFrame {
    pub fn ok_response(id: impl Into<String>, payload: serde_json::Value) -> Self {
        WireFrame::Res {
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err_response(id: impl Into<String>, error: WireError) -> Self {
        WireFrame::Res {
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl WireError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        WireError {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn req_frame_round_trips_with_type_tag() {
        let frame = WireFrame::Req {
            id: "r1".into(),
            method: "mesh.status".into(),
            params: serde_json::json!({}),
        };
        let text = serde_json::to_string(&frame).unwrap();
        assert!(text.contains("\"type\":\"req\""));
        let back: WireFrame = serde_json::from_str(&text).unwrap();
        assert!(matches!(back, WireFrame::Req { id, .. } if id == "r1"));
    }

    #[test]
    fn res_frame_with_error_round_trips() {
        let frame = WireFrame::err_response("r1", WireError::new("TIMEOUT", "no response"));
        let text = serde_json::to_string(&frame).unwrap();
        let back: WireFrame = serde_json::from_str(&text).unwrap();
        match back {
            WireFrame::Res { ok, error, .. } => {
                assert!(!ok);
                assert_eq!(error.unwrap().code, "TIMEOUT");
            }
            _ => panic!("expected Res"),
        }
    }
}
