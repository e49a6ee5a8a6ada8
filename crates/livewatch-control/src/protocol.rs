//! Wire messages: JSON text frames shaped `{"op": <u8>, "d": {...}}`.

use std::fmt;

use livewatch_core::AutomationAction;
use serde::{Deserialize, Serialize};

use crate::error::ControlError;

pub const OP_HELLO: u8 = 0;
pub const OP_IDENTIFY: u8 = 1;
pub const OP_IDENTIFIED: u8 = 2;
pub const OP_REQUEST: u8 = 6;
pub const OP_REQUEST_RESPONSE: u8 = 7;
pub const OP_PING: u8 = 9;

pub const RPC_VERSION: u32 = 1;

// ─── Requests ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    StartStream,
    StartRecord,
    StopStream,
    StopRecord,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StartStream => "StartStream",
            Self::StartRecord => "StartRecord",
            Self::StopStream => "StopStream",
            Self::StopRecord => "StopRecord",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::StartStream => "start streaming",
            Self::StartRecord => "start recording",
            Self::StopStream => "stop streaming",
            Self::StopRecord => "stop recording",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something the poller asks the control server to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    StartStreaming,
    StartRecording,
    /// Stop streaming and stop recording, as two independent requests.
    StopAll,
}

impl ActionKind {
    /// `None` for [`AutomationAction::None`]: nothing to start.
    pub fn start(action: AutomationAction) -> Option<Self> {
        match action {
            AutomationAction::None => None,
            AutomationAction::StartStreaming => Some(Self::StartStreaming),
            AutomationAction::StartRecording => Some(Self::StartRecording),
        }
    }

    pub fn request_types(self) -> &'static [RequestType] {
        match self {
            Self::StartStreaming => &[RequestType::StartStream],
            Self::StartRecording => &[RequestType::StartRecord],
            Self::StopAll => &[RequestType::StopStream, RequestType::StopRecord],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StartStreaming => "start-streaming",
            Self::StartRecording => "start-recording",
            Self::StopAll => "stop-all",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Client → server ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    pub rpc_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    pub event_subscriptions: u32,
}

impl Identify {
    /// Identify with no event subscriptions.
    pub fn new(authentication: Option<String>) -> Self {
        Self {
            rpc_version: RPC_VERSION,
            authentication,
            event_subscriptions: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub request_type: RequestType,
    pub request_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Identify(Identify),
    Request(Request),
    Ping,
}

impl ClientMessage {
    pub fn op(&self) -> u8 {
        match self {
            Self::Identify(_) => OP_IDENTIFY,
            Self::Request(_) => OP_REQUEST,
            Self::Ping => OP_PING,
        }
    }

    pub fn to_json(&self) -> Result<String, ControlError> {
        let d = match self {
            Self::Identify(identify) => serde_json::to_value(identify)?,
            Self::Request(request) => serde_json::to_value(request)?,
            Self::Ping => serde_json::json!({ "eventType": "Ping" }),
        };
        Ok(serde_json::to_string(&Frame { op: self.op(), d })?)
    }
}

// ─── Server → client ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChallenge {
    pub salt: String,
    pub challenge: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default, rename = "obsWebSocketVersion")]
    pub server_version: Option<String>,
    #[serde(default)]
    pub rpc_version: Option<u32>,
    /// Present when the server requires authentication.
    #[serde(default)]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    #[serde(default)]
    pub negotiated_rpc_version: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestStatus {
    pub result: bool,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    /// Kept as a string: the server may answer request types we never send.
    pub request_type: String,
    #[serde(default)]
    pub request_id: Option<String>,
    pub request_status: RequestStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Hello(Hello),
    Identified(Identified),
    RequestResponse(RequestResponse),
    /// Any other op code; ignored by the client.
    Other { op: u8 },
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, ControlError> {
        let frame: Frame = serde_json::from_str(text)?;
        let msg = match frame.op {
            OP_HELLO => Self::Hello(serde_json::from_value(frame.d)?),
            OP_IDENTIFIED => Self::Identified(serde_json::from_value(frame.d)?),
            OP_REQUEST_RESPONSE => Self::RequestResponse(serde_json::from_value(frame.d)?),
            op => Self::Other { op },
        };
        Ok(msg)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    op: u8,
    #[serde(default)]
    d: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(msg: &ClientMessage) -> serde_json::Value {
        serde_json::from_str(&msg.to_json().expect("serialize")).expect("json")
    }

    #[test]
    fn identify_without_auth_omits_field() {
        let v = value(&ClientMessage::Identify(Identify::new(None)));
        assert_eq!(v["op"], 1);
        assert_eq!(v["d"]["rpcVersion"], 1);
        assert_eq!(v["d"]["eventSubscriptions"], 0);
        assert!(v["d"].get("authentication").is_none());
    }

    #[test]
    fn identify_with_auth() {
        let v = value(&ClientMessage::Identify(Identify::new(Some("abc=".into()))));
        assert_eq!(v["d"]["authentication"], "abc=");
    }

    #[test]
    fn request_and_ping_frames() {
        let v = value(&ClientMessage::Request(Request {
            request_type: RequestType::StopRecord,
            request_id: "stoprecord-7".into(),
        }));
        assert_eq!(v["op"], 6);
        assert_eq!(v["d"]["requestType"], "StopRecord");
        assert_eq!(v["d"]["requestId"], "stoprecord-7");

        let v = value(&ClientMessage::Ping);
        assert_eq!(v, serde_json::json!({"op": 9, "d": {"eventType": "Ping"}}));
    }

    #[test]
    fn parse_hello_with_and_without_challenge() {
        let msg = ServerMessage::parse(
            r#"{"op":0,"d":{"obsWebSocketVersion":"5.1.0","rpcVersion":1,"authentication":{"salt":"s","challenge":"c"}}}"#,
        )
        .expect("parse");
        let ServerMessage::Hello(hello) = msg else {
            panic!("expected Hello, got {msg:?}");
        };
        assert_eq!(hello.server_version.as_deref(), Some("5.1.0"));
        assert_eq!(
            hello.authentication,
            Some(AuthChallenge {
                salt: "s".into(),
                challenge: "c".into()
            })
        );

        let msg = ServerMessage::parse(r#"{"op":0,"d":{"rpcVersion":1}}"#).expect("parse");
        assert_eq!(
            msg,
            ServerMessage::Hello(Hello {
                rpc_version: Some(1),
                ..Hello::default()
            })
        );
    }

    #[test]
    fn parse_request_response() {
        let msg = ServerMessage::parse(
            r#"{"op":7,"d":{"requestType":"StartStream","requestId":"startstream-1","requestStatus":{"result":false,"code":500,"comment":"already active"}}}"#,
        )
        .expect("parse");
        let ServerMessage::RequestResponse(resp) = msg else {
            panic!("expected RequestResponse, got {msg:?}");
        };
        assert_eq!(resp.request_type, "StartStream");
        assert!(!resp.request_status.result);
        assert_eq!(resp.request_status.code, Some(500));
    }

    #[test]
    fn unknown_op_is_other() {
        let msg = ServerMessage::parse(r#"{"op":5,"d":{"eventType":"StreamStateChanged"}}"#)
            .expect("parse");
        assert_eq!(msg, ServerMessage::Other { op: 5 });
    }

    #[test]
    fn malformed_frame_is_error() {
        assert!(ServerMessage::parse("not json").is_err());
        assert!(ServerMessage::parse(r#"{"op":7,"d":{}}"#).is_err());
    }

    #[test]
    fn stop_all_expands_to_two_requests() {
        assert_eq!(
            ActionKind::StopAll.request_types(),
            &[RequestType::StopStream, RequestType::StopRecord]
        );
        assert_eq!(ActionKind::start(AutomationAction::None), None);
        assert_eq!(
            ActionKind::start(AutomationAction::StartRecording),
            Some(ActionKind::StartRecording)
        );
    }
}
