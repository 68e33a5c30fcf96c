//! OBS WebSocket v5 frame types.
//!
//! Every message is `{"op": <opcode>, "d": <payload>}`.  Payload field
//! names are camelCase on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

/// RPC version sent in Identify.
pub const RPC_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Hello = 0,
    Identify = 1,
    Identified = 2,
    Event = 5,
    Request = 6,
    RequestResponse = 7,
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(op: u8) -> Result<Self, u8> {
        match op {
            0 => Ok(OpCode::Hello),
            1 => Ok(OpCode::Identify),
            2 => Ok(OpCode::Identified),
            5 => Ok(OpCode::Event),
            6 => Ok(OpCode::Request),
            7 => Ok(OpCode::RequestResponse),
            other => Err(other),
        }
    }
}

/// One raw frame, payload still untyped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
}

impl Frame {
    pub fn new<T: Serialize>(op: OpCode, payload: &T) -> serde_json::Result<Self> {
        Ok(Self {
            op: op as u8,
            d: serde_json::to_value(payload)?,
        })
    }

    pub fn opcode(&self) -> Result<OpCode, u8> {
        OpCode::try_from(self.op)
    }

    pub fn payload<T: serde::de::DeserializeOwned>(self) -> serde_json::Result<T> {
        serde_json::from_value(self.d)
    }

    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_message(&self) -> serde_json::Result<Message> {
        Ok(Message::Text(serde_json::to_string(self)?))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default)]
    pub obs_web_socket_version: Option<String>,
    #[serde(default)]
    pub rpc_version: Option<u32>,
    /// Present only when the server requires authentication.
    #[serde(default)]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthChallenge {
    #[serde(default)]
    pub challenge: String,
    #[serde(default)]
    pub salt: String,
}

/// Identify, or Authenticate when `authentication` is set.  Same opcode.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    pub rpc_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    #[serde(default)]
    pub negotiated_rpc_version: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub event_intent: Option<u32>,
    #[serde(default)]
    pub event_data: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request<'a> {
    pub request_type: &'a str,
    pub request_id: &'a str,
    pub request_data: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    #[serde(default)]
    pub request_type: String,
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestStatus {
    pub result: bool,
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identify_without_credential_omits_authentication() {
        let frame = Frame::new(
            OpCode::Identify,
            &Identify {
                rpc_version: RPC_VERSION,
                authentication: None,
            },
        )
        .unwrap();
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value, json!({"op": 1, "d": {"rpcVersion": 1}}));
    }

    #[test]
    fn test_request_wire_shape() {
        let frame = Frame::new(
            OpCode::Request,
            &Request {
                request_type: "GetVersion",
                request_id: "req-1",
                request_data: json!({}),
            },
        )
        .unwrap();
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["op"], 6);
        assert_eq!(value["d"]["requestType"], "GetVersion");
        assert_eq!(value["d"]["requestId"], "req-1");
    }

    #[test]
    fn test_parse_failed_response() {
        let frame = Frame::parse(
            r#"{"op":7,"d":{"requestType":"CreateInput","requestId":"req-3",
                "requestStatus":{"result":false,"code":601,"comment":"already exists"}}}"#,
        )
        .unwrap();
        assert_eq!(frame.opcode(), Ok(OpCode::RequestResponse));
        let response: RequestResponse = frame.payload().unwrap();
        assert!(!response.request_status.result);
        assert_eq!(response.request_status.code, Some(601));
        assert!(response.response_data.is_null());
    }

    #[test]
    fn test_hello_with_auth_challenge() {
        let frame = Frame::parse(
            r#"{"op":0,"d":{"obsWebSocketVersion":"5.1.0","rpcVersion":1,
                "authentication":{"challenge":"abc","salt":"xyz"}}}"#,
        )
        .unwrap();
        let hello: Hello = frame.payload().unwrap();
        assert!(hello.authentication.is_some());
        assert_eq!(hello.rpc_version, Some(1));
    }

    #[test]
    fn test_unknown_opcode() {
        assert_eq!(OpCode::try_from(3), Err(3));
    }
}
