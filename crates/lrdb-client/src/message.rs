//! Wire messages for the debuggee line protocol.
//! - Request: outgoing `{method, param, id}` line
//! - Message: any parsed incoming line
//! - ConnectedParams: metadata from the `connected` handshake notification

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Method the adapter sends once the socket is open, announcing its
/// supported protocol version.
pub const HANDSHAKE_METHOD: &str = "handshake";

/// Notification the debuggee emits after accepting a connection.
pub const CONNECTED_METHOD: &str = "connected";

/// Outgoing request. Serialized as a single line; the wire field for the
/// parameters is `param`, singular.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<Value>,
    pub id: u64,
}

/// Any parsed incoming line. A message whose `id` matches a pending request
/// is that request's response; everything else is a notification. Debuggee
/// generations disagree on the payload field name, so both `param` and
/// `params` are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default, alias = "params")]
    pub param: Option<Value>,
}

/// Unsolicited notification delivered to transport subscribers.
#[derive(Debug, Clone)]
pub struct Notification {
    pub method: String,
    pub param: Option<Value>,
}

/// Metadata echoed by the debuggee's `connected` notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lua: Option<VmInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
}

/// VM identity reported by the debuggee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmInfo {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jit: Option<bool>,
}

/// Hosting product identity, when the VM is embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_param_singular() {
        let request = Request {
            method: "add_breakpoint".to_string(),
            param: Some(json!({"file": "main.lua", "line": 3})),
            id: 7,
        };
        let serialized = serde_json::to_value(&request).expect("serialize request");
        assert_eq!(serialized["param"]["file"], json!("main.lua"));
        assert_eq!(serialized["id"], json!(7));
        assert!(serialized.get("params").is_none());
    }

    #[test]
    fn incoming_payload_accepts_both_param_spellings() {
        let singular: Message = serde_json::from_value(json!({
            "method": "paused",
            "param": {"reason": "breakpoint"}
        }))
        .expect("parse singular");
        assert_eq!(singular.param, Some(json!({"reason": "breakpoint"})));

        let plural: Message = serde_json::from_value(json!({
            "method": "connected",
            "params": {"lua": {"version": "lua5.4"}, "protocolVersion": "3"}
        }))
        .expect("parse plural");
        let param = plural.param.expect("payload under 'params'");
        assert_eq!(param["protocolVersion"], json!("3"));
    }

    #[test]
    fn connected_params_accepts_partial_metadata() {
        let params: ConnectedParams = serde_json::from_value(json!({
            "lua": {"version": "lua5.4"},
            "protocolVersion": "3"
        }))
        .expect("deserialize connected params");
        assert_eq!(params.lua.as_ref().map(|vm| vm.version.as_str()), Some("lua5.4"));
        assert_eq!(params.protocol_version.as_deref(), Some("3"));
        assert!(params.working_directory.is_none());
    }
}
