//! Wire message shapes: the outbound request envelope and inbound response envelope.

use serde_json::Value;

/// Build the wire body for a request: lowercase/trim `command`, replace `id`.
pub fn build_outbound(mut request: serde_json::Map<String, Value>, wire_id: Value) -> Value {
    if let Some(Value::String(cmd)) = request.get("command") {
        let normalised = cmd.trim().to_lowercase();
        request.insert("command".to_string(), Value::String(normalised));
    }
    request.insert("id".to_string(), wire_id);
    Value::Object(request)
}

/// A parsed inbound frame. Kept as a thin accessor wrapper over the raw JSON value
/// since the core treats most command-specific fields as opaque.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub raw: Value,
}

impl InboundMessage {
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str::<Value>(text).ok().map(|raw| Self { raw })
    }

    pub fn id(&self) -> Option<&Value> {
        self.raw.get("id")
    }

    pub fn result(&self) -> Option<&Value> {
        self.raw.get("result")
    }

    pub fn message_type(&self) -> Option<&str> {
        self.raw.get("type").and_then(|v| v.as_str())
    }

    pub fn is_validation(&self) -> bool {
        self.raw.get("validation_public_key").is_some()
    }

    pub fn validated_ledgers(&self) -> Option<String> {
        self.raw
            .get("validated_ledgers")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    pub fn reserve_base(&self) -> Option<f64> {
        self.raw.get("reserve_base").and_then(|v| v.as_f64())
    }

    pub fn reserve_inc(&self) -> Option<f64> {
        self.raw.get("reserve_inc").and_then(|v| v.as_f64())
    }

    /// Extract `server_info` fields needed by the health aggregator, if this message
    /// is a `server_info` result.
    pub fn server_info(&self) -> Option<ServerInfoSample> {
        let info = self.raw.get("result")?.get("info")?;
        Some(ServerInfoSample {
            pubkey_node: info
                .get("pubkey_node")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            build_version: info
                .get("build_version")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            complete_ledgers: info
                .get("complete_ledgers")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            uptime: info.get("uptime").and_then(|v| v.as_u64()),
            load_factor: info.get("load_factor").and_then(|v| v.as_f64()),
            base_fee_xrp: info
                .get("validated_ledger")
                .and_then(|l| l.get("base_fee_xrp"))
                .and_then(|v| v.as_f64()),
        })
    }
}

/// Fields lifted out of a `server_info` result for the health aggregator and state snapshot.
#[derive(Debug, Clone, Default)]
pub struct ServerInfoSample {
    pub pubkey_node: Option<String>,
    pub build_version: Option<String>,
    pub complete_ledgers: Option<String>,
    pub uptime: Option<u64>,
    pub load_factor: Option<f64>,
    pub base_fee_xrp: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_outbound_normalises_command_and_sets_id() {
        let mut req = serde_json::Map::new();
        req.insert("command".to_string(), json!("  Subscribe  "));
        req.insert("streams".to_string(), json!(["ledger"]));

        let wire = build_outbound(req, json!({"internal": 1, "user": null}));
        assert_eq!(wire["command"], "subscribe");
        assert_eq!(wire["id"]["internal"], 1);
    }

    #[test]
    fn test_parse_ledger_closed() {
        let msg = InboundMessage::parse(
            r#"{"type":"ledgerClosed","validated_ledgers":"1-100","reserve_base":20000000,"reserve_inc":5000000}"#,
        )
        .unwrap();
        assert_eq!(msg.message_type(), Some("ledgerClosed"));
        assert_eq!(msg.validated_ledgers(), Some("1-100".to_string()));
        assert_eq!(msg.reserve_base(), Some(20_000_000.0));
    }

    #[test]
    fn test_parse_invalid_json_is_none() {
        assert!(InboundMessage::parse("not json").is_none());
    }

    #[test]
    fn test_server_info_extraction() {
        let msg = InboundMessage::parse(
            r#"{"result":{"info":{"pubkey_node":"n9x","build_version":"2.2.0","complete_ledgers":"1-100","uptime":12345,"load_factor":256,"validated_ledger":{"base_fee_xrp":0.00001}}}}"#,
        )
        .unwrap();
        let info = msg.server_info().unwrap();
        assert_eq!(info.pubkey_node.as_deref(), Some("n9x"));
        assert_eq!(info.load_factor, Some(256.0));
        assert_eq!(info.base_fee_xrp, Some(0.00001));
    }
}
