//! ID rewriting: internal call ids and the wire envelope (C3).
//!
//! The server mirrors back whatever `id` we send, so the wire format has to be
//! something it can reflect verbatim: a structured envelope for real calls, a
//! prefixed string for our own probes. Internally we model that as a sum type and
//! only fall back to string prefixes at the wire boundary.

/// Reserved prefix for the internal ledger-subscription probe id.
pub const SUBSCRIPTION_PROBE_PREFIX: &str = "_WsClient_Internal_Subscription";
/// Reserved prefix for the internal `server_info` probe id (timestamp-suffixed).
pub const SERVER_INFO_PROBE_PREFIX: &str = "_WsClient_Internal_ServerInfo";

/// What an internal call id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    /// The internal ledger-subscription kept alive for liveness.
    Subscription,
    /// A `server_info` latency/fee probe, carrying the millisecond timestamp it was sent at.
    ServerInfo(i64),
}

/// Origin of a user-facing request id: either a genuine call (with the internal id we
/// allocated and the user's original id, which may be absent) or one of our own probes.
#[derive(Debug, Clone, PartialEq)]
pub enum InternalId {
    Call {
        internal: u64,
        user: Option<serde_json::Value>,
    },
    Probe(ProbeKind),
}

impl InternalId {
    /// Render the id to send on the wire.
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            InternalId::Call { internal, user } => serde_json::json!({
                "internal": internal,
                "user": user,
            }),
            InternalId::Probe(ProbeKind::Subscription) => {
                serde_json::Value::String(SUBSCRIPTION_PROBE_PREFIX.to_string())
            }
            InternalId::Probe(ProbeKind::ServerInfo(ts_ms)) => serde_json::Value::String(
                format!("{SERVER_INFO_PROBE_PREFIX}@{ts_ms}"),
            ),
        }
    }

    /// Parse an id that came back on the wire (the server mirrors whatever we sent).
    pub fn from_wire(value: &serde_json::Value) -> Option<Self> {
        if let Some(obj) = value.as_object() {
            let internal = obj.get("internal")?.as_u64()?;
            let user = obj.get("user").cloned().filter(|v| !v.is_null());
            return Some(InternalId::Call { internal, user });
        }
        if let Some(s) = value.as_str() {
            if s == SUBSCRIPTION_PROBE_PREFIX {
                return Some(InternalId::Probe(ProbeKind::Subscription));
            }
            if let Some(suffix) = s.strip_prefix(&format!("{SERVER_INFO_PROBE_PREFIX}@")) {
                if let Ok(ts_ms) = suffix.parse::<i64>() {
                    return Some(InternalId::Probe(ProbeKind::ServerInfo(ts_ms)));
                }
            }
        }
        None
    }

    pub fn internal_id(&self) -> Option<u64> {
        match self {
            InternalId::Call { internal, .. } => Some(*internal),
            InternalId::Probe(_) => None,
        }
    }
}

/// Monotonically increasing allocator for internal call ids.
#[derive(Debug, Default)]
pub struct IdAllocator {
    counter: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { counter: 0 }
    }

    /// Allocate the next internal id. Strictly increasing for the life of the client.
    pub fn next(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_strictly_increasing() {
        let mut alloc = IdAllocator::new();
        let a = alloc.next();
        let b = alloc.next();
        let c = alloc.next();
        assert!(a < b && b < c);
        assert_eq!((a, b, c), (1, 2, 3));
    }

    #[test]
    fn test_call_roundtrip_restores_user_id() {
        let id = InternalId::Call {
            internal: 42,
            user: Some(serde_json::json!("abc")),
        };
        let wire = id.to_wire();
        let parsed = InternalId::from_wire(&wire).unwrap();
        match parsed {
            InternalId::Call { internal, user } => {
                assert_eq!(internal, 42);
                assert_eq!(user, Some(serde_json::json!("abc")));
            }
            _ => panic!("expected Call"),
        }
    }

    #[test]
    fn test_call_roundtrip_missing_user_id() {
        let id = InternalId::Call {
            internal: 7,
            user: None,
        };
        let wire = id.to_wire();
        let parsed = InternalId::from_wire(&wire).unwrap();
        match parsed {
            InternalId::Call { internal, user } => {
                assert_eq!(internal, 7);
                assert_eq!(user, None);
            }
            _ => panic!("expected Call"),
        }
    }

    #[test]
    fn test_subscription_probe_roundtrip() {
        let id = InternalId::Probe(ProbeKind::Subscription);
        let wire = id.to_wire();
        assert_eq!(wire.as_str(), Some(SUBSCRIPTION_PROBE_PREFIX));
        assert_eq!(InternalId::from_wire(&wire), Some(id));
    }

    #[test]
    fn test_server_info_probe_roundtrip() {
        let id = InternalId::Probe(ProbeKind::ServerInfo(1_700_000_000_123));
        let wire = id.to_wire();
        assert_eq!(
            wire.as_str(),
            Some("_WsClient_Internal_ServerInfo@1700000000123")
        );
        assert_eq!(InternalId::from_wire(&wire), Some(id));
    }

    #[test]
    fn test_unrecognised_id_is_none() {
        assert!(InternalId::from_wire(&serde_json::json!(5)).is_none());
        assert!(InternalId::from_wire(&serde_json::json!("garbage")).is_none());
    }
}
