//! Call registry: pending one-shot calls and long-lived subscriptions (C2).

use crate::error::ClientError;
use std::collections::HashMap;
use tokio::sync::oneshot;

/// What kind of call this is: `Subscription` iff the command is one of
/// `subscribe`/`unsubscribe`/`path_find` and the caller did not opt out via
/// `no_replay_after_reconnect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    OneShot,
    Subscription,
}

/// Per-call send options.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub send_if_not_ready: bool,
    pub no_replay_after_reconnect: bool,
    pub timeout_seconds: Option<u64>,
    pub timeout_starts_when_online: bool,
}

/// A call tracked by the registry.
pub struct Call {
    pub internal_id: u64,
    /// The original, normalised request body (before id rewriting), used to replay on
    /// reconnect and for the router's fallback dispatch-by-command/streams.
    pub request: serde_json::Map<String, serde_json::Value>,
    pub user_request_id: Option<serde_json::Value>,
    pub kind: CallKind,
    pub options: SendOptions,
    /// Consumed exactly once: the first resolution/rejection removes the call from the
    /// registry, and later attempts to resolve/reject it are no-ops.
    pub resolver: Option<oneshot::Sender<Result<serde_json::Value, ClientError>>>,
    pub armed: bool,
}

impl Call {
    /// Resolve the call's future. A no-op if already resolved/rejected.
    pub fn resolve(&mut self, value: serde_json::Value) {
        if let Some(resolver) = self.resolver.take() {
            let _ = resolver.send(Ok(value));
        }
    }

    /// Reject the call's future. A no-op if already resolved/rejected.
    pub fn reject(&mut self, error: ClientError) {
        if let Some(resolver) = self.resolver.take() {
            let _ = resolver.send(Err(error));
        }
    }

    pub fn command(&self) -> Option<&str> {
        self.request.get("command").and_then(|v| v.as_str())
    }

    pub fn streams(&self) -> Vec<String> {
        self.request
            .get("streams")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Classify a request's command/options into a [`CallKind`].
pub fn classify(command: &str, options: &SendOptions) -> CallKind {
    let is_subscription_command =
        matches!(command, "subscribe" | "unsubscribe" | "path_find");
    if is_subscription_command && !options.no_replay_after_reconnect {
        CallKind::Subscription
    } else {
        CallKind::OneShot
    }
}

/// Tracks pending one-shot calls and live subscriptions, keyed by internal id.
///
/// Invariant: a call appears in exactly one of the two maps.
#[derive(Default)]
pub struct CallRegistry {
    pending: HashMap<u64, Call>,
    subscriptions: HashMap<u64, Call>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a call into the appropriate map per its `kind`.
    pub fn insert(&mut self, call: Call) {
        match call.kind {
            CallKind::OneShot => {
                self.pending.insert(call.internal_id, call);
            }
            CallKind::Subscription => {
                self.subscriptions.insert(call.internal_id, call);
            }
        }
    }

    pub fn get_pending_mut(&mut self, internal_id: u64) -> Option<&mut Call> {
        self.pending.get_mut(&internal_id)
    }

    pub fn get_subscription_mut(&mut self, internal_id: u64) -> Option<&mut Call> {
        self.subscriptions.get_mut(&internal_id)
    }

    pub fn remove_pending(&mut self, internal_id: u64) -> Option<Call> {
        self.pending.remove(&internal_id)
    }

    pub fn remove_subscription(&mut self, internal_id: u64) -> Option<Call> {
        self.subscriptions.remove(&internal_id)
    }

    pub fn contains(&self, internal_id: u64) -> bool {
        self.pending.contains_key(&internal_id) || self.subscriptions.contains_key(&internal_id)
    }

    /// All pending one-shot calls eligible for replay on flush, plus all subscriptions,
    /// in that order.
    pub fn flush_order(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .pending
            .values()
            .filter(|c| !c.options.no_replay_after_reconnect)
            .map(|c| c.internal_id)
            .collect();
        ids.sort_unstable();
        let mut sub_ids: Vec<u64> = self.subscriptions.keys().copied().collect();
        sub_ids.sort_unstable();
        ids.extend(sub_ids);
        ids
    }

    pub fn get_mut(&mut self, internal_id: u64) -> Option<&mut Call> {
        self.pending
            .get_mut(&internal_id)
            .or_else(|| self.subscriptions.get_mut(&internal_id))
    }

    /// Which map `internal_id` currently lives in, without borrowing either mutably.
    pub fn peek_kind(&self, internal_id: u64) -> Option<CallKind> {
        if self.subscriptions.contains_key(&internal_id) {
            Some(CallKind::Subscription)
        } else if self.pending.contains_key(&internal_id) {
            Some(CallKind::OneShot)
        } else {
            None
        }
    }

    pub fn subscriptions_iter(&self) -> impl Iterator<Item = (&u64, &Call)> {
        self.subscriptions.iter()
    }

    /// Drain every outstanding call (both maps) for a hard close.
    pub fn drain_all(&mut self) -> Vec<Call> {
        let mut all: Vec<Call> = self.pending.drain().map(|(_, c)| c).collect();
        all.extend(self.subscriptions.drain().map(|(_, c)| c));
        all
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn subscription_len(&self) -> usize {
        self.subscriptions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_call(id: u64, kind: CallKind) -> Call {
        let mut request = serde_json::Map::new();
        request.insert(
            "command".to_string(),
            serde_json::json!(if kind == CallKind::Subscription {
                "subscribe"
            } else {
                "ledger_current"
            }),
        );
        let (tx, _rx) = oneshot::channel();
        Call {
            internal_id: id,
            request,
            user_request_id: None,
            kind,
            options: SendOptions::default(),
            resolver: Some(tx),
            armed: false,
        }
    }

    #[test]
    fn test_classify_subscribe_is_subscription() {
        let kind = classify("subscribe", &SendOptions::default());
        assert_eq!(kind, CallKind::Subscription);
    }

    #[test]
    fn test_classify_subscribe_with_no_replay_is_oneshot() {
        let opts = SendOptions {
            no_replay_after_reconnect: true,
            ..Default::default()
        };
        assert_eq!(classify("subscribe", &opts), CallKind::OneShot);
    }

    #[test]
    fn test_classify_non_subscription_command_is_oneshot() {
        assert_eq!(
            classify("ledger_current", &SendOptions::default()),
            CallKind::OneShot
        );
    }

    #[test]
    fn test_insert_into_exactly_one_map() {
        let mut registry = CallRegistry::new();
        registry.insert(make_call(1, CallKind::OneShot));
        registry.insert(make_call(2, CallKind::Subscription));

        assert!(registry.get_pending_mut(1).is_some());
        assert!(registry.get_subscription_mut(1).is_none());
        assert!(registry.get_subscription_mut(2).is_some());
        assert!(registry.get_pending_mut(2).is_none());
    }

    #[test]
    fn test_resolve_then_reject_is_noop() {
        let mut call = make_call(1, CallKind::OneShot);
        call.resolve(serde_json::json!({"ok": true}));
        // Second resolution attempt must be a no-op (resolver already consumed).
        assert!(call.resolver.is_none());
        call.reject(ClientError::Closed);
    }

    #[test]
    fn test_flush_order_pending_before_subscriptions() {
        let mut registry = CallRegistry::new();
        registry.insert(make_call(2, CallKind::Subscription));
        registry.insert(make_call(1, CallKind::OneShot));
        registry.insert(make_call(3, CallKind::OneShot));

        let order = registry.flush_order();
        assert_eq!(order, vec![1, 3, 2]);
    }

    #[test]
    fn test_flush_order_excludes_no_replay_pending() {
        let mut registry = CallRegistry::new();
        let mut call = make_call(1, CallKind::OneShot);
        call.options.no_replay_after_reconnect = true;
        registry.insert(call);
        registry.insert(make_call(2, CallKind::OneShot));

        assert_eq!(registry.flush_order(), vec![2]);
    }

    #[test]
    fn test_drain_all_empties_both_maps() {
        let mut registry = CallRegistry::new();
        registry.insert(make_call(1, CallKind::OneShot));
        registry.insert(make_call(2, CallKind::Subscription));

        let drained = registry.drain_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(registry.pending_len(), 0);
        assert_eq!(registry.subscription_len(), 0);
    }
}
