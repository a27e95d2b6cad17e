//! Hook registry and dispatch pipeline
//!
//! Hooks are prioritized observers keyed by event type. Within one
//! dispatch they run strictly in priority order (Critical first, ties in
//! registration order), never concurrently, so a `Modify` from an earlier
//! hook is visible to every later hook in the same chain.
//!
//! The pipeline is fail-open with respect to handler errors: a hook that
//! returns `Err` is logged and treated as a no-op continue. Only an
//! explicit `Block` decision halts the chain. Handlers must be idempotent
//! with respect to re-dispatch: after a recovery cycle the same event may
//! be dispatched again.

use crate::events::{EventContext, EventType};
use async_trait::async_trait;
use maestro_core::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Hook priority levels; lower runs earlier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HookPriority {
    Critical = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
}

impl std::fmt::Display for HookPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Normal => write!(f, "normal"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Decision returned by a hook handler
#[derive(Debug, Clone, PartialEq)]
pub enum HookDecision {
    /// Let the pipeline proceed, optionally injecting a message into the
    /// conversation and/or contributing metadata
    Continue {
        inject_message: Option<String>,
        metadata: Option<Value>,
    },
    /// Shallow-merge a partial payload replacement into the working copy
    /// seen by later hooks and by the caller
    Modify { patch: Value },
    /// Veto the event; no later hook runs and the reason is surfaced to
    /// the caller
    Block { reason: String },
}

/// No-op decision for hooks with nothing to contribute
pub const NO_OP: HookDecision = HookDecision::Continue {
    inject_message: None,
    metadata: None,
};

impl HookDecision {
    pub fn proceed() -> Self {
        NO_OP
    }

    pub fn inject(message: impl Into<String>) -> Self {
        Self::Continue {
            inject_message: Some(message.into()),
            metadata: None,
        }
    }

    pub fn modify(patch: Value) -> Self {
        Self::Modify { patch }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self::Block {
            reason: reason.into(),
        }
    }
}

/// A registered lifecycle observer
#[async_trait]
pub trait Hook: Send + Sync {
    /// Unique identifier
    fn id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str {
        self.id()
    }

    /// The single event type this hook subscribes to
    fn event_type(&self) -> EventType;

    fn priority(&self) -> HookPriority {
        HookPriority::Normal
    }

    fn enabled(&self) -> bool {
        true
    }

    /// Handle an event
    ///
    /// `payload` is the working copy after earlier hooks' modifications.
    /// An `Err` return is logged and treated as a no-op continue.
    async fn handle(&self, context: &EventContext, payload: &Value) -> Result<HookDecision>;
}

/// Resolved result of dispatching one event through its hook chain
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// Whether the chain ran to completion or was vetoed
    pub decision: DispatchDecision,
    /// Working payload after all modifications
    pub payload: Value,
    /// Messages injected by `Continue` decisions, in chain order
    pub injected_messages: Vec<String>,
    /// Metadata contributed by `Continue` decisions, shallow-merged
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchDecision {
    Proceed,
    Blocked { hook_id: String, reason: String },
}

impl DispatchOutcome {
    pub fn is_blocked(&self) -> bool {
        matches!(self.decision, DispatchDecision::Blocked { .. })
    }

    pub fn block_reason(&self) -> Option<&str> {
        match &self.decision {
            DispatchDecision::Blocked { reason, .. } => Some(reason),
            DispatchDecision::Proceed => None,
        }
    }
}

/// Registry of hooks keyed by event type
///
/// Hooks are registered once at startup; each chain is kept sorted by
/// priority with ties broken by registration order (stable sort).
#[derive(Default)]
pub struct HookRegistry {
    chains: HashMap<EventType, Vec<Arc<dyn Hook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook into its event type's chain
    pub fn register(&mut self, hook: Arc<dyn Hook>) {
        let chain = self.chains.entry(hook.event_type()).or_default();
        chain.push(hook);
        chain.sort_by_key(|h| h.priority());
    }

    /// Number of hooks registered for an event type
    pub fn chain_len(&self, event_type: EventType) -> usize {
        self.chains.get(&event_type).map(Vec::len).unwrap_or(0)
    }

    /// Total number of registered hooks
    pub fn len(&self) -> usize {
        self.chains.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.values().all(Vec::is_empty)
    }

    /// Run the chain for an event and resolve a single outcome
    ///
    /// Stops at the first `Block`; merges `Modify` patches into a working
    /// payload; aggregates injected messages. Handler errors never abort
    /// the pipeline.
    pub async fn dispatch(&self, context: &EventContext) -> DispatchOutcome {
        let event_type = context.event_type();
        let mut payload = Value::Object(context.payload());
        let mut injected_messages = Vec::new();
        let mut metadata = Value::Object(serde_json::Map::new());

        let chain = match self.chains.get(&event_type) {
            Some(chain) => chain,
            None => {
                return DispatchOutcome {
                    decision: DispatchDecision::Proceed,
                    payload,
                    injected_messages,
                    metadata,
                }
            }
        };

        for hook in chain {
            if !hook.enabled() {
                debug!("Hook {} disabled, skipping", hook.id());
                continue;
            }

            match hook.handle(context, &payload).await {
                Ok(HookDecision::Block { reason }) => {
                    debug!(
                        "Hook {} blocked {} event: {}",
                        hook.id(),
                        event_type,
                        reason
                    );
                    return DispatchOutcome {
                        decision: DispatchDecision::Blocked {
                            hook_id: hook.id().to_string(),
                            reason,
                        },
                        payload,
                        injected_messages,
                        metadata,
                    };
                }
                Ok(HookDecision::Modify { patch }) => {
                    shallow_merge(&mut payload, patch);
                }
                Ok(HookDecision::Continue {
                    inject_message,
                    metadata: contributed,
                }) => {
                    if let Some(message) = inject_message {
                        injected_messages.push(message);
                    }
                    if let Some(contributed) = contributed {
                        shallow_merge(&mut metadata, contributed);
                    }
                }
                Err(e) => {
                    // Fail open: a misbehaving observer never aborts the
                    // pipeline, only an explicit Block may.
                    warn!("Hook {} failed on {} (continuing): {}", hook.id(), event_type, e);
                }
            }
        }

        DispatchOutcome {
            decision: DispatchDecision::Proceed,
            payload,
            injected_messages,
            metadata,
        }
    }
}

/// Shallow-merge `patch` object keys into `target`, overwriting
fn shallow_merge(target: &mut Value, patch: Value) {
    if let (Value::Object(target_map), Value::Object(patch_map)) = (target, patch) {
        for (key, value) in patch_map {
            target_map.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::MaestroError;
    use serde_json::json;
    use std::sync::Mutex;

    // Test hook that records invocation order and returns a fixed decision
    struct TestHook {
        id: String,
        priority: HookPriority,
        enabled: bool,
        decision: HookDecision,
        order_log: Arc<Mutex<Vec<String>>>,
        seen_payload: Arc<Mutex<Option<Value>>>,
    }

    impl TestHook {
        fn new(
            id: &str,
            priority: HookPriority,
            decision: HookDecision,
            order_log: Arc<Mutex<Vec<String>>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                priority,
                enabled: true,
                decision,
                order_log,
                seen_payload: Arc::new(Mutex::new(None)),
            })
        }
    }

    #[async_trait]
    impl Hook for TestHook {
        fn id(&self) -> &str {
            &self.id
        }

        fn event_type(&self) -> EventType {
            EventType::ToolCall
        }

        fn priority(&self) -> HookPriority {
            self.priority
        }

        fn enabled(&self) -> bool {
            self.enabled
        }

        async fn handle(&self, _context: &EventContext, payload: &Value) -> Result<HookDecision> {
            self.order_log.lock().unwrap().push(self.id.clone());
            *self.seen_payload.lock().unwrap() = Some(payload.clone());
            Ok(self.decision.clone())
        }
    }

    struct FailingHook;

    #[async_trait]
    impl Hook for FailingHook {
        fn id(&self) -> &str {
            "failing"
        }

        fn event_type(&self) -> EventType {
            EventType::ToolCall
        }

        async fn handle(&self, _context: &EventContext, _payload: &Value) -> Result<HookDecision> {
            Err(MaestroError::Hook("handler exploded".to_string()))
        }
    }

    fn tool_call_event() -> EventContext {
        EventContext::ToolCall {
            tool: "search".to_string(),
            input: json!({"query": "foo"}),
        }
    }

    #[tokio::test]
    async fn test_dispatch_empty_chain() {
        let registry = HookRegistry::new();
        let outcome = registry.dispatch(&tool_call_event()).await;
        assert!(!outcome.is_blocked());
        assert!(outcome.injected_messages.is_empty());
        assert_eq!(outcome.payload["tool"], "search");
    }

    #[tokio::test]
    async fn test_block_short_circuits_chain() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        registry.register(TestHook::new(
            "first",
            HookPriority::High,
            HookDecision::proceed(),
            order.clone(),
        ));
        registry.register(TestHook::new(
            "second",
            HookPriority::Normal,
            HookDecision::block("policy veto"),
            order.clone(),
        ));
        registry.register(TestHook::new(
            "third",
            HookPriority::Low,
            HookDecision::proceed(),
            order.clone(),
        ));

        let outcome = registry.dispatch(&tool_call_event()).await;

        assert!(outcome.is_blocked());
        assert_eq!(outcome.block_reason(), Some("policy veto"));
        assert_eq!(
            outcome.decision,
            DispatchDecision::Blocked {
                hook_id: "second".to_string(),
                reason: "policy veto".to_string(),
            }
        );
        // The third hook never ran
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_modify_visible_to_later_hooks() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        registry.register(TestHook::new(
            "modifier",
            HookPriority::High,
            HookDecision::modify(json!({"x": 1})),
            order.clone(),
        ));
        let reader = TestHook::new(
            "reader",
            HookPriority::Normal,
            HookDecision::proceed(),
            order.clone(),
        );
        let seen = reader.seen_payload.clone();
        registry.register(reader);

        let outcome = registry.dispatch(&tool_call_event()).await;

        let seen = seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen["x"], 1);
        // Original fields survive the shallow merge
        assert_eq!(seen["tool"], "search");
        // Caller sees the merged payload too
        assert_eq!(outcome.payload["x"], 1);
    }

    #[tokio::test]
    async fn test_priority_order_with_stable_ties() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        // Registered low first, then two normals, then critical
        registry.register(TestHook::new(
            "low",
            HookPriority::Low,
            HookDecision::proceed(),
            order.clone(),
        ));
        registry.register(TestHook::new(
            "normal-a",
            HookPriority::Normal,
            HookDecision::proceed(),
            order.clone(),
        ));
        registry.register(TestHook::new(
            "normal-b",
            HookPriority::Normal,
            HookDecision::proceed(),
            order.clone(),
        ));
        registry.register(TestHook::new(
            "critical",
            HookPriority::Critical,
            HookDecision::proceed(),
            order.clone(),
        ));

        registry.dispatch(&tool_call_event()).await;

        assert_eq!(
            *order.lock().unwrap(),
            vec!["critical", "normal-a", "normal-b", "low"]
        );
    }

    #[tokio::test]
    async fn test_handler_error_treated_as_continue() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        registry.register(Arc::new(FailingHook));
        registry.register(TestHook::new(
            "after-failure",
            HookPriority::Low,
            HookDecision::inject("still running"),
            order.clone(),
        ));

        let outcome = registry.dispatch(&tool_call_event()).await;

        assert!(!outcome.is_blocked());
        assert_eq!(outcome.injected_messages, vec!["still running"]);
        assert_eq!(*order.lock().unwrap(), vec!["after-failure"]);
    }

    #[tokio::test]
    async fn test_injected_messages_aggregate_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        registry.register(TestHook::new(
            "one",
            HookPriority::High,
            HookDecision::inject("retrying..."),
            order.clone(),
        ));
        registry.register(TestHook::new(
            "two",
            HookPriority::Normal,
            HookDecision::inject("context added"),
            order.clone(),
        ));

        let outcome = registry.dispatch(&tool_call_event()).await;
        assert_eq!(
            outcome.injected_messages,
            vec!["retrying...", "context added"]
        );
    }

    #[tokio::test]
    async fn test_metadata_contributions_merge() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        registry.register(TestHook::new(
            "meta-a",
            HookPriority::High,
            HookDecision::Continue {
                inject_message: None,
                metadata: Some(json!({"source": "a", "count": 1})),
            },
            order.clone(),
        ));
        registry.register(TestHook::new(
            "meta-b",
            HookPriority::Normal,
            HookDecision::Continue {
                inject_message: None,
                metadata: Some(json!({"count": 2})),
            },
            order.clone(),
        ));

        let outcome = registry.dispatch(&tool_call_event()).await;
        assert_eq!(outcome.metadata["source"], "a");
        // Later contribution overwrites on shallow merge
        assert_eq!(outcome.metadata["count"], 2);
    }

    #[tokio::test]
    async fn test_disabled_hook_skipped() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        registry.register(Arc::new(TestHook {
            id: "disabled".to_string(),
            priority: HookPriority::Critical,
            enabled: false,
            decision: HookDecision::block("should never fire"),
            order_log: order.clone(),
            seen_payload: Arc::new(Mutex::new(None)),
        }));

        let outcome = registry.dispatch(&tool_call_event()).await;
        assert!(!outcome.is_blocked());
        assert!(order.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chain_is_per_event_type() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        registry.register(TestHook::new(
            "tool-hook",
            HookPriority::Normal,
            HookDecision::block("wrong event"),
            order.clone(),
        ));

        // An ExpertCall dispatch must not touch the ToolCall chain
        let outcome = registry
            .dispatch(&EventContext::ExpertCall {
                expert: "coder".to_string(),
                prompt: "hi".to_string(),
            })
            .await;
        assert!(!outcome.is_blocked());
        assert!(order.lock().unwrap().is_empty());
    }

    #[test]
    fn test_no_op_constant() {
        assert_eq!(
            NO_OP,
            HookDecision::Continue {
                inject_message: None,
                metadata: None
            }
        );
    }
}
