//! Lifecycle event types consumed by the hook dispatcher

use maestro_core::{ExpertId, TaskId};
use serde::{Deserialize, Serialize};

/// Lifecycle event kinds a hook can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ToolCall,
    ToolResult,
    ExpertCall,
    ExpertResult,
    WorkflowStart,
    WorkflowPhase,
    WorkflowEnd,
    SessionIdle,
    Error,
    RateLimit,
    ServerStart,
    ServerStop,
    LoopStart,
    LoopIteration,
    LoopEnd,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ToolCall => write!(f, "tool_call"),
            Self::ToolResult => write!(f, "tool_result"),
            Self::ExpertCall => write!(f, "expert_call"),
            Self::ExpertResult => write!(f, "expert_result"),
            Self::WorkflowStart => write!(f, "workflow_start"),
            Self::WorkflowPhase => write!(f, "workflow_phase"),
            Self::WorkflowEnd => write!(f, "workflow_end"),
            Self::SessionIdle => write!(f, "session_idle"),
            Self::Error => write!(f, "error"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::ServerStart => write!(f, "server_start"),
            Self::ServerStop => write!(f, "server_stop"),
            Self::LoopStart => write!(f, "loop_start"),
            Self::LoopIteration => write!(f, "loop_iteration"),
            Self::LoopEnd => write!(f, "loop_end"),
        }
    }
}

/// Context for one lifecycle event
///
/// One variant per event type, carrying only the fields relevant to that
/// event. Immutable once constructed: hooks receive it by reference and
/// express changes as [`crate::HookDecision::Modify`] patches against the
/// dispatcher's working payload, never by mutating the original.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventContext {
    ToolCall {
        tool: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool: String,
        output: String,
    },
    ExpertCall {
        expert: ExpertId,
        prompt: String,
    },
    ExpertResult {
        expert: ExpertId,
        output: String,
    },
    WorkflowStart {
        task_id: TaskId,
        request: String,
    },
    WorkflowPhase {
        task_id: TaskId,
        phase: String,
        completed: bool,
    },
    WorkflowEnd {
        task_id: TaskId,
        success: bool,
        elapsed_ms: u64,
    },
    SessionIdle {
        idle_secs: u64,
    },
    Error {
        message: String,
    },
    RateLimit {
        expert: ExpertId,
        message: String,
    },
    ServerStart,
    ServerStop,
    LoopStart {
        task_id: TaskId,
        expert: ExpertId,
        max_iterations: u32,
    },
    LoopIteration {
        task_id: TaskId,
        iteration: u32,
    },
    LoopEnd {
        task_id: TaskId,
        iterations: u32,
        outcome: String,
    },
}

impl EventContext {
    /// Event type this context belongs to
    pub fn event_type(&self) -> EventType {
        match self {
            Self::ToolCall { .. } => EventType::ToolCall,
            Self::ToolResult { .. } => EventType::ToolResult,
            Self::ExpertCall { .. } => EventType::ExpertCall,
            Self::ExpertResult { .. } => EventType::ExpertResult,
            Self::WorkflowStart { .. } => EventType::WorkflowStart,
            Self::WorkflowPhase { .. } => EventType::WorkflowPhase,
            Self::WorkflowEnd { .. } => EventType::WorkflowEnd,
            Self::SessionIdle { .. } => EventType::SessionIdle,
            Self::Error { .. } => EventType::Error,
            Self::RateLimit { .. } => EventType::RateLimit,
            Self::ServerStart => EventType::ServerStart,
            Self::ServerStop => EventType::ServerStop,
            Self::LoopStart { .. } => EventType::LoopStart,
            Self::LoopIteration { .. } => EventType::LoopIteration,
            Self::LoopEnd { .. } => EventType::LoopEnd,
        }
    }

    /// JSON working payload for dispatch
    ///
    /// Modify patches are shallow-merged into this object; the context
    /// itself stays untouched.
    pub fn payload(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}
