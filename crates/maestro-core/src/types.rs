//! Core type definitions for Maestro orchestration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Expert (backend) identifier
pub type ExpertId = String;

/// Task identifier for loop runs and workflow requests
pub type TaskId = String;

/// Intent classification for an incoming request
///
/// Closed set: the workflow orchestrator maps each intent to a default
/// expert via the routing table in [`crate::MaestroConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskIntent {
    Conceptual,
    #[default]
    Implementation,
    Debugging,
    Refactoring,
    Research,
    Review,
    Documentation,
}

impl std::fmt::Display for TaskIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conceptual => write!(f, "conceptual"),
            Self::Implementation => write!(f, "implementation"),
            Self::Debugging => write!(f, "debugging"),
            Self::Refactoring => write!(f, "refactoring"),
            Self::Research => write!(f, "research"),
            Self::Review => write!(f, "review"),
            Self::Documentation => write!(f, "documentation"),
        }
    }
}

impl std::str::FromStr for TaskIntent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conceptual" => Ok(Self::Conceptual),
            "implementation" => Ok(Self::Implementation),
            "debugging" => Ok(Self::Debugging),
            "refactoring" => Ok(Self::Refactoring),
            "research" => Ok(Self::Research),
            "review" => Ok(Self::Review),
            "documentation" => Ok(Self::Documentation),
            _ => Err(format!("Invalid intent: {}", s)),
        }
    }
}

/// Rough complexity estimate produced by the assessment phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Trivial,
    #[default]
    Moderate,
    Complex,
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trivial => write!(f, "trivial"),
            Self::Moderate => write!(f, "moderate"),
            Self::Complex => write!(f, "complex"),
        }
    }
}

/// Classified failure type
///
/// Closed taxonomy. Classification is pattern-based and best-effort;
/// anything unmatched degrades to `Unknown`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    /// API quota exhausted or request throttled (429)
    RateLimit,
    /// The expert call exceeded its deadline
    Timeout,
    /// Credentials rejected (401/403)
    AuthError,
    /// The backend itself errored (5xx, overloaded)
    ModelError,
    /// Output suppressed by a content policy
    ContentFilter,
    /// Output was empty or unparseable
    InvalidResponse,
    /// Transport-level failure (DNS, connection reset)
    NetworkError,
    /// Unclassified
    #[default]
    Unknown,
}

impl std::fmt::Display for FailureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Timeout => write!(f, "timeout"),
            Self::AuthError => write!(f, "auth_error"),
            Self::ModelError => write!(f, "model_error"),
            Self::ContentFilter => write!(f, "content_filter"),
            Self::InvalidResponse => write!(f, "invalid_response"),
            Self::NetworkError => write!(f, "network_error"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Recovery action suggested by the failure engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureAction {
    /// Retry the same expert after a backoff delay
    #[default]
    Retry,
    /// Retry the same expert with a modified prompt
    RetryModified,
    /// Move to the next expert in the fallback chain
    SwitchExpert,
    /// Stop automatic recovery and produce an escalation report
    Escalate,
    /// Stop without a report (caller-requested)
    Abort,
}

impl std::fmt::Display for FailureAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retry => write!(f, "retry"),
            Self::RetryModified => write!(f, "retry_modified"),
            Self::SwitchExpert => write!(f, "switch_expert"),
            Self::Escalate => write!(f, "escalate"),
            Self::Abort => write!(f, "abort"),
        }
    }
}

/// One entry in a request's append-only failure history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Expert that produced the failure
    pub expert: ExpertId,
    /// Attempt number at the time of failure (1-based)
    pub attempt: u32,
    /// When the failure was recorded
    pub timestamp: DateTime<Utc>,
    /// Classified failure type
    pub failure_type: FailureType,
    /// Raw error text as returned by the expert boundary
    pub error: String,
    /// Action the engine took in response
    pub action: FailureAction,
}

impl FailureRecord {
    pub fn new(
        expert: impl Into<ExpertId>,
        attempt: u32,
        failure_type: FailureType,
        error: impl Into<String>,
        action: FailureAction,
    ) -> Self {
        Self {
            expert: expert.into(),
            attempt,
            timestamp: Utc::now(),
            failure_type,
            error: error.into(),
            action,
        }
    }
}
