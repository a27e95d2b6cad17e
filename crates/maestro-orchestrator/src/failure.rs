//! Failure classification, recovery, and escalation
//!
//! Classification is table-driven: an ordered list of (regex, type,
//! recoverable, action) rules, first match wins. The table is data, not
//! code, so later patterns may be strict subsets of earlier ones and the
//! whole thing stays exhaustively unit-testable.
//!
//! Recovery policy: automatic local recovery (retry, retry with a modified
//! prompt, or switch experts along the static fallback chain) runs up to
//! the configured attempt ceiling; beyond that the engine refuses further
//! action and produces a terminal escalation report. Fail loud after N
//! tries, never silent infinite retry.

use chrono::{DateTime, Utc};
use maestro_core::{
    ExpertId, FailureAction, FailureRecord, FailureType, RetryConfig,
};
use maestro_expert::ExpertRegistry;
use rand::Rng;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Per-request recovery state
///
/// Created once per top-level request and never reused across unrelated
/// requests. `attempt_count` starts at 0; `prepare_next_attempt` bumps it
/// before each try, so after N full prepare/record cycles the history
/// length equals the attempt count.
#[derive(Debug, Clone)]
pub struct FailureContext {
    /// Original request text
    pub request: String,
    /// Expert the next attempt will use
    pub current_expert: ExpertId,
    /// Attempts started so far
    pub attempt_count: u32,
    /// Attempt ceiling before escalation
    pub max_attempts: u32,
    /// Append-only failure history
    pub history: Vec<FailureRecord>,
}

impl FailureContext {
    pub fn new(
        request: impl Into<String>,
        expert: impl Into<ExpertId>,
        max_attempts: u32,
    ) -> Self {
        Self {
            request: request.into(),
            current_expert: expert.into(),
            attempt_count: 0,
            max_attempts,
            history: Vec::new(),
        }
    }

    /// Experts involved so far, deduplicated, in first-seen order
    ///
    /// Includes the current expert even before its first failure so the
    /// fallback walk never hands back the expert that is already failing.
    pub fn experts_tried(&self) -> Vec<ExpertId> {
        let mut tried: Vec<ExpertId> = Vec::new();
        for record in &self.history {
            if !tried.contains(&record.expert) {
                tried.push(record.expert.clone());
            }
        }
        if !tried.contains(&self.current_expert) {
            tried.push(self.current_expert.clone());
        }
        tried
    }

    /// Distinct failure types observed, in first-seen order
    pub fn failure_types_seen(&self) -> Vec<FailureType> {
        let mut seen = Vec::new();
        for record in &self.history {
            if !seen.contains(&record.failure_type) {
                seen.push(record.failure_type);
            }
        }
        seen
    }
}

/// Classifier output for one failure
#[derive(Debug, Clone, PartialEq)]
pub struct FailureAnalysis {
    pub failure_type: FailureType,
    pub recoverable: bool,
    pub suggested_action: FailureAction,
    /// Backoff before the next attempt, for retry actions
    pub retry_delay: Option<Duration>,
    /// Fallback target, for switch actions
    pub alternate_expert: Option<ExpertId>,
}

/// One row of the classification table
struct ClassificationRule {
    pattern: Regex,
    failure_type: FailureType,
    recoverable: bool,
    action: FailureAction,
}

/// Ordered classification table; first match wins
fn classification_rules() -> &'static [ClassificationRule] {
    static RULES: OnceLock<Vec<ClassificationRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        let rule = |pattern: &str, failure_type, recoverable, action| ClassificationRule {
            // Patterns are fixed at compile time; a failure to parse one
            // is a programming error.
            pattern: Regex::new(pattern).unwrap(),
            failure_type,
            recoverable,
            action,
        };
        vec![
            rule(
                r"(?i)\b429\b|rate.?limit|quota|too many requests",
                FailureType::RateLimit,
                true,
                FailureAction::SwitchExpert,
            ),
            rule(
                r"(?i)timed?.?out|timeout|deadline exceeded",
                FailureType::Timeout,
                true,
                FailureAction::Retry,
            ),
            rule(
                r"(?i)\b401\b|\b403\b|unauthorized|forbidden|invalid.?api.?key|authentication|credentials",
                FailureType::AuthError,
                false,
                FailureAction::Escalate,
            ),
            rule(
                r"(?i)content.?policy|content.?filter|filtered|safety system",
                FailureType::ContentFilter,
                true,
                FailureAction::RetryModified,
            ),
            rule(
                r"(?i)\b5\d\d\b|internal server|overloaded|bad gateway|service unavailable|model.?error",
                FailureType::ModelError,
                true,
                FailureAction::SwitchExpert,
            ),
            rule(
                r"(?i)empty response|invalid response|malformed|unparseable|failed to parse",
                FailureType::InvalidResponse,
                true,
                FailureAction::Retry,
            ),
            rule(
                r"(?i)connection|network|dns|broken pipe|unreachable|reset by peer",
                FailureType::NetworkError,
                true,
                FailureAction::Retry,
            ),
        ]
    })
}

/// Classify raw error text against the rule table
///
/// No match degrades gracefully to unknown/recoverable/retry.
fn classify(error: &str) -> (FailureType, bool, FailureAction) {
    for rule in classification_rules() {
        if rule.pattern.is_match(error) {
            return (rule.failure_type, rule.recoverable, rule.action);
        }
    }
    (FailureType::Unknown, true, FailureAction::Retry)
}

/// Terminal artifact produced when automatic recovery is exhausted
///
/// Once generated, the request is never retried automatically; a human
/// decision is required.
#[derive(Debug, Clone)]
pub struct EscalationReport {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    /// Original request, truncated for display
    pub request: String,
    /// Deduplicated list of experts tried
    pub experts_tried: Vec<ExpertId>,
    /// Full failure history
    pub history: Vec<FailureRecord>,
    /// Ranked recommendations, most specific first
    pub recommendations: Vec<String>,
}

const REPORT_REQUEST_LIMIT: usize = 500;

impl EscalationReport {
    /// Render as structured text for the end user
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Escalation Report {}\n\n", self.id));
        out.push_str(&format!("Generated: {}\n\n", self.generated_at.to_rfc3339()));
        out.push_str("## Request\n\n");
        out.push_str(&self.request);
        out.push_str("\n\n## Experts Tried\n\n");
        for expert in &self.experts_tried {
            out.push_str(&format!("- {}\n", expert));
        }
        out.push_str("\n## Failure History\n\n");
        for record in &self.history {
            out.push_str(&format!(
                "- attempt {} | {} | {} | {} | {}\n",
                record.attempt,
                record.expert,
                record.failure_type,
                record.action,
                record.error,
            ));
        }
        out.push_str("\n## Recommendations\n\n");
        for (rank, recommendation) in self.recommendations.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", rank + 1, recommendation));
        }
        out
    }
}

/// Failure classifier and escalation engine
pub struct FailureEngine {
    config: RetryConfig,
}

impl FailureEngine {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Analyze one failure and decide the recovery action
    ///
    /// Classification comes from the rule table; the default action is
    /// then adjusted by attempt count: at the ceiling the action is forced
    /// to escalate, and from `switch_after_attempts` on a plain retry is
    /// upgraded to an expert switch. Switch actions walk the fallback
    /// chain, skipping experts already in the history; an exhausted chain
    /// downgrades to escalate.
    pub fn analyze_failure(
        &self,
        error: &str,
        context: &FailureContext,
        registry: &ExpertRegistry,
    ) -> FailureAnalysis {
        let (failure_type, mut recoverable, mut action) = classify(error);

        if context.attempt_count >= context.max_attempts {
            action = FailureAction::Escalate;
            recoverable = false;
        } else if context.attempt_count >= self.config.switch_after_attempts
            && action == FailureAction::Retry
        {
            // A request should not hit the same expert more than once
            // before an alternative is tried.
            action = FailureAction::SwitchExpert;
        }

        let mut alternate_expert = None;
        if action == FailureAction::SwitchExpert {
            let tried = context.experts_tried();
            match registry.next_fallback(&context.current_expert, &tried) {
                Some(candidate) => alternate_expert = Some(candidate),
                None => {
                    // Fallback chain exhausted
                    action = FailureAction::Escalate;
                }
            }
        }

        let retry_delay = match action {
            FailureAction::Retry | FailureAction::RetryModified => {
                Some(self.retry_delay(failure_type, context.attempt_count))
            }
            _ => None,
        };

        FailureAnalysis {
            failure_type,
            recoverable,
            suggested_action: action,
            retry_delay,
            alternate_expert,
        }
    }

    /// Backoff for a retry: `min(base * 2^(attempt-1), max)` with uniform
    /// jitter, clamped to the ceiling
    ///
    /// Rate limits use a larger base so throttled callers back off harder;
    /// the jitter de-synchronizes concurrent callers retrying in lockstep.
    pub fn retry_delay(&self, failure_type: FailureType, attempt: u32) -> Duration {
        let base = if failure_type == FailureType::RateLimit {
            self.config.rate_limit_delay_ms
        } else {
            self.config.base_delay_ms
        };

        let exponent = attempt.saturating_sub(1).min(16);
        let capped = base
            .saturating_mul(1u64 << exponent)
            .min(self.config.max_delay_ms);

        let jitter = self.config.jitter_fraction;
        let factor = rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter);
        let with_jitter = (capped as f64 * factor) as u64;

        Duration::from_millis(with_jitter.min(self.config.max_delay_ms))
    }

    /// Bump the attempt counter, optionally switching the current expert
    pub fn prepare_next_attempt(
        &self,
        context: &mut FailureContext,
        next_expert: Option<ExpertId>,
    ) {
        context.attempt_count += 1;
        if let Some(expert) = next_expert {
            context.current_expert = expert;
        }
        info!(
            "Attempt {}/{} using expert {}",
            context.attempt_count, context.max_attempts, context.current_expert
        );
    }

    /// Append a failure record to the history
    pub fn record_failure(
        &self,
        context: &mut FailureContext,
        failure_type: FailureType,
        error: impl Into<String>,
        action: FailureAction,
    ) {
        let record = FailureRecord::new(
            context.current_expert.clone(),
            context.attempt_count,
            failure_type,
            error,
            action,
        );
        warn!(
            "Failure recorded: attempt {} expert {} type {} action {}",
            record.attempt, record.expert, record.failure_type, record.action
        );
        context.history.push(record);
    }

    /// Whether the attempt ceiling has been reached
    pub fn should_escalate(&self, context: &FailureContext) -> bool {
        context.attempt_count >= context.max_attempts
    }

    /// Produce the terminal escalation report
    pub fn generate_escalation_report(&self, context: &FailureContext) -> EscalationReport {
        // Truncate on a char boundary; byte-indexed truncation panics on
        // multibyte request text.
        let mut request: String = context.request.chars().take(REPORT_REQUEST_LIMIT).collect();
        if context.request.chars().count() > REPORT_REQUEST_LIMIT {
            request.push_str("...");
        }

        let mut recommendations = Vec::new();
        for failure_type in context.failure_types_seen() {
            let suggestion = match failure_type {
                FailureType::RateLimit => {
                    Some("Wait for the rate-limit window to reset before resubmitting")
                }
                FailureType::AuthError => {
                    Some("Check API credentials for the failing experts")
                }
                FailureType::ContentFilter => {
                    Some("Rephrase the request; output was suppressed by a content policy")
                }
                FailureType::Timeout => {
                    Some("Decompose the task into smaller, independently verifiable steps")
                }
                _ => None,
            };
            if let Some(suggestion) = suggestion {
                let suggestion = suggestion.to_string();
                if !recommendations.contains(&suggestion) {
                    recommendations.push(suggestion);
                }
            }
        }
        // Generic fallbacks rank last
        recommendations.push("Review the failure history before retrying manually".to_string());
        recommendations
            .push("Consider routing the request to a different expert manually".to_string());

        EscalationReport {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            request,
            experts_tried: context.experts_tried(),
            history: context.history.clone(),
            recommendations,
        }
    }
}
