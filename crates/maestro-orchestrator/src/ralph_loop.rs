//! Autonomous iteration loop
//!
//! Runs the same task against one expert repeatedly until the expert
//! declares completion with a promise tag, the iteration budget runs out,
//! or the caller cancels. Cancellation is cooperative: it is observed at
//! iteration boundaries only, so an in-flight expert call always runs to
//! completion.
//!
//! Iteration errors are retried optimistically. A failed iteration is
//! counted and logged but does not stop the loop; the iteration budget is
//! the backstop against an expert that never recovers.

use crate::events::EventContext;
use crate::hooks::HookRegistry;
use chrono::{DateTime, Utc};
use maestro_core::{ExpertId, LoopDefaults, MaestroError, Result, TaskId};
use maestro_expert::{CompletionPromise, ExpertRegistry};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

const MIN_ITERATIONS: u32 = 1;
const MAX_ITERATIONS: u32 = 50;
const STATUS_EXCERPT_LIMIT: usize = 200;

/// Options for one loop run
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// Task description fed to the expert every iteration
    pub task: String,
    /// Expert to drive
    pub expert: ExpertId,
    /// Caller-supplied task id; a fresh one is generated when `None`
    pub task_id: Option<TaskId>,
    /// Iteration budget; defaults apply when `None`, clamped to 1..=50
    pub max_iterations: Option<u32>,
    /// Completion marker; defaults apply when `None`
    pub completion_marker: Option<String>,
}

impl LoopOptions {
    pub fn new(task: impl Into<String>, expert: impl Into<ExpertId>) -> Self {
        Self {
            task: task.into(),
            expert: expert.into(),
            task_id: None,
            max_iterations: None,
            completion_marker: None,
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<TaskId>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_completion_marker(mut self, marker: impl Into<String>) -> Self {
        self.completion_marker = Some(marker.into());
        self
    }
}

/// How a loop run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// Expert emitted the completion promise
    Completed,
    /// Cancelled by the caller or blocked by a hook
    Cancelled,
    /// Iteration budget spent without completion
    Exhausted,
}

impl std::fmt::Display for LoopOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Snapshot of the active loop
#[derive(Debug, Clone)]
pub struct LoopStatus {
    pub task_id: TaskId,
    pub expert: ExpertId,
    pub iteration: u32,
    pub max_iterations: u32,
    pub failed_iterations: u32,
    pub started_at: DateTime<Utc>,
    /// Truncated output of the most recent successful iteration
    pub last_output: Option<String>,
}

impl LoopStatus {
    pub fn elapsed_ms(&self) -> u64 {
        (Utc::now() - self.started_at).num_milliseconds().max(0) as u64
    }
}

/// Final report for one loop run
#[derive(Debug, Clone)]
pub struct LoopReport {
    pub task_id: TaskId,
    pub outcome: LoopOutcome,
    /// Iterations actually started
    pub iterations: u32,
    /// Iterations that errored and were retried
    pub failed_iterations: u32,
    /// Output of the last successful iteration
    pub final_output: Option<String>,
    /// Parsed promise from the completing iteration
    pub promise: Option<CompletionPromise>,
    /// Blocking hook's reason, verbatim, when a hook cancelled the loop
    pub blocked_reason: Option<String>,
    pub elapsed_ms: u64,
}

/// Loop controller
///
/// At most one loop runs at a time per controller; a second `run` while
/// one is active is rejected, not queued. Share via `Arc` to cancel or
/// inspect a running loop from elsewhere.
pub struct RalphLoop {
    defaults: LoopDefaults,
    state: Mutex<Option<LoopStatus>>,
    active: AtomicBool,
    cancel_requested: AtomicBool,
}

impl RalphLoop {
    pub fn new(defaults: LoopDefaults) -> Self {
        Self {
            defaults,
            state: Mutex::new(None),
            active: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
        }
    }

    /// Request cancellation of the active loop
    ///
    /// Returns false when no loop is active. Takes effect at the next
    /// iteration boundary.
    pub fn cancel(&self) -> bool {
        if self.active.load(Ordering::SeqCst) {
            info!("Loop cancellation requested");
            self.cancel_requested.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// Snapshot of the active loop, `None` when idle
    pub async fn status(&self) -> Option<LoopStatus> {
        self.state.lock().await.clone()
    }

    /// Run a loop to completion
    pub async fn run(
        &self,
        registry: &ExpertRegistry,
        hooks: &HookRegistry,
        options: LoopOptions,
    ) -> Result<LoopReport> {
        let expert = registry.get(&options.expert)?;
        let max_iterations = options
            .max_iterations
            .unwrap_or(self.defaults.max_iterations)
            .clamp(MIN_ITERATIONS, MAX_ITERATIONS);
        let marker = options
            .completion_marker
            .clone()
            .unwrap_or_else(|| self.defaults.completion_promise.clone());

        let task_id = options
            .task_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let started_at = Utc::now();

        {
            let mut state = self.state.lock().await;
            if let Some(existing) = state.as_ref() {
                return Err(MaestroError::LoopActive(existing.task_id.clone()));
            }
            *state = Some(LoopStatus {
                task_id: task_id.clone(),
                expert: options.expert.clone(),
                iteration: 0,
                max_iterations,
                failed_iterations: 0,
                started_at,
                last_output: None,
            });
        }
        self.cancel_requested.store(false, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);

        info!(
            "Loop {} started: expert {}, budget {} iterations",
            task_id, options.expert, max_iterations
        );

        let start_outcome = hooks
            .dispatch(&EventContext::LoopStart {
                task_id: task_id.clone(),
                expert: options.expert.clone(),
                max_iterations,
            })
            .await;

        let base_prompt = build_prompt(&options.task, &marker);

        let mut outcome = LoopOutcome::Exhausted;
        let mut iterations = 0u32;
        let mut failed_iterations = 0u32;
        let mut transcript: Vec<String> = Vec::new();
        let mut final_output: Option<String> = None;
        let mut promise: Option<CompletionPromise> = None;
        let mut blocked_reason: Option<String> = None;

        if let Some(reason) = start_outcome.block_reason() {
            warn!("Loop {} blocked before start: {}", task_id, reason);
            blocked_reason = Some(reason.to_string());
            outcome = LoopOutcome::Cancelled;
        } else {
            for iteration in 1..=max_iterations {
                if self.cancel_requested.load(Ordering::SeqCst) {
                    info!("Loop {} cancelled at iteration {}", task_id, iteration);
                    outcome = LoopOutcome::Cancelled;
                    break;
                }

                iterations = iteration;
                {
                    let mut state = self.state.lock().await;
                    if let Some(status) = state.as_mut() {
                        status.iteration = iteration;
                        status.failed_iterations = failed_iterations;
                    }
                }

                let iteration_outcome = hooks
                    .dispatch(&EventContext::LoopIteration {
                        task_id: task_id.clone(),
                        iteration,
                    })
                    .await;
                if let Some(reason) = iteration_outcome.block_reason() {
                    warn!(
                        "Loop {} blocked at iteration {}: {}",
                        task_id, iteration, reason
                    );
                    blocked_reason = Some(reason.to_string());
                    outcome = LoopOutcome::Cancelled;
                    break;
                }

                // The transcript accumulates: original prompt plus every
                // prior iteration's output, newest last.
                let prompt = compose_prompt(&base_prompt, &transcript);
                match expert.invoke(&prompt).await {
                    Ok(response) => {
                        {
                            let mut state = self.state.lock().await;
                            if let Some(status) = state.as_mut() {
                                status.last_output = Some(excerpt(&response.output));
                            }
                        }
                        let parsed = CompletionPromise::parse(&response.output, &marker);
                        let complete = parsed.is_complete;
                        if complete {
                            info!(
                                "Loop {} completed at iteration {}/{}",
                                task_id, iteration, max_iterations
                            );
                            final_output = Some(response.output);
                            promise = Some(parsed);
                            outcome = LoopOutcome::Completed;
                            break;
                        }
                        info!(
                            "Loop {} iteration {}/{} finished without completion promise",
                            task_id, iteration, max_iterations
                        );
                        final_output = Some(response.output.clone());
                        transcript.push(response.output);
                    }
                    Err(e) => {
                        // Optimistic retry: the budget bounds a persistently
                        // failing expert.
                        failed_iterations += 1;
                        warn!(
                            "Loop {} iteration {} failed ({}), continuing",
                            task_id, iteration, e
                        );
                    }
                }
            }
        }

        if outcome == LoopOutcome::Exhausted {
            warn!(
                "Loop {} exhausted its budget of {} iterations",
                task_id, max_iterations
            );
        }

        let elapsed_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;

        hooks
            .dispatch(&EventContext::LoopEnd {
                task_id: task_id.clone(),
                iterations,
                outcome: outcome.to_string(),
            })
            .await;

        *self.state.lock().await = None;
        self.active.store(false, Ordering::SeqCst);
        self.cancel_requested.store(false, Ordering::SeqCst);

        Ok(LoopReport {
            task_id,
            outcome,
            iterations,
            failed_iterations,
            final_output,
            promise,
            blocked_reason,
            elapsed_ms,
        })
    }
}

/// Join the base prompt with prior iteration outputs, newest last
fn compose_prompt(base_prompt: &str, transcript: &[String]) -> String {
    if transcript.is_empty() {
        return base_prompt.to_string();
    }
    let mut prompt = base_prompt.to_string();
    prompt.push_str("\n\nPrior iteration outputs (newest last):");
    for (index, output) in transcript.iter().enumerate() {
        prompt.push_str(&format!("\n\n--- iteration {} ---\n{}", index + 1, output));
    }
    prompt
}

fn excerpt(output: &str) -> String {
    let mut text: String = output.chars().take(STATUS_EXCERPT_LIMIT).collect();
    if output.chars().count() > STATUS_EXCERPT_LIMIT {
        text.push_str("...");
    }
    text
}

/// Base prompt: the task plus the completion contract
fn build_prompt(task: &str, marker: &str) -> String {
    format!(
        "{}\n\n\
         Work on this task. When and only when it is fully complete, end your \
         response with <promise>{}</promise>. You may optionally include \
         <completion_reasoning>...</completion_reasoning> explaining why, and a \
         confidence percentage. If work remains, describe what you did and what \
         is left, without the promise tag.",
        task, marker
    )
}
