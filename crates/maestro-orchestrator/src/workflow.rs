//! Phased workflow orchestration
//!
//! A workflow moves a request through fixed phases: intent, assessment,
//! exploration, implementation, completion. Every phase is bracketed by
//! hook events, and every expert call goes through the failure engine, so
//! recovery (retry, switch, escalate) applies uniformly to all phases.
//!
//! Veto scope: pre-action events (workflow start, phase start/end, expert
//! call) honor a hook `Block` by aborting the workflow. Post-facto
//! notifications (expert result, errors, workflow end) are observational;
//! a block there has nothing left to prevent and is ignored.
//!
//! The wall-clock timeout is cooperative: it is checked at phase
//! boundaries and between recovery attempts, never mid-call. A slow expert
//! call runs to completion, and an exceeded budget is fed to the failure
//! engine as a timeout failure, so a timed-out workflow ends the same way
//! any unrecoverable one does: with an escalation report.

use crate::events::EventContext;
use crate::failure::{EscalationReport, FailureContext, FailureEngine};
use crate::hooks::HookRegistry;
use crate::intent::{self, IntentAnalysis};
use crate::ralph_loop::{LoopOptions, LoopOutcome, LoopReport, RalphLoop};
use maestro_core::{Complexity, ExpertId, MaestroConfig, Result, TaskId, TaskIntent};
use maestro_expert::ExpertRegistry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// Workflow phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowPhase {
    Intent,
    Assessment,
    Exploration,
    Implementation,
    Recovery,
    Completion,
}

impl std::fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Intent => write!(f, "intent"),
            Self::Assessment => write!(f, "assessment"),
            Self::Exploration => write!(f, "exploration"),
            Self::Implementation => write!(f, "implementation"),
            Self::Recovery => write!(f, "recovery"),
            Self::Completion => write!(f, "completion"),
        }
    }
}

/// A request submitted to the orchestrator
#[derive(Debug, Clone)]
pub struct WorkflowRequest {
    pub request: String,
    /// Intent hint; skips heuristic classification when supplied
    pub intent: Option<TaskIntent>,
    /// Expert override; defaults to intent-based routing
    pub expert: Option<ExpertId>,
    /// Timeout override in seconds
    pub timeout_secs: Option<u64>,
    /// Exploration override; defaults to configuration plus complexity
    pub skip_exploration: Option<bool>,
    /// Run the task as an autonomous loop instead of the expert phases
    pub loop_mode: bool,
}

impl WorkflowRequest {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            intent: None,
            expert: None,
            timeout_secs: None,
            skip_exploration: None,
            loop_mode: false,
        }
    }

    pub fn with_loop_mode(mut self, loop_mode: bool) -> Self {
        self.loop_mode = loop_mode;
        self
    }

    pub fn with_intent(mut self, intent: TaskIntent) -> Self {
        self.intent = Some(intent);
        self
    }

    pub fn with_expert(mut self, expert: impl Into<ExpertId>) -> Self {
        self.expert = Some(expert.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_skip_exploration(mut self, skip: bool) -> Self {
        self.skip_exploration = Some(skip);
        self
    }
}

/// How a workflow ended
#[derive(Debug, Clone)]
pub enum WorkflowOutcome {
    Completed,
    /// A hook vetoed a pre-action event
    Blocked { hook_id: String, reason: String },
    /// Automatic recovery was exhausted
    Escalated(Box<EscalationReport>),
    /// Loop-mode run; the loop's terminal state is the workflow result
    Loop(LoopOutcome),
}

impl WorkflowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::Loop(LoopOutcome::Completed))
    }
}

impl std::fmt::Display for WorkflowOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Blocked { .. } => write!(f, "blocked"),
            Self::Escalated(_) => write!(f, "escalated"),
            Self::Loop(outcome) => write!(f, "loop_{}", outcome),
        }
    }
}

/// Final report for one workflow run
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub task_id: TaskId,
    pub outcome: WorkflowOutcome,
    pub intent: Option<IntentAnalysis>,
    /// Expert that produced the final output (after any switches)
    pub expert: ExpertId,
    pub phases_completed: Vec<WorkflowPhase>,
    /// Implementation-phase output
    pub output: Option<String>,
    /// Completion-phase summary
    pub summary: Option<String>,
    /// Failures absorbed by recovery along the way
    pub failure_count: usize,
    pub elapsed_ms: u64,
}

/// Why a workflow stopped before completion
enum Interrupt {
    Blocked { hook_id: String, reason: String },
    Escalated(Box<EscalationReport>),
}

/// The orchestration engine
///
/// Owns the hook registry, expert registry, failure engine, and loop
/// controller. All state is per-instance; multiple orchestrators can
/// coexist in one process.
pub struct Orchestrator {
    config: MaestroConfig,
    experts: ExpertRegistry,
    hooks: HookRegistry,
    engine: FailureEngine,
    ralph: Arc<RalphLoop>,
}

impl Orchestrator {
    pub fn new(config: MaestroConfig, mut experts: ExpertRegistry, hooks: HookRegistry) -> Self {
        for (expert, chain) in &config.experts.fallback_chains {
            experts.set_chain(expert.clone(), chain.clone());
        }
        let engine = FailureEngine::new(config.retry.clone());
        let ralph = Arc::new(RalphLoop::new(config.loop_defaults.clone()));
        Self {
            config,
            experts,
            hooks,
            engine,
            ralph,
        }
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn experts(&self) -> &ExpertRegistry {
        &self.experts
    }

    /// Loop controller handle, shareable for cancellation and status
    pub fn ralph(&self) -> Arc<RalphLoop> {
        self.ralph.clone()
    }

    /// Alternative entry point: drive a task as an autonomous loop instead
    /// of a phased workflow
    pub async fn run_loop(&self, options: LoopOptions) -> Result<LoopReport> {
        self.ralph.run(&self.experts, &self.hooks, options).await
    }

    /// Run a request through the phased workflow
    pub async fn run(&self, request: WorkflowRequest) -> Result<WorkflowReport> {
        let task_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let timeout = Duration::from_secs(
            request
                .timeout_secs
                .unwrap_or(self.config.workflow.timeout_secs),
        );

        info!("Workflow {} started", task_id);

        let start_outcome = self
            .hooks
            .dispatch(&EventContext::WorkflowStart {
                task_id: task_id.clone(),
                request: request.request.clone(),
            })
            .await;
        if let crate::hooks::DispatchDecision::Blocked { hook_id, reason } =
            start_outcome.decision
        {
            warn!("Workflow {} blocked at start by {}: {}", task_id, hook_id, reason);
            return Ok(self.finish(
                task_id,
                started,
                WorkflowOutcome::Blocked { hook_id, reason },
                None,
                String::new(),
                Vec::new(),
                None,
                None,
                0,
            )
            .await);
        }

        let mut phases_completed = Vec::new();

        // Intent phase: local analysis, no expert involved. A caller hint
        // overrides the classified intent; complexity and file references
        // still come from the heuristics.
        let analysis = match self
            .bracket_phase(&task_id, WorkflowPhase::Intent, || {
                let mut analysis = intent::analyze(&request.request);
                if let Some(hint) = request.intent {
                    analysis.intent = hint;
                }
                analysis
            })
            .await
        {
            Ok(analysis) => analysis,
            Err(interrupt) => {
                return Ok(self
                    .interrupted(task_id, started, interrupt, None, String::new(), phases_completed, None, None, 0)
                    .await);
            }
        };
        phases_completed.push(WorkflowPhase::Intent);

        let initial_expert = request
            .expert
            .clone()
            .unwrap_or_else(|| self.config.expert_for_intent(analysis.intent));
        if request.loop_mode {
            let loop_report = self
                .ralph
                .run(
                    &self.experts,
                    &self.hooks,
                    LoopOptions::new(request.request.clone(), initial_expert.clone()),
                )
                .await?;
            info!(
                "Workflow {} loop mode finished: {} after {} iterations",
                task_id, loop_report.outcome, loop_report.iterations
            );
            return Ok(self
                .finish(
                    task_id,
                    started,
                    WorkflowOutcome::Loop(loop_report.outcome),
                    Some(analysis),
                    initial_expert,
                    phases_completed,
                    loop_report.final_output,
                    None,
                    loop_report.failed_iterations as usize,
                )
                .await);
        }

        let mut context = FailureContext::new(
            request.request.clone(),
            initial_expert,
            self.config.retry.max_attempts,
        );

        let skip_exploration = request
            .skip_exploration
            .unwrap_or(self.config.workflow.skip_exploration)
            || analysis.complexity == Complexity::Trivial;

        let mut assessment_output = None;
        let mut exploration_output = None;
        let mut implementation_output = None;
        let mut summary_output = None;

        let phases = [
            WorkflowPhase::Assessment,
            WorkflowPhase::Exploration,
            WorkflowPhase::Implementation,
            WorkflowPhase::Completion,
        ];

        for phase in phases {
            if phase == WorkflowPhase::Exploration && skip_exploration {
                continue;
            }

            let prompt = build_phase_prompt(
                phase,
                &request.request,
                assessment_output.as_deref(),
                exploration_output.as_deref(),
                implementation_output.as_deref(),
            );

            let failures_before = context.history.len();
            match self
                .run_expert_phase(&task_id, phase, prompt, &mut context, started, timeout)
                .await
            {
                Ok(output) => {
                    // A phase that absorbed failures passed through recovery
                    if context.history.len() > failures_before
                        && !phases_completed.contains(&WorkflowPhase::Recovery)
                    {
                        phases_completed.push(WorkflowPhase::Recovery);
                    }
                    match phase {
                        WorkflowPhase::Assessment => assessment_output = Some(output),
                        WorkflowPhase::Exploration => exploration_output = Some(output),
                        WorkflowPhase::Implementation => implementation_output = Some(output),
                        WorkflowPhase::Completion => summary_output = Some(output),
                        _ => {}
                    }
                    phases_completed.push(phase);
                }
                Err(interrupt) => {
                    return Ok(self
                        .interrupted(
                            task_id,
                            started,
                            interrupt,
                            Some(analysis),
                            context.current_expert.clone(),
                            phases_completed,
                            implementation_output,
                            summary_output,
                            context.history.len(),
                        )
                        .await);
                }
            }
        }

        info!(
            "Workflow {} completed with expert {} ({} recovered failures)",
            task_id,
            context.current_expert,
            context.history.len()
        );

        Ok(self
            .finish(
                task_id,
                started,
                WorkflowOutcome::Completed,
                Some(analysis),
                context.current_expert.clone(),
                phases_completed,
                implementation_output,
                summary_output,
                context.history.len(),
            )
            .await)
    }

    /// Dispatch the phase-start event, run `work`, dispatch phase-end
    ///
    /// For expert-free phases.
    async fn bracket_phase<T>(
        &self,
        task_id: &str,
        phase: WorkflowPhase,
        work: impl FnOnce() -> T,
    ) -> std::result::Result<T, Interrupt> {
        self.dispatch_phase_event(task_id, phase, false).await?;
        let value = work();
        self.dispatch_phase_event(task_id, phase, true).await?;
        Ok(value)
    }

    async fn dispatch_phase_event(
        &self,
        task_id: &str,
        phase: WorkflowPhase,
        completed: bool,
    ) -> std::result::Result<(), Interrupt> {
        let outcome = self
            .hooks
            .dispatch(&EventContext::WorkflowPhase {
                task_id: task_id.to_string(),
                phase: phase.to_string(),
                completed,
            })
            .await;
        match outcome.decision {
            crate::hooks::DispatchDecision::Blocked { hook_id, reason } => {
                warn!(
                    "Workflow {} blocked at {} phase by {}: {}",
                    task_id, phase, hook_id, reason
                );
                Err(Interrupt::Blocked { hook_id, reason })
            }
            crate::hooks::DispatchDecision::Proceed => Ok(()),
        }
    }

    /// Run one expert-backed phase with recovery
    ///
    /// On failure this is where the workflow enters its recovery cycle:
    /// classify, then retry (with backoff), retry with a modified prompt,
    /// or switch experts, until success or escalation.
    async fn run_expert_phase(
        &self,
        task_id: &str,
        phase: WorkflowPhase,
        prompt: String,
        context: &mut FailureContext,
        started: Instant,
        timeout: Duration,
    ) -> std::result::Result<String, Interrupt> {
        self.dispatch_phase_event(task_id, phase, false).await?;

        let mut prompt = prompt;
        // The first failure opens the recovery phase; it closes when an
        // attempt finally succeeds. Escalation leaves it open.
        let mut in_recovery = false;
        let output = loop {
            if started.elapsed() >= timeout {
                // The spent budget is a failure like any other: it enters
                // recovery, burns attempts, and ends in escalation. No
                // backoff sleep, since waiting cannot restore the budget.
                let error_text = format!(
                    "workflow timed out after {}s (budget {}s)",
                    started.elapsed().as_secs(),
                    timeout.as_secs()
                );
                warn!("Workflow {} {} during {} phase", task_id, error_text, phase);
                if !in_recovery {
                    self.dispatch_phase_event(task_id, WorkflowPhase::Recovery, false)
                        .await?;
                    in_recovery = true;
                }
                self.engine.prepare_next_attempt(context, None);
                let analysis = self
                    .engine
                    .analyze_failure(&error_text, context, &self.experts);
                self.engine.record_failure(
                    context,
                    analysis.failure_type,
                    error_text,
                    analysis.suggested_action,
                );
                if matches!(
                    analysis.suggested_action,
                    maestro_core::FailureAction::Escalate | maestro_core::FailureAction::Abort
                ) {
                    let report = self.engine.generate_escalation_report(context);
                    return Err(Interrupt::Escalated(Box::new(report)));
                }
                if let Some(alternate) = analysis.alternate_expert {
                    context.current_expert = alternate;
                }
                continue;
            }

            let call_outcome = self
                .hooks
                .dispatch(&EventContext::ExpertCall {
                    expert: context.current_expert.clone(),
                    prompt: prompt.clone(),
                })
                .await;
            if let crate::hooks::DispatchDecision::Blocked { hook_id, reason } =
                call_outcome.decision
            {
                return Err(Interrupt::Blocked { hook_id, reason });
            }
            // Injected messages become part of the prompt for this call
            let mut effective_prompt = prompt.clone();
            for message in &call_outcome.injected_messages {
                effective_prompt.push_str("\n\n");
                effective_prompt.push_str(message);
            }

            let expert = match self.experts.get(&context.current_expert) {
                Ok(expert) => expert,
                Err(e) => {
                    // A switch landed on an expert that disappeared from
                    // the registry; nothing left to recover with.
                    self.engine.prepare_next_attempt(context, None);
                    self.engine.record_failure(
                        context,
                        maestro_core::FailureType::Unknown,
                        e.to_string(),
                        maestro_core::FailureAction::Escalate,
                    );
                    let report = self.engine.generate_escalation_report(context);
                    return Err(Interrupt::Escalated(Box::new(report)));
                }
            };

            match expert.invoke(&effective_prompt).await {
                Ok(response) => {
                    self.hooks
                        .dispatch(&EventContext::ExpertResult {
                            expert: context.current_expert.clone(),
                            output: response.output.clone(),
                        })
                        .await;
                    break response.output;
                }
                Err(e) => {
                    let error_text = e.to_string();
                    if !in_recovery {
                        self.dispatch_phase_event(task_id, WorkflowPhase::Recovery, false)
                            .await?;
                        in_recovery = true;
                    }
                    self.engine.prepare_next_attempt(context, None);
                    let analysis =
                        self.engine
                            .analyze_failure(&error_text, context, &self.experts);
                    self.engine.record_failure(
                        context,
                        analysis.failure_type,
                        error_text.clone(),
                        analysis.suggested_action,
                    );

                    if analysis.failure_type == maestro_core::FailureType::RateLimit {
                        self.hooks
                            .dispatch(&EventContext::RateLimit {
                                expert: context.current_expert.clone(),
                                message: error_text.clone(),
                            })
                            .await;
                    } else {
                        self.hooks
                            .dispatch(&EventContext::Error {
                                message: error_text.clone(),
                            })
                            .await;
                    }

                    use maestro_core::FailureAction;
                    match analysis.suggested_action {
                        FailureAction::Retry => {
                            if let Some(delay) = analysis.retry_delay {
                                tokio::time::sleep(delay).await;
                            }
                        }
                        FailureAction::RetryModified => {
                            prompt = format!(
                                "{}\n\nNote: a previous attempt failed ({}). Rephrase or \
                                 adjust your approach accordingly.",
                                prompt, analysis.failure_type
                            );
                            if let Some(delay) = analysis.retry_delay {
                                tokio::time::sleep(delay).await;
                            }
                        }
                        FailureAction::SwitchExpert => {
                            // analyze_failure only suggests a switch when a
                            // registered fallback exists
                            if let Some(alternate) = analysis.alternate_expert {
                                info!(
                                    "Workflow {} switching expert {} -> {}",
                                    task_id, context.current_expert, alternate
                                );
                                context.current_expert = alternate;
                            }
                        }
                        FailureAction::Escalate | FailureAction::Abort => {
                            warn!(
                                "Workflow {} escalating after {} attempts",
                                task_id, context.attempt_count
                            );
                            let report = self.engine.generate_escalation_report(context);
                            return Err(Interrupt::Escalated(Box::new(report)));
                        }
                    }
                }
            }
        };

        if in_recovery {
            self.dispatch_phase_event(task_id, WorkflowPhase::Recovery, true)
                .await?;
        }
        self.dispatch_phase_event(task_id, phase, true).await?;
        Ok(output)
    }

    #[allow(clippy::too_many_arguments)]
    async fn interrupted(
        &self,
        task_id: TaskId,
        started: Instant,
        interrupt: Interrupt,
        intent: Option<IntentAnalysis>,
        expert: ExpertId,
        phases_completed: Vec<WorkflowPhase>,
        output: Option<String>,
        summary: Option<String>,
        failure_count: usize,
    ) -> WorkflowReport {
        let outcome = match interrupt {
            Interrupt::Blocked { hook_id, reason } => WorkflowOutcome::Blocked { hook_id, reason },
            Interrupt::Escalated(report) => WorkflowOutcome::Escalated(report),
        };
        self.finish(
            task_id,
            started,
            outcome,
            intent,
            expert,
            phases_completed,
            output,
            summary,
            failure_count,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        task_id: TaskId,
        started: Instant,
        outcome: WorkflowOutcome,
        intent: Option<IntentAnalysis>,
        expert: ExpertId,
        phases_completed: Vec<WorkflowPhase>,
        output: Option<String>,
        summary: Option<String>,
        failure_count: usize,
    ) -> WorkflowReport {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.hooks
            .dispatch(&EventContext::WorkflowEnd {
                task_id: task_id.clone(),
                success: outcome.is_success(),
                elapsed_ms,
            })
            .await;
        WorkflowReport {
            task_id,
            outcome,
            intent,
            expert,
            phases_completed,
            output,
            summary,
            failure_count,
            elapsed_ms,
        }
    }
}

/// Prompt for one expert-backed phase, layered on earlier phase outputs
fn build_phase_prompt(
    phase: WorkflowPhase,
    request: &str,
    assessment: Option<&str>,
    exploration: Option<&str>,
    implementation: Option<&str>,
) -> String {
    match phase {
        WorkflowPhase::Assessment => format!(
            "Assess the following request. Outline a short plan: the steps, the \
             risks, and what done looks like.\n\nRequest:\n{}",
            request
        ),
        WorkflowPhase::Exploration => format!(
            "Before implementing, list the information, files, and constraints \
             that matter for this request.\n\nRequest:\n{}\n\nPlan:\n{}",
            request,
            assessment.unwrap_or("(none)")
        ),
        WorkflowPhase::Implementation => {
            let mut prompt = format!(
                "Carry out the following request.\n\nRequest:\n{}\n\nPlan:\n{}",
                request,
                assessment.unwrap_or("(none)")
            );
            if let Some(exploration) = exploration {
                prompt.push_str("\n\nContext:\n");
                prompt.push_str(exploration);
            }
            prompt
        }
        WorkflowPhase::Completion => format!(
            "Summarize the work performed for this request and list any \
             follow-ups.\n\nRequest:\n{}\n\nResult:\n{}",
            request,
            implementation.unwrap_or("(none)")
        ),
        // Intent and recovery never build expert prompts
        _ => request.to_string(),
    }
}
