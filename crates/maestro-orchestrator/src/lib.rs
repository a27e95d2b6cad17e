//! # maestro-orchestrator
//!
//! Orchestration engine for Maestro.
//!
//! This crate provides:
//! - Hook registry with prioritized, veto-capable dispatch
//! - Failure classification, backoff, and escalation reporting
//! - Ralph-style loop engine for autonomous iteration
//! - Phased workflow orchestration with uniform recovery
//! - Request intent and complexity analysis
//! - Session idle detection

#![allow(dead_code)]

mod events;
mod failure;
mod hooks;
mod idle;
mod intent;
mod ralph_loop;
mod workflow;

pub use events::{EventContext, EventType};
pub use failure::{
    EscalationReport, FailureAnalysis, FailureContext, FailureEngine,
};
pub use hooks::{
    DispatchDecision, DispatchOutcome, Hook, HookDecision, HookPriority, HookRegistry, NO_OP,
};
pub use idle::IdleMonitor;
pub use intent::{
    analyze, classify_intent, estimate_complexity, extract_file_references, IntentAnalysis,
};
pub use ralph_loop::{LoopOptions, LoopOutcome, LoopReport, LoopStatus, RalphLoop};
pub use workflow::{
    Orchestrator, WorkflowOutcome, WorkflowPhase, WorkflowReport, WorkflowRequest,
};
