//! # maestro-core
//!
//! Core types for the Maestro task-delegation orchestration engine.
//!
//! Maestro sits between a tool-calling agent and a set of "expert" model
//! backends. A request is classified, delegated to an expert, and recovered
//! on failure along static fallback chains; a prioritized hook chain can
//! observe, modify, or veto every lifecycle event along the way.
//!
//! This crate holds the vocabulary shared by every other crate:
//!
//! - Intent and complexity classification types
//! - The closed failure taxonomy and recovery actions
//! - The unified error type and `Result` alias
//! - Repository-level configuration (`.maestro/config.toml`)

#![allow(dead_code)]

mod config;
mod error;
mod types;

pub use config::{
    ExpertRoutes, LoopDefaults, MaestroConfig, RetryConfig, WorkflowConfig,
};
pub use error::{MaestroError, Result};
pub use types::*;
