//! # maestro-expert
//!
//! The expert boundary for Maestro orchestration.
//!
//! An "expert" is an interchangeable model-calling target. This crate
//! provides:
//!
//! - The [`Expert`] invocation trait consumed by the orchestrator
//! - [`HttpExpert`], a messages-endpoint HTTP client
//! - [`ExpertRegistry`], mapping expert ids to implementations plus the
//!   static per-expert fallback chains
//! - [`CompletionPromise`] parsing for `<promise>...</promise>` markers
//! - [`MockExpert`] with scripted responses for tests

#![allow(dead_code)]

mod client;
mod promise;
mod types;

pub use client::{Expert, ExpertRegistry, HttpExpert, MockExpert};
pub use promise::CompletionPromise;
pub use types::{ExpertResponse, Usage};
