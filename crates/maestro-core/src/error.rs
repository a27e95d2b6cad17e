//! Unified error types for Maestro

use thiserror::Error;

/// Unified error type for all Maestro operations
#[derive(Error, Debug)]
pub enum MaestroError {
    // Expert errors
    #[error("Expert error: {0}")]
    Expert(String),

    #[error("Expert not found: {0}")]
    ExpertNotFound(String),

    #[error("Expert API error {status}: {body}")]
    ExpertApi { status: u16, body: String },

    #[error("Missing credentials: {0}")]
    Auth(String),

    // Hook errors
    #[error("Hook error: {0}")]
    Hook(String),

    // Loop errors
    #[error("Loop already active for task: {0}")]
    LoopActive(String),

    #[error("Loop error: {0}")]
    Loop(String),

    // Workflow errors
    #[error("Workflow error: {0}")]
    Workflow(String),

    #[error("Phase error: {0}")]
    Phase(String),

    #[error("Workflow timed out after {0}s")]
    WorkflowTimeout(u64),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using MaestroError
pub type Result<T> = std::result::Result<T, MaestroError>;
