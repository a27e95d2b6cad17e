//! Configuration management for Maestro
//!
//! This module provides configuration structures for repository-level
//! Maestro settings: loop defaults, retry/escalation policy, workflow
//! timeouts, and the expert routing + fallback-chain tables.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::{ExpertId, Result, TaskIntent};

/// Repository-level Maestro configuration
///
/// Loaded from `.maestro/config.toml` in the repo root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaestroConfig {
    /// Retry-loop execution defaults
    #[serde(default)]
    pub loop_defaults: LoopDefaults,

    /// Failure recovery policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Phased workflow settings
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Expert routing and fallback chains
    #[serde(default)]
    pub experts: ExpertRoutes,
}

/// Default retry-loop execution parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopDefaults {
    /// Maximum iterations before the loop is exhausted (clamped to 1..=50)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Marker text expected inside `<promise>...</promise>`
    #[serde(default = "default_completion_promise")]
    pub completion_promise: String,
}

/// Failure recovery policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempt ceiling before escalation
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay for non-rate-limit failures
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Base backoff delay for rate-limit failures
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,

    /// Backoff ceiling
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Uniform jitter applied to computed delays (0.2 = +/-20%)
    #[serde(default = "default_jitter_fraction")]
    pub jitter_fraction: f64,

    /// From this attempt on, prefer switching experts over retrying the
    /// same one
    #[serde(default = "default_switch_after_attempts")]
    pub switch_after_attempts: u32,
}

/// Phased workflow settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Overall wall-clock timeout, checked at phase boundaries
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Skip the exploration phase entirely
    #[serde(default)]
    pub skip_exploration: bool,

    /// Idle countdown before a session-idle event fires
    #[serde(default = "default_idle_countdown_secs")]
    pub idle_countdown_secs: u64,
}

/// Expert routing and fallback chains
///
/// Both tables are external configuration: the orchestration core reads
/// them but never decides their contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertRoutes {
    /// Expert used when no route matches
    #[serde(default = "default_expert")]
    pub default_expert: ExpertId,

    /// Intent name -> expert id
    #[serde(default = "default_intent_routes")]
    pub intent_routes: HashMap<String, ExpertId>,

    /// Expert id -> ordered list of alternates tried on failure
    #[serde(default = "default_fallback_chains")]
    pub fallback_chains: HashMap<ExpertId, Vec<ExpertId>>,
}

// Default value providers
fn default_max_iterations() -> u32 {
    10
}

fn default_completion_promise() -> String {
    "DONE".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_rate_limit_delay_ms() -> u64 {
    5000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_jitter_fraction() -> f64 {
    0.2
}

fn default_switch_after_attempts() -> u32 {
    2
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_idle_countdown_secs() -> u64 {
    120
}

fn default_expert() -> ExpertId {
    "generalist".to_string()
}

fn default_intent_routes() -> HashMap<String, ExpertId> {
    let mut routes = HashMap::new();
    routes.insert("conceptual".to_string(), "reasoner".to_string());
    routes.insert("implementation".to_string(), "coder".to_string());
    routes.insert("debugging".to_string(), "coder".to_string());
    routes.insert("refactoring".to_string(), "coder".to_string());
    routes.insert("research".to_string(), "researcher".to_string());
    routes.insert("review".to_string(), "reviewer".to_string());
    routes.insert("documentation".to_string(), "writer".to_string());
    routes
}

fn default_fallback_chains() -> HashMap<ExpertId, Vec<ExpertId>> {
    let mut chains = HashMap::new();
    chains.insert(
        "coder".to_string(),
        vec!["reasoner".to_string(), "generalist".to_string()],
    );
    chains.insert("reasoner".to_string(), vec!["generalist".to_string()]);
    chains.insert("researcher".to_string(), vec!["generalist".to_string()]);
    chains.insert("reviewer".to_string(), vec!["reasoner".to_string()]);
    chains.insert("writer".to_string(), vec!["generalist".to_string()]);
    chains
}

impl MaestroConfig {
    /// Load configuration from `.maestro/config.toml` or use defaults
    pub fn load_or_default(repo_root: &Path) -> Result<Self> {
        let config_path = repo_root.join(".maestro/config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Ok(toml::from_str(&content).map_err(|e| {
                crate::MaestroError::Config(format!("Failed to parse config file: {}", e))
            })?)
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `.maestro/config.toml`
    pub fn write_default(repo_root: &Path) -> Result<()> {
        let config_dir = repo_root.join(".maestro");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let config = Self::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| crate::MaestroError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Resolve the expert for an intent via the routing table
    pub fn expert_for_intent(&self, intent: TaskIntent) -> ExpertId {
        self.experts
            .intent_routes
            .get(&intent.to_string())
            .cloned()
            .unwrap_or_else(|| self.experts.default_expert.clone())
    }

    /// Fallback chain for an expert (empty if none configured)
    pub fn fallback_chain(&self, expert: &str) -> &[ExpertId] {
        self.experts
            .fallback_chains
            .get(expert)
            .map(|chain| chain.as_slice())
            .unwrap_or(&[])
    }
}

impl Default for MaestroConfig {
    fn default() -> Self {
        Self {
            loop_defaults: LoopDefaults::default(),
            retry: RetryConfig::default(),
            workflow: WorkflowConfig::default(),
            experts: ExpertRoutes::default(),
        }
    }
}

impl Default for LoopDefaults {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            completion_promise: default_completion_promise(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_fraction: default_jitter_fraction(),
            switch_after_attempts: default_switch_after_attempts(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            skip_exploration: false,
            idle_countdown_secs: default_idle_countdown_secs(),
        }
    }
}

impl Default for ExpertRoutes {
    fn default() -> Self {
        Self {
            default_expert: default_expert(),
            intent_routes: default_intent_routes(),
            fallback_chains: default_fallback_chains(),
        }
    }
}
