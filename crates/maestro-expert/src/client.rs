//! Expert invocation trait, HTTP client, and registry
//!
//! Key design: experts are stateless targets. Recovery (retry, switch,
//! escalate) is the failure engine's job, so [`HttpExpert`] performs no
//! transport-level retry of its own; rate limits and server errors are
//! surfaced as classifiable error text instead.

use crate::types::{ApiMessage, ApiRequest, ApiResponse, ExpertResponse};
use async_trait::async_trait;
use chrono::Utc;
use maestro_core::{ExpertId, MaestroError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: usize = 16000;
const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// An interchangeable model-calling target
#[async_trait]
pub trait Expert: Send + Sync {
    /// Stable identifier used by routing and fallback chains
    fn id(&self) -> &str;

    /// Invoke the expert with a prompt
    async fn invoke(&self, prompt: &str) -> Result<ExpertResponse>;
}

/// HTTP-backed expert talking to a messages endpoint
#[derive(Debug, Clone)]
pub struct HttpExpert {
    id: ExpertId,
    endpoint: String,
    model: String,
    api_key_env: String,
    max_tokens: usize,
}

impl HttpExpert {
    /// Create an expert for a model, with default endpoint settings
    pub fn new(id: impl Into<ExpertId>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: model.into(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_api_key_env(mut self, env_var: impl Into<String>) -> Self {
        self.api_key_env = env_var.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).map_err(|_| {
            MaestroError::Auth(format!(
                "environment variable {} is not set",
                self.api_key_env
            ))
        })
    }
}

#[async_trait]
impl Expert for HttpExpert {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, prompt: &str) -> Result<ExpertResponse> {
        tracing::debug!("Invoking expert {} (model {})", self.id, self.model);

        let api_key = self.api_key()?;

        let request = ApiRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![ApiMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let client = reqwest::Client::new();
        let response = client
            .post(&self.endpoint)
            .header("x-api-key", &api_key)
            .header("anthropic-version", DEFAULT_API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| MaestroError::Expert(format!("Failed to send request: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());

            // No retry here: the failure engine owns recovery. Status code
            // and body go into the error text so classification can match
            // them (429 -> rate_limit, 5xx -> model_error, ...).
            return Err(MaestroError::ExpertApi {
                status: status.as_u16(),
                body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| MaestroError::Expert(format!("Failed to parse response: {}", e)))?;

        let output = api_response
            .content
            .first()
            .ok_or_else(|| MaestroError::Expert("empty response from expert".to_string()))?
            .text
            .clone();

        tracing::info!(
            "Expert {} responded ({} chars)",
            self.id,
            output.len()
        );

        Ok(ExpertResponse {
            output,
            timestamp: Utc::now(),
            usage: api_response.usage,
        })
    }
}

/// Registry mapping expert ids to implementations, plus the static
/// per-expert fallback chains
///
/// The chain table is external configuration: the registry stores it and
/// answers lookups, but never decides its contents.
#[derive(Default)]
pub struct ExpertRegistry {
    experts: HashMap<ExpertId, Arc<dyn Expert>>,
    fallback_chains: HashMap<ExpertId, Vec<ExpertId>>,
}

impl ExpertRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an expert under its own id
    pub fn register(&mut self, expert: Arc<dyn Expert>) {
        self.experts.insert(expert.id().to_string(), expert);
    }

    /// Install the fallback-chain table
    pub fn with_chains(mut self, chains: HashMap<ExpertId, Vec<ExpertId>>) -> Self {
        self.fallback_chains = chains;
        self
    }

    /// Set the fallback chain for one expert
    pub fn set_chain(&mut self, expert: impl Into<ExpertId>, chain: Vec<ExpertId>) {
        self.fallback_chains.insert(expert.into(), chain);
    }

    /// Look up an expert by id
    pub fn get(&self, id: &str) -> Result<Arc<dyn Expert>> {
        self.experts
            .get(id)
            .cloned()
            .ok_or_else(|| MaestroError::ExpertNotFound(id.to_string()))
    }

    /// Fallback chain for an expert (empty if none configured)
    pub fn fallback_chain(&self, id: &str) -> &[ExpertId] {
        self.fallback_chains
            .get(id)
            .map(|chain| chain.as_slice())
            .unwrap_or(&[])
    }

    /// First registered fallback for `id` that is not in `tried`
    pub fn next_fallback(&self, id: &str, tried: &[ExpertId]) -> Option<ExpertId> {
        self.fallback_chain(id)
            .iter()
            .find(|candidate| {
                !tried.contains(candidate) && self.experts.contains_key(candidate.as_str())
            })
            .cloned()
    }

    /// Registered expert ids
    pub fn ids(&self) -> Vec<ExpertId> {
        self.experts.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.experts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experts.is_empty()
    }
}

/// A scripted expert for tests
///
/// Responses are consumed in order; once the script is exhausted, the
/// default output is returned. Invocation prompts are recorded for
/// assertions.
pub struct MockExpert {
    id: ExpertId,
    script: Mutex<VecDeque<std::result::Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
    default_output: String,
}

impl MockExpert {
    pub fn new(id: impl Into<ExpertId>) -> Self {
        Self {
            id: id.into(),
            script: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            default_output: "ok".to_string(),
        }
    }

    /// Queue a successful response
    pub fn with_response(self, output: impl Into<String>) -> Self {
        self.script.lock().unwrap().push_back(Ok(output.into()));
        self
    }

    /// Queue an error response
    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.script.lock().unwrap().push_back(Err(message.into()));
        self
    }

    /// Output returned once the script is exhausted
    pub fn with_default_output(mut self, output: impl Into<String>) -> Self {
        self.default_output = output.into();
        self
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of invocations so far
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Expert for MockExpert {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, prompt: &str) -> Result<ExpertResponse> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(output)) => Ok(ExpertResponse::new(output)),
            Some(Err(message)) => Err(MaestroError::Expert(message)),
            None => Ok(ExpertResponse::new(self.default_output.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_expert_script_order() {
        let expert = MockExpert::new("mock")
            .with_response("first")
            .with_error("boom")
            .with_response("third");

        assert_eq!(expert.invoke("a").await.unwrap().output, "first");
        assert!(expert.invoke("b").await.is_err());
        assert_eq!(expert.invoke("c").await.unwrap().output, "third");
        // Script exhausted - default output
        assert_eq!(expert.invoke("d").await.unwrap().output, "ok");
        assert_eq!(expert.call_count(), 4);
    }

    #[tokio::test]
    async fn test_mock_expert_records_prompts() {
        let expert = MockExpert::new("mock");
        expert.invoke("hello").await.unwrap();
        expert.invoke("world").await.unwrap();
        assert_eq!(expert.prompts(), vec!["hello", "world"]);
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = ExpertRegistry::new();
        registry.register(Arc::new(MockExpert::new("coder")));

        assert!(registry.get("coder").is_ok());
        assert!(matches!(
            registry.get("missing"),
            Err(MaestroError::ExpertNotFound(_))
        ));
    }

    #[test]
    fn test_next_fallback_skips_tried() {
        let mut registry = ExpertRegistry::new();
        registry.register(Arc::new(MockExpert::new("coder")));
        registry.register(Arc::new(MockExpert::new("reasoner")));
        registry.register(Arc::new(MockExpert::new("generalist")));
        registry.set_chain(
            "coder",
            vec!["reasoner".to_string(), "generalist".to_string()],
        );

        let next = registry.next_fallback("coder", &["coder".to_string()]);
        assert_eq!(next, Some("reasoner".to_string()));

        let next = registry.next_fallback(
            "coder",
            &["coder".to_string(), "reasoner".to_string()],
        );
        assert_eq!(next, Some("generalist".to_string()));

        let next = registry.next_fallback(
            "coder",
            &[
                "coder".to_string(),
                "reasoner".to_string(),
                "generalist".to_string(),
            ],
        );
        assert_eq!(next, None);
    }

    #[test]
    fn test_next_fallback_skips_unregistered() {
        let mut registry = ExpertRegistry::new();
        registry.register(Arc::new(MockExpert::new("coder")));
        registry.register(Arc::new(MockExpert::new("generalist")));
        // "reasoner" is in the chain but never registered
        registry.set_chain(
            "coder",
            vec!["reasoner".to_string(), "generalist".to_string()],
        );

        let next = registry.next_fallback("coder", &["coder".to_string()]);
        assert_eq!(next, Some("generalist".to_string()));
    }

    #[tokio::test]
    async fn test_http_expert_missing_key() {
        std::env::remove_var("MAESTRO_TEST_MISSING_KEY");
        let expert =
            HttpExpert::new("coder", "test-model").with_api_key_env("MAESTRO_TEST_MISSING_KEY");
        let result = expert.invoke("test prompt").await;
        assert!(matches!(result, Err(MaestroError::Auth(_))));
    }

    #[test]
    fn test_http_expert_builder() {
        let expert = HttpExpert::new("coder", "test-model")
            .with_max_tokens(8000)
            .with_endpoint("http://localhost:9999/v1/messages");
        assert_eq!(expert.id(), "coder");
        assert_eq!(expert.max_tokens, 8000);
    }
}
