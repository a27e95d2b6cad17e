//! Types for expert invocation and API interactions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a single expert invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertResponse {
    /// Raw output text
    pub output: String,
    /// When the response was received
    pub timestamp: DateTime<Utc>,
    /// Token usage, when the backend reports it
    pub usage: Option<Usage>,
}

impl ExpertResponse {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            timestamp: Utc::now(),
            usage: None,
        }
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Wire request for the messages endpoint
#[derive(Debug, Serialize)]
pub(crate) struct ApiRequest {
    pub model: String,
    pub max_tokens: usize,
    pub messages: Vec<ApiMessage>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiMessage {
    pub role: String,
    pub content: String,
}

/// Wire response from the messages endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse {
    pub content: Vec<ApiContent>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiContent {
    pub text: String,
}
