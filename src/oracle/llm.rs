//! LLM-backed decision provider
//!
//! Single chat-completions call per market against an OpenAI-compatible
//! endpoint. The reply is free-form text expected to contain one embedded
//! JSON object; the object is extracted even amid surrounding prose or
//! code fences, then parsed strictly.

use super::{
    DecisionContext, DecisionError, DecisionOutcome, DecisionProvider, ResolutionDecision,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Decision-service client configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API key; read from `ORACLE_API_KEY` when empty
    pub api_key: String,
    /// OpenAI-compatible base URL
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// Request timeout
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 30,
        }
    }
}

impl LlmConfig {
    /// Fill the API key from the environment if the config left it empty
    pub fn with_env_key(mut self) -> Self {
        if self.api_key.is_empty() {
            self.api_key = std::env::var("ORACLE_API_KEY").unwrap_or_default();
        }
        self
    }

    /// Whether real calls can be made
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Chat-completions request
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Strict shape of the verdict object embedded in the reply
#[derive(Debug, Deserialize)]
struct VerdictJson {
    outcome: String,
    #[serde(default)]
    confidence: u8,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    sources: Vec<String>,
}

/// Decision provider backed by a chat-completions endpoint
pub struct LlmDecisionClient {
    config: LlmConfig,
    http: Client,
}

impl LlmDecisionClient {
    /// Create a new client
    pub fn new(config: LlmConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, http }
    }

    /// Build the deterministic resolution prompt for a market.
    ///
    /// Every field is pinned so that the same market and clock always
    /// produce byte-identical prompts.
    fn build_prompt(ctx: &DecisionContext) -> String {
        format!(
            "You are resolving a prediction market. Today's date is {today}.\n\
             \n\
             Question: {question}\n\
             Description: {description}\n\
             Category: {category}\n\
             Trading closed at: {closing}\n\
             \n\
             Determine the factual outcome of this question as of the close. \
             Respond with a single JSON object and nothing else:\n\
             {{\"outcome\": \"yes\" | \"no\" | \"invalid\", \"confidence\": 0-100, \
             \"reasoning\": \"...\", \"sources\": [\"...\"]}}\n\
             \n\
             Use \"invalid\" if the outcome cannot be determined with confidence.",
            today = ctx.now.format("%Y-%m-%d"),
            question = ctx.question,
            description = ctx.description,
            category = ctx.category,
            closing = ctx.closing_time.to_rfc3339(),
        )
    }

    fn parse_reply(raw: &str) -> Result<ResolutionDecision, DecisionError> {
        if raw.trim().is_empty() {
            return Err(DecisionError::EmptyReply);
        }

        let json_str = extract_json_block(raw);
        let verdict: VerdictJson = serde_json::from_str(&json_str)
            .map_err(|e| DecisionError::MalformedReply(e.to_string()))?;

        let outcome = match verdict.outcome.to_ascii_lowercase().as_str() {
            "yes" => DecisionOutcome::Yes,
            "no" => DecisionOutcome::No,
            "invalid" => DecisionOutcome::Invalid,
            other => return Err(DecisionError::DisallowedOutcome(other.to_string())),
        };

        Ok(ResolutionDecision {
            outcome,
            confidence: verdict.confidence.min(100),
            reasoning: verdict.reasoning,
            sources: verdict.sources,
        })
    }
}

#[async_trait]
impl DecisionProvider for LlmDecisionClient {
    async fn decide(&self, ctx: &DecisionContext) -> Result<ResolutionDecision, DecisionError> {
        if !self.config.is_configured() {
            return Err(DecisionError::NotConfigured);
        }

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Self::build_prompt(ctx),
            }],
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.config.base_url);

        tracing::debug!(question = %ctx.question, model = %self.config.model, "Requesting verdict");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DecisionError::Timeout
                } else {
                    DecisionError::Http(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DecisionError::Http(format!("{} - {}", status, body)));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| DecisionError::MalformedReply(e.to_string()))?;

        let content = reply
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or(DecisionError::EmptyReply)?;

        Self::parse_reply(content)
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }
}

/// Extract one JSON object from free-form text.
///
/// Handles ```json fences, bare fences, and raw objects embedded in prose.
fn extract_json_block(raw: &str) -> String {
    let trimmed = raw.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.find("```") {
            return after_fence[..end].trim().to_string();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.find("```") {
            let block = after_fence[..end].trim();
            if block.starts_with('{') {
                return block.to_string();
            }
        }
    }

    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                return trimmed[start..=end].to_string();
            }
        }
    }

    trimmed.to_string()
}
