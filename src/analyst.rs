//! HTTP enrichment client: an OpenAI-compatible chat-completions
//! endpoint acting as the venture analyst.
//!
//! The wire contract is deliberately thin — one submission in, one memo
//! out. The model is asked for bare JSON, but responses wrapped in
//! markdown fences or prose are tolerated: the JSON object is extracted
//! before parsing.

use std::time::Duration;

use log::debug;
use serde::Deserialize;

use crate::config::AnalystConfig;
use crate::enrich::EnrichmentService;
use crate::error::EnrichError;
use crate::types::{Memo, Submission, DIMENSION_KEYS};

pub struct HttpAnalyst {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
}

impl HttpAnalyst {
    /// Build a client from config. The API key comes from the
    /// environment variable the config names; a missing key fails here,
    /// before any submission is attempted.
    pub fn new(config: &AnalystConfig) -> Result<Self, EnrichError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| EnrichError::MissingApiKey(config.api_key_env.clone()))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EnrichError::Transport(e.to_string()))?;

        Ok(HttpAnalyst {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
        })
    }
}

impl EnrichmentService for HttpAnalyst {
    fn analyze(&self, submission: &Submission) -> Result<Memo, EnrichError> {
        debug!("requesting analysis for {}", submission.company_name);

        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0.1,
            "max_tokens": self.max_tokens,
            "messages": [{"role": "user", "content": build_prompt(submission)}],
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| EnrichError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().unwrap_or_default();
            return Err(EnrichError::Api { status: status.as_u16(), message });
        }

        let completion: ChatResponse = resp
            .json()
            .map_err(|e| EnrichError::InvalidResponse(e.to_string()))?;

        let content = completion
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| EnrichError::InvalidResponse("no choices in response".to_string()))?;

        memo_from_completion(content)
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

/// Parse a completion into a memo: strip fences/prose, then deserialize.
pub fn memo_from_completion(content: &str) -> Result<Memo, EnrichError> {
    let json = extract_json(content)
        .ok_or_else(|| EnrichError::InvalidResponse("no JSON object in completion".to_string()))?;

    serde_json::from_str(json).map_err(|e| EnrichError::InvalidResponse(e.to_string()))
}

/// Pull the JSON object out of a completion that may wrap it in markdown
/// fences or surrounding prose.
fn extract_json(content: &str) -> Option<&str> {
    let inner = if let Some((_, rest)) = content.split_once("```json") {
        rest.split_once("```").map(|(body, _)| body)?
    } else if let Some((_, rest)) = content.split_once("```") {
        rest.split_once("```").map(|(body, _)| body)?
    } else {
        content
    };

    let start = inner.find('{')?;
    let end = inner.rfind('}')?;
    if end < start {
        return None;
    }
    Some(inner[start..=end].trim())
}

/// One prompt per submission: the application row plus the required
/// output schema.
fn build_prompt(submission: &Submission) -> String {
    let mut application = String::new();
    application.push_str(&format!("Company: {}\n", submission.company_name));
    if !submission.submitted_at.is_empty() {
        application.push_str(&format!("Submitted At: {}\n", submission.submitted_at));
    }
    for (field, value) in &submission.raw_fields {
        application.push_str(&format!("{}: {}\n", field, value));
    }

    format!(
        "You are a venture capital analyst evaluating an accelerator application. \
Analyze the application below and return ONLY a JSON object — no markdown, no \
explanatory text.\n\n\
The object must contain: \"company_name\" (echo it exactly), optional header \
fields (\"website\", \"year_founded\", \"description\", \"problem_statement\", \
\"pitch_deck_link\", \"demo_link\"), one object per dimension for each of \
{dims}, and \"final_recommendation\".\n\
Each dimension object needs an integer \"score\" from 1 to 5 and a \
\"justification\" string with concrete, evidence-based reasoning; add nested \
detail sections where useful. \"final_recommendation\" needs \"status\" \
(\"Advance\", \"Hold\", or \"Pass\"), \"rationale\", \"key_factors\", and \
\"next_steps\".\n\
Never emit placeholder text.\n\n\
APPLICATION:\n{application}",
        dims = DIMENSION_KEYS.join(", "),
        application = application,
    )
}
