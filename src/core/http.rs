//! Single-call executor: one chat-completion POST, classified into a closed
//! outcome enum.
//!
//! The executor never touches credential health. Classification is the only
//! thing it decides; what to do about an outcome (backoff, rotation,
//! fallback) stays in the dispatcher so policy is centralized and testable.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::core::pool::{ApiKey, FailureKind};
use crate::error::{AbexError, Result};

// =============================================================================
// Outcomes
// =============================================================================

/// Classified result of one outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// 2xx with a non-empty message body.
    Success(String),
    /// 429.
    RateLimited,
    /// 401 or 403; the credential itself is suspect.
    AuthFailed(u16),
    /// 5xx.
    ServerError(u16),
    /// The request-level timeout elapsed.
    Timeout,
    /// Transport failure or an unexpected status.
    NetworkError(String),
    /// 2xx whose body lacks a usable message.
    MalformedResponse(String),
}

impl CallOutcome {
    /// The health-bookkeeping kind for a failed outcome; `None` on success.
    #[must_use]
    pub const fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success(_) => None,
            Self::RateLimited => Some(FailureKind::RateLimit),
            Self::AuthFailed(_) => Some(FailureKind::AuthError),
            Self::ServerError(_) => Some(FailureKind::ServerError),
            Self::Timeout => Some(FailureKind::Timeout),
            Self::NetworkError(_) => Some(FailureKind::Network),
            Self::MalformedResponse(_) => Some(FailureKind::Malformed),
        }
    }
}

// =============================================================================
// Wire types
// =============================================================================

/// One message in the chat payload.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Chat-completion request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f64,
    response_format: ResponseFormat,
}

impl ChatRequest {
    /// Extraction request: low temperature, JSON-object response format.
    #[must_use]
    pub fn extraction(model: &str, system_prompt: &str, user_prompt: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt.to_string(),
                },
            ],
            max_tokens: 1500,
            temperature: 0.1,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

// =============================================================================
// Execution
// =============================================================================

/// Build the shared HTTP client with the per-call timeout.
///
/// # Errors
///
/// Returns [`AbexError::ClientBuild`] if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("abex/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AbexError::ClientBuild(e.to_string()))
}

/// Perform one chat-completion call and classify the result.
///
/// Never fails: every transport or protocol condition maps to a
/// [`CallOutcome`] variant.
pub async fn execute_chat(
    client: &Client,
    endpoint: &str,
    key: &ApiKey,
    request: &ChatRequest,
) -> CallOutcome {
    trace!(endpoint, model = %request.model, key = %key.id(), "sending chat request");
    let response = match client
        .post(endpoint)
        .bearer_auth(key.secret())
        .json(request)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) if e.is_timeout() => {
            debug!(endpoint, "request timed out");
            return CallOutcome::Timeout;
        }
        Err(e) => {
            debug!(endpoint, error = %e, "transport failure");
            return CallOutcome::NetworkError(e.to_string());
        }
    };

    let status = response.status().as_u16();
    match status {
        429 => CallOutcome::RateLimited,
        401 | 403 => CallOutcome::AuthFailed(status),
        s if s >= 500 => CallOutcome::ServerError(s),
        s if (200..300).contains(&s) => classify_body(response).await,
        s => CallOutcome::NetworkError(format!("unexpected status {s}")),
    }
}

async fn classify_body(response: reqwest::Response) -> CallOutcome {
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) if e.is_timeout() => return CallOutcome::Timeout,
        Err(e) => return CallOutcome::NetworkError(e.to_string()),
    };
    match serde_json::from_str::<ChatResponse>(&body) {
        Ok(parsed) => {
            let content = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message)
                .and_then(|m| m.content);
            match content {
                Some(text) if !text.trim().is_empty() => CallOutcome::Success(text),
                _ => CallOutcome::MalformedResponse("no message content in body".to_string()),
            }
        }
        Err(e) => CallOutcome::MalformedResponse(format!("unparseable body: {e}")),
    }
}

// =============================================================================
// Tests
// =============================================================================
