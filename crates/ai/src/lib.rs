use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod prompts;

pub const FALLBACK_ANSWER: &str = "Desculpe, não consegui processar sua pergunta no momento. \
     Tente novamente em alguns instantes ou reformule sua pergunta.";

#[derive(Debug)]
pub enum AiError {
    Timeout,
    Http(reqwest::Error),
    BadStatus(reqwest::StatusCode),
    EmptyCompletion,
}

impl std::fmt::Display for AiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AiError::Timeout => write!(f, "inference request timed out"),
            AiError::Http(err) => write!(f, "inference HTTP error: {}", err),
            AiError::BadStatus(status) => write!(f, "inference service returned status {}", status),
            AiError::EmptyCompletion => write!(f, "inference service returned no completion"),
        }
    }
}

impl std::error::Error for AiError {}

impl From<reqwest::Error> for AiError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            AiError::Timeout
        } else {
            AiError::Http(value)
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u32,
}

/// What an ask endpoint returns. Failures are folded into the answer itself:
/// the caller always gets a 200-shaped payload, with `metadata.error` set when
/// the fallback text was used.
#[derive(Debug, Clone, Serialize)]
pub struct AiAnswer {
    pub response: String,
    pub metadata: AnswerMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AnswerMetadata {
    Success {
        tokens_used: u32,
        model_used: String,
        response_time_ms: u64,
        timestamp: DateTime<Utc>,
    },
    Failure {
        error: bool,
        timestamp: DateTime<Utc>,
    },
}

impl AiAnswer {
    pub fn fallback() -> Self {
        Self {
            response: FALLBACK_ANSWER.to_string(),
            metadata: AnswerMetadata::Failure {
                error: true,
                timestamp: Utc::now(),
            },
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.metadata, AnswerMetadata::Failure { .. })
    }
}

/// Thin pass-through to a hosted chat-completions endpoint.
#[derive(Clone)]
pub struct AiClient {
    base_url: String,
    token: String,
    model: String,
    http: reqwest::Client,
}

impl AiClient {
    pub fn new(
        base_url: String,
        token: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, AiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AiError::Http)?;

        Ok(Self {
            base_url,
            token,
            model,
            http,
        })
    }

    /// Asks a question against a tenant context snapshot. Never fails: any
    /// upstream problem degrades to the canned fallback answer.
    pub async fn ask(&self, query: &str, context: &serde_json::Value) -> AiAnswer {
        let started = Instant::now();
        let prompt = prompts::contextual_prompt(query, context);

        match self.complete(prompts::SYSTEM_PROMPT, &prompt).await {
            Ok(completion) => AiAnswer {
                response: completion.text,
                metadata: AnswerMetadata::Success {
                    tokens_used: completion.tokens_used,
                    model_used: completion.model,
                    response_time_ms: started.elapsed().as_millis() as u64,
                    timestamp: Utc::now(),
                },
            },
            Err(err) => {
                tracing::warn!(error = %err, "inference request failed, serving fallback");
                AiAnswer::fallback()
            }
        }
    }

    /// Cheap liveness probe against the completions endpoint.
    pub async fn health(&self) -> bool {
        let body = ChatRequest {
            model: self.model.as_str(),
            messages: vec![ChatMessage {
                role: "user",
                content: "health check",
            }],
            temperature: 0.0,
            max_tokens: 10,
            top_p: 1.0,
        };

        match self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn complete(&self, system: &str, user: &str) -> Result<Completion, AiError> {
        let body = ChatRequest {
            model: self.model.as_str(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.7,
            max_tokens: 1000,
            top_p: 0.9,
        };

        let resp = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(AiError::BadStatus(resp.status()));
        }

        let decoded = resp
            .json::<ChatResponse>()
            .await
            .map_err(|_| AiError::EmptyCompletion)?;

        extract_completion(decoded, &self.model)
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

struct Completion {
    text: String,
    tokens_used: u32,
    model: String,
}

fn extract_completion(decoded: ChatResponse, default_model: &str) -> Result<Completion, AiError> {
    let text = decoded
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|t| !t.trim().is_empty())
        .ok_or(AiError::EmptyCompletion)?;

    Ok(Completion {
        text,
        tokens_used: decoded.usage.map(|u| u.total_tokens).unwrap_or(0),
        model: decoded.model.unwrap_or_else(|| default_model.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_is_extracted_from_the_first_choice() {
        let decoded: ChatResponse = serde_json::from_str(
            r#"{
                "choices": [{"message": {"content": "Tudo em dia."}}],
                "usage": {"total_tokens": 42},
                "model": "virtuoso-large"
            }"#,
        )
        .unwrap();

        let completion = extract_completion(decoded, "auto").unwrap();
        assert_eq!(completion.text, "Tudo em dia.");
        assert_eq!(completion.tokens_used, 42);
        assert_eq!(completion.model, "virtuoso-large");
    }

    #[test]
    fn empty_choices_are_an_error() {
        let decoded: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            extract_completion(decoded, "auto"),
            Err(AiError::EmptyCompletion)
        ));
    }

    #[test]
    fn blank_content_is_an_error() {
        let decoded: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": "  "}}]}"#).unwrap();
        assert!(matches!(
            extract_completion(decoded, "auto"),
            Err(AiError::EmptyCompletion)
        ));
    }

    #[test]
    fn fallback_answer_flags_the_error() {
        let answer = AiAnswer::fallback();
        assert!(answer.is_fallback());
        assert_eq!(answer.response, FALLBACK_ANSWER);

        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["metadata"]["error"], serde_json::json!(true));
        assert!(json["metadata"].get("tokens_used").is_none());
    }
}
