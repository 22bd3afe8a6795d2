//! OpenAI-compatible chat completions client

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use common::Secret;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::CompletionModel;
use crate::error::{Error, Result};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiChat {
    http: reqwest::Client,
    endpoint: String,
    api_key: Secret<String>,
    model: String,
}

impl OpenAiChat {
    pub fn new(api_base: &str, api_key: Secret<String>, model: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Completion(format!("building HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", api_base.trim_end_matches('/')),
            api_key,
            model,
        })
    }
}

impl CompletionModel for OpenAiChat {
    fn id(&self) -> &str {
        &self.model
    }

    fn complete<'a>(
        &'a self,
        system: &'a str,
        user: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let request = ChatRequest {
                model: &self.model,
                messages: [
                    ChatMessage {
                        role: "system",
                        content: system,
                    },
                    ChatMessage {
                        role: "user",
                        content: user,
                    },
                ],
            };

            debug!(model = self.model, prompt_chars = user.len(), "requesting completion");
            let response = self
                .http
                .post(&self.endpoint)
                .header(AUTHORIZATION, format!("Bearer {}", self.api_key.expose()))
                .json(&request)
                .send()
                .await
                .map_err(|e| Error::Completion(e.without_url().to_string()))?;

            let status = response.status();
            if !status.is_success() {
                warn!(model = self.model, %status, "completion endpoint returned error status");
                return Err(Error::Completion(format!("completion endpoint returned {status}")));
            }

            let body: ChatResponse = response
                .json()
                .await
                .map_err(|e| Error::Completion(format!("invalid completion response: {e}")))?;

            body.choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| Error::Completion("completion response had no content".into()))
        })
    }
}
