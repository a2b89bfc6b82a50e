use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::OracleConfig;
use crate::prompts;

const BACKOFF_BASE_SECS: f64 = 1.0;
const BACKOFF_CAP_SECS: f64 = 30.0;

/// The five judgment roles. They share one transport; only the system framing
/// differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Intake,
    Coarse,
    Fine,
    Synthesis,
    Verification,
}

impl Stage {
    pub fn system_prompt(self) -> &'static str {
        match self {
            Stage::Intake => prompts::INTAKE_SYSTEM,
            Stage::Coarse => prompts::COARSE_SYSTEM,
            Stage::Fine => prompts::FINE_SYSTEM,
            Stage::Synthesis => prompts::SYNTHESIS_SYSTEM,
            Stage::Verification => prompts::VERIFICATION_SYSTEM,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Stage::Intake => "intake",
            Stage::Coarse => "coarse",
            Stage::Fine => "fine",
            Stage::Synthesis => "synthesis",
            Stage::Verification => "verification",
        }
    }
}

/// Failure after the client's own retries are exhausted. Callers treat this
/// the same as an unparseable response: the affected item is excluded, the
/// batch continues.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("oracle transport failure: {0}")]
    Transport(String),
    #[error("oracle returned status {status}: {message}")]
    Api { status: u16, message: String },
}

/// The external semantic-classification capability. Must tolerate many
/// concurrent in-flight calls.
#[async_trait]
pub trait JudgmentOracle: Send + Sync {
    async fn judge(&self, stage: Stage, prompt: &str) -> Result<String, OracleError>;
}

/// Judgment client for any OpenAI-compatible chat completions endpoint. One
/// concrete type for all roles; the stage picks the system prompt.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    config: OracleConfig,
}

impl OpenAiClient {
    pub fn new(config: OracleConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn chat_completion(&self, stage: Stage, prompt: &str) -> Result<String, OracleError> {
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct ChatReq<'a> {
            model: &'a str,
            messages: Vec<Message<'a>>,
            max_tokens: usize,
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: String,
        }

        #[derive(Deserialize)]
        struct ChatChoice {
            message: ChoiceMessage,
        }

        #[derive(Deserialize)]
        struct ChatResp {
            choices: Vec<ChatChoice>,
        }

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&ChatReq {
                model: &self.config.model,
                messages: vec![
                    Message {
                        role: "system",
                        content: stage.system_prompt(),
                    },
                    Message {
                        role: "user",
                        content: prompt,
                    },
                ],
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            })
            .send()
            .await
            .map_err(|err| OracleError::Transport(err.to_string()))?;

        if response.status() != StatusCode::OK {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Api {
                status,
                message: normalize_err_body(&body),
            });
        }

        let decoded = response.json::<ChatResp>().await.map_err(|err| OracleError::Api {
            status: 200,
            message: format!("undecodable completion payload: {err}"),
        })?;

        let content = decoded
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl JudgmentOracle for OpenAiClient {
    async fn judge(&self, stage: Stage, prompt: &str) -> Result<String, OracleError> {
        let mut last_err = None;
        for attempt in 0..self.config.max_attempts {
            match self.chat_completion(stage, prompt).await {
                Ok(content) => return Ok(content),
                Err(err) => {
                    let transient = matches!(err, OracleError::Transport(_));
                    if !transient || attempt + 1 == self.config.max_attempts {
                        return Err(err);
                    }

                    let delay = backoff_delay(attempt);
                    tracing::warn!(
                        stage = stage.as_str(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying oracle call after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    last_err = Some(err);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| OracleError::Transport("all attempts exhausted".to_string())))
    }
}

/// Uniformly random delay in [0, min(cap, base * 2^attempt)).
fn backoff_delay(attempt: usize) -> Duration {
    let ceiling = (BACKOFF_BASE_SECS * 2f64.powi(attempt as i32)).min(BACKOFF_CAP_SECS);
    let secs = rand::thread_rng().gen_range(0.0..ceiling.max(f64::EPSILON));
    Duration::from_secs_f64(secs)
}

fn normalize_err_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(message) = json
            .get("error")
            .and_then(|err| err.get("message"))
            .and_then(|msg| msg.as_str())
        {
            return message.to_string();
        }
        if let Some(err) = json.get("error").and_then(|v| v.as_str()) {
            return err.to_string();
        }
    }

    trimmed.to_string()
}
