use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

use crate::core::config::{Config, StageModels};
use crate::utils::retry::{retry_with_fixed_delay, RetryPolicy};
use crate::utils::text::preview;

/// Every kind of LLM call the pipeline makes. Each stage carries its own
/// sampling settings and picks its model from `StageModels`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Titles,
    Chapter,
    Cta,
    NameMapping,
    Translation,
    CharacterIdentification,
    CharacterDescription,
    ImagePrompt,
}

impl Stage {
    pub fn temperature(self) -> f32 {
        match self {
            Stage::NameMapping => 0.6,
            Stage::CharacterIdentification => 0.2,
            _ => 0.7,
        }
    }

    pub fn max_tokens(self) -> u32 {
        match self {
            Stage::Titles => 500,
            Stage::Chapter => 3000,
            Stage::Cta => 200,
            Stage::NameMapping => 1000,
            Stage::Translation => 4000,
            Stage::CharacterIdentification => 50,
            Stage::CharacterDescription => 600,
            Stage::ImagePrompt => 200,
        }
    }

    pub fn model(self, models: &StageModels) -> &str {
        match self {
            Stage::Titles | Stage::Chapter | Stage::Cta => &models.story,
            Stage::NameMapping => &models.names,
            Stage::Translation => &models.translation,
            Stage::CharacterIdentification | Stage::CharacterDescription => &models.characters,
            Stage::ImagePrompt => &models.image_prompts,
        }
    }
}

/// One chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    pub stage: Stage,
    pub model: &'a str,
    pub system: &'a str,
    pub user: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait LlmClient: Send + Sync + Debug {
    async fn chat(&self, request: &ChatRequest<'_>) -> Result<String>;
}

pub fn create_llm(config: &Config) -> Result<Arc<dyn LlmClient>> {
    match config.llm.provider.as_str() {
        "ollama" => {
            let base_url = config
                .llm
                .base_url
                .as_deref()
                .unwrap_or("http://localhost:11434");
            Ok(Arc::new(OllamaClient::new(base_url)))
        }
        "openai" => {
            let api_key = config
                .llm
                .api_key
                .as_deref()
                .context("OpenAI api_key missing")?;
            Ok(Arc::new(OpenAIClient::new(api_key, config.llm.base_url.as_deref())))
        }
        _ => Err(anyhow!("Unknown LLM provider: {}", config.llm.provider)),
    }
}

// --- Ollama ---
#[derive(Debug)]
struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaMessageResponse,
}

#[derive(Deserialize)]
struct OllamaMessageResponse {
    content: String,
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat(&self, request: &ChatRequest<'_>) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);

        let request_body = OllamaRequest {
            model: request.model.to_string(),
            messages: ChatMessage::pair(request.system, request.user),
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let resp = self.client.post(&url).json(&request_body).send().await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(anyhow!("Ollama API error: {}", error_text));
        }

        let result: OllamaResponse = resp.json().await?;
        Ok(result.message.content)
    }
}

// --- OpenAI ---

#[derive(Debug)]
struct OpenAIClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIClient {
    fn new(api_key: &str, base_url: Option<&str>) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    /// An empty system prompt is left out.
    fn pair(system: &str, user: &str) -> Vec<Self> {
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: user.to_string(),
        });
        messages
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessageResponse,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn chat(&self, request: &ChatRequest<'_>) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let request_body = OpenAIRequest {
            model: request.model.to_string(),
            messages: ChatMessage::pair(request.system, request.user),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            return Err(anyhow!("OpenAI API error: {}", error_text));
        }

        let result: OpenAIResponse = resp.json().await?;
        if let Some(choice) = result.choices.first() {
            if let Some(content) = &choice.message.content {
                return Ok(content.clone());
            }
        }

        Err(anyhow!("OpenAI response empty or missing content"))
    }
}

/// Stage-aware front of an `LlmClient`: resolves the model and sampling
/// settings of a stage and retries failed or empty answers.
#[derive(Debug, Clone)]
pub struct Assistant {
    client: Arc<dyn LlmClient>,
    models: StageModels,
    retry: RetryPolicy,
}

impl Assistant {
    pub fn new(client: Arc<dyn LlmClient>, models: StageModels, retry: RetryPolicy) -> Self {
        Self {
            client,
            models,
            retry,
        }
    }

    pub fn from_config(client: Arc<dyn LlmClient>, config: &Config) -> Self {
        Self::new(client, config.llm.models.clone(), config.llm.retry_policy())
    }

    /// Trimmed, non-empty answer of the model for `stage`.
    pub async fn ask(&self, stage: Stage, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            stage,
            model: stage.model(&self.models),
            system,
            user,
            temperature: stage.temperature(),
            max_tokens: stage.max_tokens(),
        };
        let label = format!("LLM {:?} ({})", stage, request.model);

        let client = &self.client;
        let request = &request;
        let answer = retry_with_fixed_delay(&self.retry, &label, |_| true, move |_| async move {
            let answer = client.chat(request).await?;
            let answer = answer.trim().to_string();
            if answer.is_empty() {
                return Err(anyhow!("empty answer"));
            }
            Ok(answer)
        })
        .await
        .map_err(|failure| {
            failure
                .last_error
                .context(format!("{} failed after {} attempt(s)", label, failure.attempts))
        })?;

        debug!("{} answered: {}", label, preview(&answer, 120));
        Ok(answer)
    }
}
