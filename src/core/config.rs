use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::core::error::StoryError;
use crate::core::language::Language;
use crate::utils::retry::RetryPolicy;

pub const CONFIG_FILE: &str = "config.yml";

const PLACEHOLDER_MARKERS: [&str; 2] = ["SUA_CHAVE_", "SEU_ENDPOINT_"];

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_input")]
    pub input_folder: String,

    #[serde(default = "default_output")]
    pub output_folder: String,

    #[serde(default = "default_names")]
    pub names_folder: String,

    /// Target language codes, e.g. `[italiano, polones]`.
    #[serde(default)]
    pub languages: Vec<String>,

    #[serde(default)]
    pub unattended: bool,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub image: ImageApiConfig,

    #[serde(default)]
    pub pacing: PacingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String, // "openai" or "ollama"
    #[serde(default)]
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    #[serde(default = "default_retry_count")]
    pub retry_count: usize,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
    #[serde(default)]
    pub models: StageModels,
}

/// Model identifier per pipeline stage.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageModels {
    #[serde(default = "default_model")]
    pub story: String,
    #[serde(default = "default_model")]
    pub names: String,
    #[serde(default = "default_model")]
    pub translation: String,
    #[serde(default = "default_model")]
    pub characters: String,
    #[serde(default = "default_model")]
    pub image_prompts: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImageApiConfig {
    pub api_key: Option<String>,
    pub endpoint_url: Option<String>,
    #[serde(default = "default_image_model")]
    pub model: String,
    #[serde(default = "default_task_type")]
    pub task_type: String,

    #[serde(default = "default_create_attempts")]
    pub create_attempts: u32,
    #[serde(default = "default_create_delay")]
    pub create_retry_delay_seconds: u64,
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_download_attempts")]
    pub download_attempts: u32,
    #[serde(default = "default_download_delay")]
    pub download_retry_delay_seconds: u64,

    #[serde(default = "default_create_timeout")]
    pub create_timeout_seconds: u64,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_seconds: u64,
    #[serde(default = "default_download_timeout")]
    pub download_timeout_seconds: u64,
}

/// Courtesy waits between external calls.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PacingConfig {
    #[serde(default = "default_chapter_delay")]
    pub chapter_delay_seconds: u64,
    #[serde(default = "default_translation_delay")]
    pub translation_delay_seconds: u64,
    #[serde(default = "default_image_delay")]
    pub image_delay_seconds: u64,
    #[serde(default = "default_summary_delay")]
    pub summary_delay_seconds: u64,
}

/// Validated image API credentials, resolved at submission time.
#[derive(Debug, Clone)]
pub struct ImageCredentials {
    pub api_key: String,
    pub endpoint: url::Url,
}

fn default_input() -> String {
    "resumos".to_string()
}
fn default_output() -> String {
    "resultados_processamento".to_string()
}
fn default_names() -> String {
    "nomes_idiomas".to_string()
}
fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_retry_count() -> usize {
    2
}
fn default_retry_delay() -> u64 {
    10
}
fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_image_model() -> String {
    "midjourney".to_string()
}
fn default_task_type() -> String {
    "imagine".to_string()
}
fn default_create_attempts() -> u32 {
    3
}
fn default_create_delay() -> u64 {
    5
}
fn default_poll_attempts() -> u32 {
    60
}
fn default_poll_interval() -> u64 {
    10
}
fn default_download_attempts() -> u32 {
    3
}
fn default_download_delay() -> u64 {
    5
}
fn default_create_timeout() -> u64 {
    60
}
fn default_poll_timeout() -> u64 {
    30
}
fn default_download_timeout() -> u64 {
    120
}
fn default_chapter_delay() -> u64 {
    3
}
fn default_translation_delay() -> u64 {
    1
}
fn default_image_delay() -> u64 {
    5
}
fn default_summary_delay() -> u64 {
    15
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_folder: default_input(),
            output_folder: default_output(),
            names_folder: default_names(),
            languages: Vec::new(),
            unattended: false,
            llm: LlmConfig::default(),
            image: ImageApiConfig::default(),
            pacing: PacingConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: None,
            base_url: None,
            retry_count: default_retry_count(),
            retry_delay_seconds: default_retry_delay(),
            models: StageModels::default(),
        }
    }
}

impl Default for StageModels {
    fn default() -> Self {
        Self {
            story: default_model(),
            names: default_model(),
            translation: default_model(),
            characters: default_model(),
            image_prompts: default_model(),
        }
    }
}

impl Default for ImageApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint_url: None,
            model: default_image_model(),
            task_type: default_task_type(),
            create_attempts: default_create_attempts(),
            create_retry_delay_seconds: default_create_delay(),
            poll_attempts: default_poll_attempts(),
            poll_interval_seconds: default_poll_interval(),
            download_attempts: default_download_attempts(),
            download_retry_delay_seconds: default_download_delay(),
            create_timeout_seconds: default_create_timeout(),
            poll_timeout_seconds: default_poll_timeout(),
            download_timeout_seconds: default_download_timeout(),
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            chapter_delay_seconds: default_chapter_delay(),
            translation_delay_seconds: default_translation_delay(),
            image_delay_seconds: default_image_delay(),
            summary_delay_seconds: default_summary_delay(),
        }
    }
}

/// True when a configured value is absent, blank or still a template placeholder.
pub fn is_unconfigured(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") => true,
        Some(v) => {
            let upper = v.to_uppercase();
            PLACEHOLDER_MARKERS.iter().any(|marker| upper.contains(marker))
        }
    }
}

impl Config {
    /// Reads `path` (if present), applies environment overrides and validates
    /// the critical settings.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Self::from_yaml(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            warn!(
                "{} not found; settings must come from environment variables",
                path.display()
            );
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Environment variables take precedence over the file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = read("OPENAI_API_KEY") {
            info!("Using OPENAI_API_KEY from environment");
            self.llm.api_key = Some(v);
        }
        if let Some(v) = read("GOAPI_API_KEY") {
            info!("Using GOAPI_API_KEY from environment");
            self.image.api_key = Some(v);
        }
        if let Some(v) = read("GOAPI_ENDPOINT_URL") {
            info!("Using GOAPI_ENDPOINT_URL from environment");
            self.image.endpoint_url = Some(v);
        }

        let models = &mut self.llm.models;
        let overrides: [(&str, &mut String); 5] = [
            ("MODELO_GERACAO_HISTORIA", &mut models.story),
            ("MODELO_SUBSTITUICAO_NOMES", &mut models.names),
            ("MODELO_TRADUCAO", &mut models.translation),
            ("MODELO_DESCRICAO_PERSONAGENS", &mut models.characters),
            ("MODELO_CRIACAO_PROMPTS_IMAGEM", &mut models.image_prompts),
        ];
        for (key, slot) in overrides {
            if let Some(v) = read(key) {
                info!("Using {} from environment", key);
                *slot = v;
            }
        }
    }

    /// Rejects a missing LLM key and unknown language codes; only warns
    /// about the image API, which is re-checked on every submission.
    pub fn validate(&self) -> Result<(), StoryError> {
        if self.llm.provider == "openai" && is_unconfigured(self.llm.api_key.as_deref()) {
            return Err(StoryError::configuration(
                "llm.api_key is missing or a placeholder and OPENAI_API_KEY is not set",
            ));
        }
        if self.image.credentials().is_err() {
            warn!("Image API key or endpoint not configured; image generation will be skipped");
        }
        self.selected_languages()?;
        Ok(())
    }

    pub fn selected_languages(&self) -> Result<Vec<Language>, StoryError> {
        let mut out = Vec::new();
        for code in &self.languages {
            let language: Language = code.parse()?;
            if !out.contains(&language) {
                out.push(language);
            }
        }
        Ok(out)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.output_folder)?;
        fs::create_dir_all(&self.names_folder)?;
        Ok(())
    }
}

impl ImageApiConfig {
    pub fn credentials(&self) -> Result<ImageCredentials, StoryError> {
        if is_unconfigured(self.api_key.as_deref()) {
            return Err(StoryError::configuration(
                "image.api_key is missing or a placeholder (GOAPI_API_KEY)",
            ));
        }
        if is_unconfigured(self.endpoint_url.as_deref()) {
            return Err(StoryError::configuration(
                "image.endpoint_url is missing or a placeholder (GOAPI_ENDPOINT_URL)",
            ));
        }
        let raw = self.endpoint_url.as_deref().unwrap_or_default().trim();
        let endpoint = url::Url::parse(raw).map_err(|e| {
            StoryError::configuration(format!("image.endpoint_url '{}' is invalid: {}", raw, e))
        })?;
        Ok(ImageCredentials {
            api_key: self.api_key.clone().unwrap_or_default(),
            endpoint,
        })
    }

    pub fn create_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.create_attempts, self.create_retry_delay_seconds)
    }

    pub fn poll_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.poll_attempts, self.poll_interval_seconds)
    }

    pub fn download_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.download_attempts, self.download_retry_delay_seconds)
    }
}

impl LlmConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count as u32 + 1, self.retry_delay_seconds)
    }
}

impl PacingConfig {
    pub fn chapter_delay(&self) -> Duration {
        Duration::from_secs(self.chapter_delay_seconds)
    }
    pub fn translation_delay(&self) -> Duration {
        Duration::from_secs(self.translation_delay_seconds)
    }
    pub fn image_delay(&self) -> Duration {
        Duration::from_secs(self.image_delay_seconds)
    }
    pub fn summary_delay(&self) -> Duration {
        Duration::from_secs(self.summary_delay_seconds)
    }
}
