//! Remote Task Client for GoAPI-style asynchronous image generation:
//! create a task, poll it to a terminal state, then hand the result URLs back
//! or save them through the `ResultFetcher`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::core::config::{ImageApiConfig, ImageCredentials};
use crate::core::error::{StoryError, StoryErrorKind};
use crate::core::io::Storage;
use crate::services::fetcher::{ImageTarget, ResultFetcher, SavedImage};
use crate::utils::retry::retry_with_fixed_delay;
use crate::utils::text::preview;

const SUCCESS_CODE: i64 = 200;
const INVALID_PROMPT_CODE: i64 = 10000;
const INVALID_PROMPT_MESSAGE: &str = "failed to check prompt";

const DOWNLOAD_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36";
const DOWNLOAD_ACCEPT: &str = "image/avif,image/webp,image/apng,image/*,*/*;q=0.8";
const DOWNLOAD_REFERER: &str = "https://www.midjourney.com/app/";

#[derive(Debug, Serialize)]
pub struct CreateTaskRequest<'a> {
    pub model: &'a str,
    pub task_type: &'a str,
    pub input: TaskInput<'a>,
}

#[derive(Debug, Serialize)]
pub struct TaskInput<'a> {
    pub prompt: &'a str,
}

/// `{code, data, message}` wrapper of every API answer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub data: Option<TaskData>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskData {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub output: Option<TaskOutput>,
    #[serde(default)]
    pub error: Option<TaskErrorInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskOutput {
    #[serde(default)]
    pub temporary_image_urls: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub image_urls: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskErrorInfo {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiEnvelope {
    fn is_success(&self) -> bool {
        self.code == Some(SUCCESS_CODE)
    }

    fn task_id(&self) -> Option<&str> {
        if !self.is_success() {
            return None;
        }
        self.data
            .as_ref()?
            .task_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    fn error_message(&self) -> String {
        self.data
            .as_ref()
            .and_then(|d| d.error.as_ref())
            .and_then(|e| e.message.clone())
            .filter(|m| !m.is_empty())
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "unknown error".to_string())
    }

    /// GoAPI rejects some prompts with error code 10000.
    fn is_invalid_prompt(&self) -> bool {
        if self.is_success() {
            return false;
        }
        self.data
            .as_ref()
            .and_then(|d| d.error.as_ref())
            .map(|e| {
                e.code == Some(INVALID_PROMPT_CODE)
                    && e.message
                        .as_deref()
                        .unwrap_or_default()
                        .to_lowercase()
                        .contains(INVALID_PROMPT_MESSAGE)
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Staged,
    Unknown(String),
}

impl TaskStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "pending" => TaskStatus::Pending,
            "processing" => TaskStatus::Processing,
            "completed" => TaskStatus::Completed,
            "failed" => TaskStatus::Failed,
            "staged" => TaskStatus::Staged,
            _ => TaskStatus::Unknown(raw.to_string()),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => f.write_str("pending"),
            TaskStatus::Processing => f.write_str("processing"),
            TaskStatus::Completed => f.write_str("completed"),
            TaskStatus::Failed => f.write_str("failed"),
            TaskStatus::Staged => f.write_str("staged"),
            TaskStatus::Unknown(raw) => write!(f, "unknown '{}'", raw),
        }
    }
}

/// Result URLs of a completed task: `temporary_image_urls`, then
/// `image_urls`, then the single `image_url`.
pub fn extract_urls(output: &TaskOutput) -> Vec<String> {
    fn clean(list: &Option<Vec<Option<String>>>) -> Vec<String> {
        list.iter()
            .flatten()
            .flatten()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect()
    }

    let primary = clean(&output.temporary_image_urls);
    if !primary.is_empty() {
        return primary;
    }
    let fallback = clean(&output.image_urls);
    if !fallback.is_empty() {
        return fallback;
    }
    output
        .image_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(|u| vec![u.to_string()])
        .unwrap_or_default()
}

/// Why a poll did not produce URLs.
#[derive(Debug)]
pub enum PollStep {
    /// Not finished yet, or the status could not be read. Poll again.
    KeepWaiting(String),
    /// Terminal. No further polls.
    Stop(StoryErrorKind),
}

impl fmt::Display for PollStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollStep::KeepWaiting(why) => write!(f, "{}", why),
            PollStep::Stop(kind) => write!(f, "{}", kind),
        }
    }
}

/// Transition function of the polling state machine.
pub fn classify(task_id: &str, envelope: &ApiEnvelope) -> Result<Vec<String>, PollStep> {
    let data = match (&envelope.data, envelope.is_success()) {
        (Some(data), true) => data,
        _ => {
            return Err(PollStep::KeepWaiting(format!(
                "no task data (code {:?})",
                envelope.code
            )))
        }
    };

    let status = TaskStatus::parse(data.status.as_deref().unwrap_or_default());
    match status {
        TaskStatus::Pending | TaskStatus::Processing => {
            Err(PollStep::KeepWaiting(format!("task is {}", status)))
        }
        TaskStatus::Completed => {
            let urls = data.output.as_ref().map(extract_urls).unwrap_or_default();
            if urls.is_empty() {
                Err(PollStep::Stop(StoryErrorKind::NoResultsFound {
                    task_id: task_id.to_string(),
                }))
            } else {
                Ok(urls)
            }
        }
        TaskStatus::Failed | TaskStatus::Staged => {
            Err(PollStep::Stop(StoryErrorKind::RemoteTaskFailed {
                task_id: task_id.to_string(),
                status: status.to_string(),
                message: envelope.error_message(),
            }))
        }
        TaskStatus::Unknown(raw) => Err(PollStep::Stop(StoryErrorKind::RemoteTaskFailed {
            task_id: task_id.to_string(),
            status: raw,
            message: "unrecognized task status".to_string(),
        })),
    }
}

/// HTTP boundary of the image service.
#[async_trait]
pub trait ImageApi: Send + Sync {
    async fn create_task(
        &self,
        credentials: &ImageCredentials,
        request: &CreateTaskRequest<'_>,
    ) -> Result<ApiEnvelope>;

    async fn fetch_task(&self, credentials: &ImageCredentials, task_id: &str) -> Result<ApiEnvelope>;

    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct GoApiClient {
    client: reqwest::Client,
    create_timeout: Duration,
    poll_timeout: Duration,
    download_timeout: Duration,
}

impl GoApiClient {
    pub fn new(config: &ImageApiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            create_timeout: Duration::from_secs(config.create_timeout_seconds),
            poll_timeout: Duration::from_secs(config.poll_timeout_seconds),
            download_timeout: Duration::from_secs(config.download_timeout_seconds),
        }
    }

    fn task_url(endpoint: &url::Url, task_id: &str) -> String {
        format!("{}/{}", endpoint.as_str().trim_end_matches('/'), task_id)
    }
}

#[async_trait]
impl ImageApi for GoApiClient {
    async fn create_task(
        &self,
        credentials: &ImageCredentials,
        request: &CreateTaskRequest<'_>,
    ) -> Result<ApiEnvelope> {
        let resp = self
            .client
            .post(credentials.endpoint.clone())
            .header("X-API-Key", &credentials.api_key)
            .timeout(self.create_timeout)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        // Error answers may still carry a parseable envelope (invalid prompts).
        match serde_json::from_str::<ApiEnvelope>(&body) {
            Ok(envelope) => Ok(envelope),
            Err(e) if status.is_success() => {
                Err(anyhow!("Invalid task creation answer: {}. Body: {}", e, body))
            }
            Err(_) => Err(anyhow!("Image API error {}: {}", status, body)),
        }
    }

    async fn fetch_task(&self, credentials: &ImageCredentials, task_id: &str) -> Result<ApiEnvelope> {
        let resp = self
            .client
            .get(Self::task_url(&credentials.endpoint, task_id))
            .header("X-API-Key", &credentials.api_key)
            .timeout(self.poll_timeout)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await?;
            return Err(anyhow!("Image API error {}: {}", status, error_text));
        }
        Ok(resp.json().await?)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, DOWNLOAD_USER_AGENT)
            .header(reqwest::header::ACCEPT, DOWNLOAD_ACCEPT)
            .header(reqwest::header::REFERER, DOWNLOAD_REFERER)
            .timeout(self.download_timeout)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?
            .error_for_status()?;

        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        Ok(bytes)
    }
}

/// What to do with the URLs of a completed task.
#[derive(Debug, Clone)]
pub enum DeliveryMode {
    /// Return the URLs without saving anything.
    UrlsOnly,
    /// Save every URL as a grid file derived from the target.
    Download(ImageTarget),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Urls(Vec<String>),
    Saved(Vec<SavedImage>),
}

pub struct TaskClient<'a> {
    api: &'a dyn ImageApi,
    config: &'a ImageApiConfig,
    storage: &'a dyn Storage,
}

impl<'a> TaskClient<'a> {
    pub fn new(api: &'a dyn ImageApi, config: &'a ImageApiConfig, storage: &'a dyn Storage) -> Self {
        Self {
            api,
            config,
            storage,
        }
    }

    /// Creates a task for `prompt`, waits for it and delivers its results.
    /// Credentials are resolved on every call.
    pub async fn submit_and_await(
        &self,
        prompt: &str,
        mode: DeliveryMode,
    ) -> Result<TaskOutcome, StoryError> {
        let credentials = self.config.credentials()?;
        if prompt.trim().is_empty() {
            return Err(StoryError::new(StoryErrorKind::TaskCreationFailed {
                attempts: 0,
                detail: "empty prompt".to_string(),
            }));
        }
        info!("Submitting image task: {}", preview(prompt, 100));

        let task_id = self.create(&credentials, prompt).await?;
        let urls = self.poll(&credentials, &task_id).await?;
        info!("Task {} completed with {} URL(s)", task_id, urls.len());

        match mode {
            DeliveryMode::UrlsOnly => Ok(TaskOutcome::Urls(urls)),
            DeliveryMode::Download(target) => {
                let fetcher = ResultFetcher::new(self.api, self.storage, self.config.download_policy());
                Ok(TaskOutcome::Saved(fetcher.fetch_all(&urls, &target).await))
            }
        }
    }

    async fn create(&self, credentials: &ImageCredentials, prompt: &str) -> Result<String, StoryError> {
        let request = CreateTaskRequest {
            model: &self.config.model,
            task_type: &self.config.task_type,
            input: TaskInput { prompt },
        };
        let request = &request;
        let api = self.api;

        let result = retry_with_fixed_delay(
            &self.config.create_policy(),
            "Image task creation",
            |_| true,
            move |attempt| async move {
                let envelope = match api.create_task(credentials, request).await {
                    Ok(envelope) => envelope,
                    Err(e) => return Err(format!("request failed: {:#}", e)),
                };
                if let Some(task_id) = envelope.task_id() {
                    return Ok(task_id.to_string());
                }
                if envelope.is_invalid_prompt() {
                    error!(
                        "Prompt rejected by the image service (attempt {}): {}\nPrompt: {}",
                        attempt,
                        envelope.error_message(),
                        prompt
                    );
                    return Err(format!(
                        "prompt rejected ({}); prompt: {}",
                        envelope.error_message(),
                        prompt
                    ));
                }
                Err(format!(
                    "no task_id in answer (code {:?}: {})",
                    envelope.code,
                    envelope.error_message()
                ))
            },
        )
        .await;

        match result {
            Ok(task_id) => {
                info!("Task created: {}", task_id);
                Ok(task_id)
            }
            Err(failure) => {
                error!(
                    "Task creation failed after {} attempt(s): {}",
                    failure.attempts, failure.last_error
                );
                Err(StoryError::new(StoryErrorKind::TaskCreationFailed {
                    attempts: failure.attempts,
                    detail: failure.last_error,
                }))
            }
        }
    }

    async fn poll(&self, credentials: &ImageCredentials, task_id: &str) -> Result<Vec<String>, StoryError> {
        let api = self.api;
        let label = format!("Polling task {}", task_id);

        let result = retry_with_fixed_delay(
            &self.config.poll_policy(),
            &label,
            |step| matches!(step, PollStep::KeepWaiting(_)),
            move |attempt| async move {
                match api.fetch_task(credentials, task_id).await {
                    Ok(envelope) => {
                        let step = classify(task_id, &envelope);
                        if let Err(PollStep::KeepWaiting(why)) = &step {
                            debug!("Task {} poll {}: {}", task_id, attempt, why);
                        }
                        step
                    }
                    Err(e) => {
                        warn!("Task {} poll {} failed: {:#}", task_id, attempt, e);
                        Err(PollStep::KeepWaiting(format!("request failed: {:#}", e)))
                    }
                }
            },
        )
        .await;

        result.map_err(|failure| {
            let kind = match failure.last_error {
                PollStep::Stop(kind) => kind,
                PollStep::KeepWaiting(_) => StoryErrorKind::PollingExhausted {
                    task_id: task_id.to_string(),
                    attempts: failure.attempts,
                },
            };
            error!("{}", kind);
            StoryError::new(kind)
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::io::NativeStorage;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    pub(crate) fn envelope(json: &str) -> ApiEnvelope {
        serde_json::from_str(json).unwrap()
    }

    pub(crate) fn completed(urls: &[&str]) -> ApiEnvelope {
        envelope(&format!(
            r#"{{"code": 200, "data": {{"task_id": "t", "status": "completed", "output": {{"temporary_image_urls": {}}}}}}}"#,
            serde_json::to_string(urls).unwrap()
        ))
    }

    pub(crate) fn status(status: &str) -> ApiEnvelope {
        envelope(&format!(
            r#"{{"code": 200, "data": {{"task_id": "t", "status": "{}"}}}}"#,
            status
        ))
    }

    /// Scripted image service. Unscripted creations succeed with a fresh id,
    /// unscripted polls answer `poll_default`, unscripted downloads succeed.
    #[derive(Default)]
    pub(crate) struct MockImageApi {
        pub create_responses: Mutex<VecDeque<Result<ApiEnvelope>>>,
        pub poll_responses: Mutex<VecDeque<Result<ApiEnvelope>>>,
        pub poll_default: Option<ApiEnvelope>,
        pub downloads: Mutex<HashMap<String, VecDeque<Result<Vec<u8>>>>>,
        pub prompts: Mutex<Vec<String>>,
        pub poll_count: Mutex<usize>,
        pub download_calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageApi for MockImageApi {
        async fn create_task(
            &self,
            _credentials: &ImageCredentials,
            request: &CreateTaskRequest<'_>,
        ) -> Result<ApiEnvelope> {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(request.input.prompt.to_string());
            let id = prompts.len();
            self.create_responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(envelope(&format!(
                        r#"{{"code": 200, "data": {{"task_id": "task-{}"}}}}"#,
                        id
                    )))
                })
        }

        async fn fetch_task(&self, _credentials: &ImageCredentials, _task_id: &str) -> Result<ApiEnvelope> {
            *self.poll_count.lock().unwrap() += 1;
            match self.poll_responses.lock().unwrap().pop_front() {
                Some(answer) => answer,
                None => self
                    .poll_default
                    .clone()
                    .ok_or_else(|| anyhow!("no scripted poll answer")),
            }
        }

        async fn download(&self, url: &str) -> Result<Vec<u8>> {
            self.download_calls.lock().unwrap().push(url.to_string());
            self.downloads
                .lock()
                .unwrap()
                .get_mut(url)
                .and_then(|queue| queue.pop_front())
                .unwrap_or_else(|| Ok(format!("png:{}", url).into_bytes()))
        }
    }

    pub(crate) fn configured() -> ImageApiConfig {
        ImageApiConfig {
            api_key: Some("key".to_string()),
            endpoint_url: Some("https://api.example.com/api/v1/task".to_string()),
            create_retry_delay_seconds: 0,
            poll_interval_seconds: 0,
            download_retry_delay_seconds: 0,
            ..ImageApiConfig::default()
        }
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(TaskStatus::parse("Completed"), TaskStatus::Completed);
        assert_eq!(TaskStatus::parse("staged"), TaskStatus::Staged);
        assert_eq!(
            TaskStatus::parse("archived"),
            TaskStatus::Unknown("archived".to_string())
        );
    }

    #[test]
    fn test_extract_urls_fallbacks() {
        let primary = envelope(
            r#"{"code": 200, "data": {"status": "completed", "output": {"temporary_image_urls": ["a", null, " "], "image_urls": ["x"]}}}"#,
        );
        assert_eq!(classify("t", &primary).unwrap(), vec!["a"]);

        let list = envelope(
            r#"{"code": 200, "data": {"status": "completed", "output": {"temporary_image_urls": [], "image_urls": ["x", "y"]}}}"#,
        );
        assert_eq!(classify("t", &list).unwrap(), vec!["x", "y"]);

        let single = envelope(
            r#"{"code": 200, "data": {"status": "completed", "output": {"image_url": "z"}}}"#,
        );
        assert_eq!(classify("t", &single).unwrap(), vec!["z"]);
    }

    #[test]
    fn test_classify_transitions() {
        assert!(matches!(classify("t", &status("pending")), Err(PollStep::KeepWaiting(_))));
        assert!(matches!(classify("t", &status("processing")), Err(PollStep::KeepWaiting(_))));
        assert!(matches!(
            classify("t", &envelope(r#"{"code": 500, "message": "busy"}"#)),
            Err(PollStep::KeepWaiting(_))
        ));
        assert!(matches!(
            classify("t", &status("completed")),
            Err(PollStep::Stop(StoryErrorKind::NoResultsFound { .. }))
        ));
        assert!(matches!(
            classify("t", &status("staged")),
            Err(PollStep::Stop(StoryErrorKind::RemoteTaskFailed { .. }))
        ));
        match classify("t", &status("weird")) {
            Err(PollStep::Stop(StoryErrorKind::RemoteTaskFailed { status, .. })) => {
                assert_eq!(status, "weird")
            }
            other => panic!("unexpected {:?}", other),
        }

        let failed = envelope(
            r#"{"code": 200, "data": {"status": "failed", "error": {"code": 1, "message": "banned word"}}}"#,
        );
        match classify("t", &failed) {
            Err(PollStep::Stop(StoryErrorKind::RemoteTaskFailed { message, .. })) => {
                assert_eq!(message, "banned word")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_create_request_wire_format() {
        let request = CreateTaskRequest {
            model: "midjourney",
            task_type: "imagine",
            input: TaskInput { prompt: "a cat" },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"model": "midjourney", "task_type": "imagine", "input": {"prompt": "a cat"}})
        );
    }

    #[tokio::test]
    async fn test_completed_task_saves_two_grid_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = NativeStorage::new();
        let config = configured();
        let api = MockImageApi {
            poll_responses: Mutex::new(VecDeque::from(vec![
                Ok(status("pending")),
                Ok(completed(&["https://cdn/a.png", "https://cdn/b.png"])),
            ])),
            ..Default::default()
        };
        let client = TaskClient::new(&api, &config, &storage);
        let target = ImageTarget::from_path(&dir.path().join("IMAGENS").join("carta_prompt1.png"));

        let outcome = client
            .submit_and_await("a lighthouse", DeliveryMode::Download(target))
            .await?;
        let TaskOutcome::Saved(saved) = outcome else {
            panic!("expected saved images");
        };
        let names: Vec<String> = saved
            .iter()
            .map(|s| s.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["carta_prompt1_grid_1.png", "carta_prompt1_grid_2.png"]);
        assert!(saved.iter().all(|s| s.path.exists()));
        assert_eq!(*api.poll_count.lock().unwrap(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_task_stops_polling() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = NativeStorage::new();
        let config = configured();
        let api = MockImageApi {
            poll_responses: Mutex::new(VecDeque::from(vec![Ok(status("processing")), Ok(status("failed"))])),
            poll_default: Some(completed(&["https://cdn/late.png"])),
            ..Default::default()
        };
        let client = TaskClient::new(&api, &config, &storage);
        let target = ImageTarget::from_path(&dir.path().join("x.png"));

        let err = client
            .submit_and_await("a lighthouse", DeliveryMode::Download(target))
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), StoryErrorKind::RemoteTaskFailed { .. }));
        assert_eq!(*api.poll_count.lock().unwrap(), 2);
        assert!(api.download_calls.lock().unwrap().is_empty());
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_processing_forever_exhausts_poll_budget() {
        let storage = NativeStorage::new();
        let mut config = configured();
        config.poll_attempts = 7;
        let api = MockImageApi {
            poll_default: Some(status("processing")),
            ..Default::default()
        };
        let client = TaskClient::new(&api, &config, &storage);

        let err = client
            .submit_and_await("a lighthouse", DeliveryMode::UrlsOnly)
            .await
            .unwrap_err();
        assert!(matches!(
            err.kind(),
            StoryErrorKind::PollingExhausted { attempts: 7, .. }
        ));
        assert_eq!(*api.poll_count.lock().unwrap(), 7);
    }

    #[tokio::test]
    async fn test_poll_network_errors_are_tolerated() -> Result<()> {
        let storage = NativeStorage::new();
        let config = configured();
        let api = MockImageApi {
            poll_responses: Mutex::new(VecDeque::from(vec![
                Err(anyhow!("connection reset")),
                Err(anyhow!("timeout")),
                Ok(completed(&["https://cdn/a.png"])),
            ])),
            ..Default::default()
        };
        let client = TaskClient::new(&api, &config, &storage);

        let outcome = client.submit_and_await("p", DeliveryMode::UrlsOnly).await?;
        assert_eq!(outcome, TaskOutcome::Urls(vec!["https://cdn/a.png".to_string()]));
        Ok(())
    }

    #[tokio::test]
    async fn test_creation_retries_then_reports_prompt() {
        let storage = NativeStorage::new();
        let config = configured();
        let rejected = r#"{"code": 400, "data": {"error": {"code": 10000, "message": "Failed to check prompt"}}}"#;
        let api = MockImageApi {
            create_responses: Mutex::new(VecDeque::from(vec![
                Err(anyhow!("dns")),
                Ok(envelope(r#"{"code": 200, "data": {}}"#)),
                Ok(envelope(rejected)),
            ])),
            ..Default::default()
        };
        let client = TaskClient::new(&api, &config, &storage);

        let err = client
            .submit_and_await("forbidden words", DeliveryMode::UrlsOnly)
            .await
            .unwrap_err();
        match err.kind() {
            StoryErrorKind::TaskCreationFailed { attempts, detail } => {
                assert_eq!(*attempts, 3);
                assert!(detail.contains("forbidden words"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(api.prompts.lock().unwrap().len(), 3);
        assert_eq!(*api.poll_count.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_credentials_are_checked_per_call() {
        let storage = NativeStorage::new();
        let mut config = configured();
        config.api_key = Some("SUA_CHAVE_GOAPI_AQUI".to_string());
        let api = MockImageApi::default();
        let client = TaskClient::new(&api, &config, &storage);

        let err = client
            .submit_and_await("p", DeliveryMode::UrlsOnly)
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(api.prompts.lock().unwrap().is_empty());
    }
}
