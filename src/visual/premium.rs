//! Premium clip generation over an asynchronous task API.
//!
//! Submitting returns a task id; the task is polled until it reports
//! `SUCCEEDED` or `FAILED`, then the finished clip is streamed to disk.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::PremiumConfig;
use crate::error::{EngineError, Result};

/// What the premium provider is asked to produce
#[derive(Debug, Clone, Serialize)]
pub struct ClipRequest {
    pub scene_index: usize,
    /// Scene description
    pub prompt: String,
    /// Camera direction for this clip
    pub motion_prompt: String,
    /// Reference still, when one exists
    pub still: Option<PathBuf>,
    pub duration_hint: f64,
}

/// Provider-side task handle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(pub String);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Succeeded,
    Failed(String),
}

/// Remote clip generator
#[async_trait]
pub trait ClipGenerator: Send + Sync {
    fn provider_id(&self) -> &str;

    /// Start a generation task
    async fn submit(&self, request: &ClipRequest) -> Result<JobId>;

    async fn poll(&self, job: &JobId) -> Result<JobStatus>;

    /// Fetch a finished clip into `output`
    async fn download(&self, job: &JobId, output: &Path) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    output: TaskOutput,
}

#[derive(Debug, Deserialize)]
struct TaskOutput {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    task_status: Option<String>,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Which request a rejected response answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    Submit,
    Poll,
    Download,
}

/// Map a non-success response to an engine error.
///
/// 429 is request throttling and stays retryable on every call. Only a 402
/// on submit means the provider-side budget is gone.
pub(crate) fn classify_rejection(provider: &str, call: Call, status: StatusCode, body: &str) -> EngineError {
    match (call, status) {
        (Call::Submit, StatusCode::PAYMENT_REQUIRED) => EngineError::ProviderQuota {
            provider: provider.to_string(),
            message: format!("HTTP {status}: {body}"),
        },
        (_, StatusCode::TOO_MANY_REQUESTS) => {
            EngineError::provider(provider, format!("rate limited on {call:?} (HTTP {status}): {body}"))
        }
        _ => EngineError::provider(provider, format!("HTTP {status}: {body}")),
    }
}

/// Still image inlined into a submit request
#[derive(Debug, Clone)]
struct EncodedStill {
    mime_type: &'static str,
    data: String,
}

impl EncodedStill {
    async fn read(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::from_bytes(path, &bytes))
    }

    fn from_bytes(path: &Path, bytes: &[u8]) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let mime_type = match ext.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "webp" => "image/webp",
            _ => "image/png",
        };
        Self {
            mime_type,
            data: BASE64.encode(bytes),
        }
    }
}

/// [`ClipGenerator`] for a JSON task API authenticated with a bearer key
pub struct HttpClipGenerator {
    client: Client,
    endpoint: String,
    api_key: String,
    provider_id: String,
    clip_seconds: f64,
    video_urls: Mutex<HashMap<JobId, String>>,
}

impl HttpClipGenerator {
    /// Build from config; the key is read from `api_key_env`
    pub fn from_config(config: &PremiumConfig) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(EngineError::provider(&config.provider_id, "no endpoint configured"));
        }
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            EngineError::provider(&config.provider_id, format!("{} is not set", config.api_key_env))
        })?;
        Self::new(&config.endpoint, api_key, &config.provider_id, config.clip_seconds)
    }

    pub fn new(endpoint: &str, api_key: String, provider_id: &str, clip_seconds: f64) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .use_rustls_tls()
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            provider_id: provider_id.to_string(),
            clip_seconds,
            video_urls: Mutex::new(HashMap::new()),
        })
    }

    async fn reject(&self, call: Call, response: reqwest::Response) -> EngineError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        classify_rejection(&self.provider_id, call, status, body.trim())
    }

    fn body(&self, request: &ClipRequest, still: Option<&EncodedStill>) -> serde_json::Value {
        let mut input = json!({
            "prompt": request.prompt,
            "motion_prompt": request.motion_prompt,
        });
        if let Some(still) = still {
            input["image"] = json!({
                "mime_type": still.mime_type,
                "data": still.data,
            });
        }
        json!({
            "input": input,
            "parameters": {
                "duration": request.duration_hint.min(self.clip_seconds).max(1.0).round() as u32,
            }
        })
    }
}

#[async_trait]
impl ClipGenerator for HttpClipGenerator {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn submit(&self, request: &ClipRequest) -> Result<JobId> {
        let still = match &request.still {
            Some(path) => Some(EncodedStill::read(path).await?),
            None => None,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("X-Async", "enable")
            .json(&self.body(request, still.as_ref()))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.reject(Call::Submit, response).await);
        }

        let task: TaskResponse = response.json().await?;
        let id = task
            .output
            .task_id
            .ok_or_else(|| EngineError::provider(&self.provider_id, "response has no task_id"))?;
        info!("Submitted clip task {} for scene {}", id, request.scene_index + 1);
        Ok(JobId(id))
    }

    async fn poll(&self, job: &JobId) -> Result<JobStatus> {
        let response = self
            .client
            .get(format!("{}/{}", self.endpoint, job))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.reject(Call::Poll, response).await);
        }

        let task: TaskResponse = response.json().await?;
        let status = task.output.task_status.unwrap_or_default();
        debug!("Clip task {}: {}", job, status);

        match status.as_str() {
            "SUCCEEDED" => {
                let url = task
                    .output
                    .video_url
                    .ok_or_else(|| EngineError::provider(&self.provider_id, "succeeded task has no video_url"))?;
                self.video_urls.lock().await.insert(job.clone(), url);
                Ok(JobStatus::Succeeded)
            }
            "FAILED" | "CANCELED" => Ok(JobStatus::Failed(
                task.output.message.unwrap_or_else(|| status.to_lowercase()),
            )),
            _ => Ok(JobStatus::Pending),
        }
    }

    async fn download(&self, job: &JobId, output: &Path) -> Result<()> {
        let url = self
            .video_urls
            .lock()
            .await
            .get(job)
            .cloned()
            .ok_or_else(|| EngineError::provider(&self.provider_id, format!("task {job} has not finished")))?;

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(self.reject(Call::Download, response).await);
        }

        let mut file = tokio::fs::File::create(output).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            written += chunk.len();
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        if written == 0 {
            return Err(EngineError::provider(&self.provider_id, "downloaded clip is empty"));
        }
        info!("Downloaded clip {} ({} KB)", output.display(), written / 1024);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> HttpClipGenerator {
        HttpClipGenerator::new("https://video.example/v1/tasks/", "key".into(), "premium-video", 8.0).unwrap()
    }

    #[test]
    fn request_body_caps_duration() {
        let request = ClipRequest {
            scene_index: 0,
            prompt: "harbour at dawn".into(),
            motion_prompt: "Slow dolly forward, harbour at dawn".into(),
            still: None,
            duration_hint: 11.4,
        };
        let body = generator().body(&request, None);
        assert_eq!(body["parameters"]["duration"], 8);
        assert_eq!(body["input"]["prompt"], "harbour at dawn");
        assert!(body["input"].get("image").is_none());
    }

    #[tokio::test]
    async fn still_is_inlined_as_base64() {
        let path = std::env::temp_dir().join(format!("scenecast-still-{}.JPG", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"\xff\xd8still").await.unwrap();
        let request = ClipRequest {
            scene_index: 2,
            prompt: "market square".into(),
            motion_prompt: "Pan left".into(),
            still: Some(path.clone()),
            duration_hint: 4.0,
        };

        let still = EncodedStill::read(&path).await.unwrap();
        let body = generator().body(&request, Some(&still));
        assert_eq!(body["input"]["image"]["mime_type"], "image/jpeg");
        assert_eq!(body["input"]["image"]["data"], BASE64.encode(b"\xff\xd8still"));
        assert!(body["input"].get("image_path").is_none());
        tokio::fs::remove_file(&path).await.ok();
    }

    #[test]
    fn throttling_is_retryable_and_402_on_submit_is_quota() {
        let poll = classify_rejection("premium-video", Call::Poll, StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(!poll.is_quota());
        assert!(poll.is_transient());

        let submit = classify_rejection("premium-video", Call::Submit, StatusCode::TOO_MANY_REQUESTS, "");
        assert!(submit.is_transient());

        let billing = classify_rejection("premium-video", Call::Submit, StatusCode::PAYMENT_REQUIRED, "no credit");
        assert!(billing.is_quota());
        assert!(billing.to_string().contains("no credit"));

        let late = classify_rejection("premium-video", Call::Download, StatusCode::PAYMENT_REQUIRED, "");
        assert!(!late.is_quota());
    }

    #[test]
    fn endpoint_trailing_slash_is_dropped() {
        assert_eq!(generator().endpoint, "https://video.example/v1/tasks");
    }

    #[test]
    fn missing_key_is_a_provider_error() {
        let config = PremiumConfig {
            endpoint: "https://video.example".into(),
            api_key_env: "SCENECAST_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..Default::default()
        };
        let err = HttpClipGenerator::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("SCENECAST_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn task_response_parses_status() {
        let task: TaskResponse = serde_json::from_str(
            r#"{"output": {"task_status": "SUCCEEDED", "video_url": "https://cdn.example/c.mp4"}}"#,
        )
        .unwrap();
        assert_eq!(task.output.task_status.as_deref(), Some("SUCCEEDED"));
        assert!(task.output.task_id.is_none());
    }
}
