//! reqwest implementation of [`ResourceApi`].

use std::future::Future;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jobsync_models::{
    CancelAck, CollectionQuery, Detection, DetectionsResponse, Event, EventsResponse, FrameRange,
    HealthStatus, ProcessRequest, Resource, Snapshot, Task, TaskId, TaskPage, TaskStatus,
    TaskTicket, TaskType, UploadReceipt, Video, VideoId, VideoPage, VideoStatus,
};
use reqwest::multipart::Form;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error, info_span, warn, Instrument};

use crate::api::ResourceApi;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::metrics::record_request;
use crate::retry::with_retry;
use crate::upload::VideoUpload;

/// Error body shapes returned by the API.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the platform API.
#[derive(Clone)]
pub struct HttpResourceClient {
    http: Client,
    config: ClientConfig,
}

impl HttpResourceClient {
    /// Create a new client.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("jobsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> ClientResult<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url(), path)
    }

    /// Run one logical request with a span, latency metrics and failure logs.
    ///
    /// `last_status` is written by [`Self::read_json`] with the status of
    /// the final response.
    async fn execute<T, F>(
        &self,
        operation: &'static str,
        last_status: &AtomicU16,
        fut: F,
    ) -> ClientResult<T>
    where
        F: Future<Output = ClientResult<T>>,
    {
        let span = info_span!("jobsync_request", operation = %operation);

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let status = status_label(&result, last_status.load(Ordering::Relaxed));
        record_request(operation, &status, latency_ms);

        match &result {
            Err(e @ ClientError::Decode(_)) => {
                error!(operation = %operation, "Malformed API response: {}", e)
            }
            Err(e @ (ClientError::Transport(_) | ClientError::ServerUnavailable { .. })) => {
                warn!(operation = %operation, "API request failed: {}", e)
            }
            Err(e) => debug!(operation = %operation, "API request rejected: {}", e),
            Ok(_) => debug!(operation = %operation, latency_ms, "API request completed"),
        }

        result
    }

    /// Idempotent GET with retries.
    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        url: String,
        params: Vec<(&'static str, String)>,
    ) -> ClientResult<T> {
        let last_status = AtomicU16::new(0);
        self.execute(
            operation,
            &last_status,
            with_retry(&self.config.retry, operation, || async {
                let response = self.http.get(&url).query(&params).send().await?;
                Self::read_json(response, &last_status).await
            }),
        )
        .await
    }

    /// Mutating request, sent once.
    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> ClientResult<T> {
        let last_status = AtomicU16::new(0);
        self.execute(operation, &last_status, async {
            let response = request.send().await?;
            Self::read_json(response, &last_status).await
        })
        .await
    }

    async fn read_json<T: DeserializeOwned>(
        response: Response,
        last_status: &AtomicU16,
    ) -> ClientResult<T> {
        let status = response.status();
        last_status.store(status.as_u16(), Ordering::Relaxed);
        if !status.is_success() {
            return Err(Self::handle_error_response(response).await);
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| {
            ClientError::decode(format!("unexpected response body from {}: {}", status, e))
        })
    }

    async fn handle_error_response(response: Response) -> ClientError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        let detail = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| {
                b.detail
                    .map(|d| match d {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .or(b.error)
            })
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                } else {
                    body
                }
            });

        ClientError::from_http_status(status.as_u16(), detail)
    }
}

/// Metric label for a finished request: the received HTTP status, or
/// `"decode"` / `"transport"` when no usable response arrived.
fn status_label<T>(result: &ClientResult<T>, last_status: u16) -> String {
    match result {
        Err(e) if e.is_decode() => "decode".to_string(),
        _ if last_status != 0 => last_status.to_string(),
        Ok(_) => "ok".to_string(),
        Err(_) => "transport".to_string(),
    }
}

/// Reject records that break the data model invariants.
fn checked<R: Resource>(record: R) -> ClientResult<R> {
    record.check_invariants()?;
    Ok(record)
}

fn checked_page<R: Resource>(snapshot: Snapshot<R>) -> ClientResult<Snapshot<R>> {
    for item in &snapshot.items {
        item.check_invariants()?;
    }
    Ok(snapshot)
}

#[async_trait]
impl ResourceApi for HttpResourceClient {
    async fn list_videos(&self, query: &CollectionQuery<VideoStatus>) -> ClientResult<Snapshot<Video>> {
        let page: VideoPage = self
            .get_json("list_videos", self.url("/videos/"), query.to_params())
            .await?;
        checked_page(page.into())
    }

    async fn list_tasks(&self, query: &CollectionQuery<TaskStatus>) -> ClientResult<Snapshot<Task>> {
        let page: TaskPage = self
            .get_json("list_tasks", self.url("/tasks/"), query.to_params())
            .await?;
        checked_page(page.into())
    }

    async fn get_video(&self, id: &VideoId) -> ClientResult<Video> {
        let video: Video = self
            .get_json("get_video", self.url(&format!("/videos/{}", id)), Vec::new())
            .await?;
        checked(video)
    }

    async fn get_task(&self, id: &TaskId) -> ClientResult<Task> {
        let task: Task = self
            .get_json("get_task", self.url(&format!("/tasks/{}", id)), Vec::new())
            .await?;
        checked(task)
    }

    async fn upload_video(&self, upload: VideoUpload) -> ClientResult<UploadReceipt> {
        self.config.upload.validate(&upload)?;

        debug!(
            filename = %upload.filename(),
            size = upload.size(),
            "Uploading video"
        );

        let part = upload.into_part().await?;
        let form = Form::new().part("file", part);
        let request = self.http.post(self.url("/videos/upload")).multipart(form);
        self.send_json("upload_video", request).await
    }

    async fn process_video(&self, id: &VideoId, process_type: TaskType) -> ClientResult<TaskTicket> {
        let request = self
            .http
            .post(self.url(&format!("/videos/{}/process", id)))
            .json(&ProcessRequest { process_type });
        self.send_json("process_video", request).await
    }

    async fn cancel_task(&self, id: &TaskId) -> ClientResult<CancelAck> {
        let request = self.http.delete(self.url(&format!("/tasks/{}", id)));
        self.send_json("cancel_task", request).await
    }

    async fn health(&self) -> ClientResult<HealthStatus> {
        let url = format!("{}/health", self.config.root_url());
        self.get_json("health", url, Vec::new()).await
    }

    async fn video_detections(&self, id: &VideoId, frames: FrameRange) -> ClientResult<Vec<Detection>> {
        if frames.is_empty() {
            return Err(ClientError::rejected(format!(
                "frame range {:?}..{:?} is empty",
                frames.start, frames.end
            )));
        }
        let response: DetectionsResponse = self
            .get_json(
                "video_detections",
                self.url(&format!("/videos/{}/detections", id)),
                frames.to_params(),
            )
            .await?;
        Ok(response.detections)
    }

    async fn video_events(&self, id: &VideoId, event_type: Option<&str>) -> ClientResult<Vec<Event>> {
        let params = event_type
            .map(|t| vec![("event_type", t.to_string())])
            .unwrap_or_default();
        let response: EventsResponse = self
            .get_json("video_events", self.url(&format!("/videos/{}/events", id)), params)
            .await?;
        Ok(response.events)
    }
}
