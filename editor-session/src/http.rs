//! HTTP client for the studio service.
//!
//! Speaks plain JSON over HTTP to the job, upload and credit endpoints and
//! exposes them through the collaborator traits. Requests are never retried;
//! a failed call is reported to the caller as-is.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use url::Url;

use crate::backend::{
    Balance, BackendError, BackendResult, JobBackend, JobRequest, JobStatus, JobSubmission,
    MediaStore, UploadedImage,
};

/// Errors that can occur when talking to the studio service.
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// The base URL provided by configuration is invalid.
    #[error("invalid studio URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed (connection, timeout, body decode).
    #[error("studio HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The service answered with a non-success status.
    #[error("studio returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },
}

impl From<HttpClientError> for BackendError {
    fn from(err: HttpClientError) -> Self {
        match err {
            HttpClientError::Http(e) if e.is_decode() => Self::InvalidResponse(e.to_string()),
            HttpClientError::Http(e) => Self::Transport(e.to_string()),
            HttpClientError::Status { status, body } => Self::Status { status, body },
            HttpClientError::InvalidUrl(url) => Self::InvalidResponse(url),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SuccessResponse {
    success: bool,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: u64,
}

#[derive(Debug, Serialize)]
struct AmountRequest {
    amount: u64,
}

/// Client for the studio HTTP API.
#[derive(Debug, Clone)]
pub struct HttpStudioClient {
    http: Client,
    base: Url,
    token: Option<String>,
}

impl HttpStudioClient {
    /// Create a client for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`HttpClientError::InvalidUrl`] if the URL is malformed or
    /// cannot carry a path. Returns [`HttpClientError::Http`] if the HTTP
    /// client fails to build.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, HttpClientError> {
        let base = Url::parse(base_url.as_ref())
            .map_err(|e| HttpClientError::InvalidUrl(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(HttpClientError::InvalidUrl(base.to_string()));
        }

        let http = Client::builder()
            .user_agent(concat!("editor-session/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base,
            token: None,
        })
    }

    /// Send `token` as a bearer credential with every request.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Base URL of the service.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, HttpClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| HttpClientError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        credential: Option<&str>,
    ) -> Result<T, HttpClientError> {
        let request = match credential.or(self.token.as_deref()) {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body = %body, "Studio request failed");
            return Err(HttpClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl JobBackend for HttpStudioClient {
    async fn submit_job(&self, request: &JobRequest) -> BackendResult<JobSubmission> {
        let url = self.endpoint(&["api", "jobs"])?;
        tracing::debug!(url = %url, model_id = %request.model_id, "Submitting job");
        let submission = self
            .send_json(
                self.http.post(url).json(request),
                request.credential.as_deref(),
            )
            .await?;
        Ok(submission)
    }

    async fn job_status(&self, job_id: &str) -> BackendResult<JobStatus> {
        let url = self.endpoint(&["api", "jobs", job_id])?;
        let status = self.send_json(self.http.get(url), None).await?;
        Ok(status)
    }
}

#[async_trait]
impl MediaStore for HttpStudioClient {
    async fn upload_image(&self, bytes: Vec<u8>) -> BackendResult<UploadedImage> {
        let url = self.endpoint(&["api", "uploads"])?;
        tracing::debug!(url = %url, size = bytes.len(), "Uploading image");
        let uploaded = self
            .send_json(
                self.http
                    .post(url)
                    .header(reqwest::header::CONTENT_TYPE, "image/png")
                    .body(bytes),
                None,
            )
            .await?;
        Ok(uploaded)
    }
}

#[async_trait]
impl Balance for HttpStudioClient {
    async fn debit(&self, amount: u64) -> BackendResult<bool> {
        let url = self.endpoint(&["api", "credits", "debit"])?;
        let response: SuccessResponse = self
            .send_json(self.http.post(url).json(&AmountRequest { amount }), None)
            .await?;
        Ok(response.success)
    }

    async fn credit(&self, amount: u64) -> BackendResult<()> {
        let url = self.endpoint(&["api", "credits", "credit"])?;
        let response: SuccessResponse = self
            .send_json(self.http.post(url).json(&json!({ "amount": amount })), None)
            .await?;
        if response.success {
            Ok(())
        } else {
            Err(BackendError::InvalidResponse("credit was not applied".to_string()))
        }
    }

    async fn available(&self) -> BackendResult<u64> {
        let url = self.endpoint(&["api", "credits"])?;
        let response: BalanceResponse = self.send_json(self.http.get(url), None).await?;
        Ok(response.balance)
    }
}
