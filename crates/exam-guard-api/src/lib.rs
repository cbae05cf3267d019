#![warn(missing_docs)]
//! # exam-guard-api
//!
//! ## Purpose
//! Typed client for the exam REST endpoints consumed by the secure exam
//! session.
//!
//! ## Responsibilities
//! - Validate the API base URL (HTTPS only).
//! - Build endpoint URLs with percent-encoded path segments.
//! - Execute requests through an injectable [`ExamTransport`].
//! - Map HTTP failures onto [`ApiError`], including the distinguishable
//!   `SEB_REQUIRED` rejection.
//! - Retry idempotent loads with bounded, jittered backoff; never retry
//!   start or submit.
//!
//! ## Data flow
//! Session/gate call [`ExamApiClient`] -> [`ApiRequest`] -> transport ->
//! [`ApiResponse`] -> JSON decode into `exam-guard-core` types.
//!
//! ## Ownership and lifetimes
//! Requests and responses own their buffers so transports may be backed by
//! any HTTP stack without borrowing client state.
//!
//! ## Error model
//! Every failure is an [`ApiError`]; [`classify_api_error`] separates
//! retriable transport/server failures from permanent ones.
//!
//! ## Security and privacy notes
//! Bearer tokens travel in [`ApiRequest::bearer_token`] (and, for the config
//! download, the query string the server contract requires). Logs record the
//! URL path only, never the query or body.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use exam_guard_core::{
    CoreError, ErrorCategory, ExamDefinition, Question, SubmissionPayload, SubmissionResult,
    string_or_number,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

/// Error code the server returns when the controlled browser is required.
pub const SEB_REQUIRED_CODE: &str = "SEB_REQUIRED";

/// HTTP method subset used by the exam API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// Idempotent read.
    Get,
    /// State-changing request.
    Post,
}

/// Transport-level request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// Request method.
    pub method: HttpMethod,
    /// Absolute request URL.
    pub url: Url,
    /// Bearer credential for the `Authorization` header.
    pub bearer_token: Option<String>,
    /// Self-reported client identity for the `User-Agent` header.
    pub user_agent: String,
    /// Value for the `Idempotency-Key` header.
    pub idempotency_key: Option<String>,
    /// JSON body.
    pub body: Option<Vec<u8>>,
}

/// Transport-level response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

/// Failure before an HTTP status was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Request timed out.
    #[error("request timed out")]
    Timeout,
    /// Connection could not be established or was reset.
    #[error("connection failure: {0}")]
    Connection(String),
}

/// Abstract HTTP transport.
pub trait ExamTransport: Send + Sync {
    /// Sends one request and returns the raw response.
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// Retry behavior for idempotent loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Upper bound on the exponential delay.
    pub max_delay_ms: u64,
    /// Maximum random jitter added to each delay.
    pub jitter_ms: u64,
}

impl RetryPolicy {
    /// Policy that never retries.
    pub const NONE: Self = Self {
        max_retries: 0,
        base_delay_ms: 0,
        max_delay_ms: 0,
        jitter_ms: 0,
    };

    /// Delay before retry number `retry` (zero-based).
    pub fn delay_for_retry(&self, retry: u32, rng: &mut impl Rng) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(1_u64 << retry.min(16))
            .min(self.max_delay_ms);
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rng.random_range(0..=self.jitter_ms)
        };
        Duration::from_millis(exponential.saturating_add(jitter))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 250,
            max_delay_ms: 2_000,
            jitter_ms: 100,
        }
    }
}

/// Failure classification for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// A later identical request may succeed.
    Retriable,
    /// Retrying cannot help.
    Permanent,
}

/// Attempt record returned by `POST /exams/{id}/start`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedAttempt {
    /// Server-issued attempt id.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Duration override chosen by the server, if any.
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuestionsBody {
    Bare(Vec<Question>),
    Wrapped { questions: Vec<Question> },
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Exam API client.
pub struct ExamApiClient {
    base: Url,
    user_agent: String,
    transport: Arc<dyn ExamTransport>,
    retry: RetryPolicy,
    rng: Mutex<StdRng>,
}

impl ExamApiClient {
    /// Creates a validated client.
    ///
    /// # Errors
    /// Returns [`ApiError::InvalidEndpoint`] when `base_url` is not an
    /// absolute HTTPS URL.
    pub fn new(
        base_url: &str,
        user_agent: impl Into<String>,
        transport: Arc<dyn ExamTransport>,
        retry: RetryPolicy,
    ) -> Result<Self, ApiError> {
        let base = validate_base_url(base_url)?;
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or(0);
        Ok(Self {
            base,
            user_agent: user_agent.into(),
            transport,
            retry,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    /// Returns the configured user agent.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// `GET /exams/{id}` with optional `includeQuestions=true`.
    ///
    /// # Errors
    /// Returns [`ApiError`] for transport, status or decode failures.
    pub fn fetch_exam(
        &self,
        exam_id: &str,
        token: &str,
        include_questions: bool,
    ) -> Result<ExamDefinition, ApiError> {
        let mut url = self.endpoint(&["exams", exam_id]);
        if include_questions {
            url.query_pairs_mut().append_pair("includeQuestions", "true");
        }
        let response = self.send_with_retry(&self.request(HttpMethod::Get, url, token))?;
        Ok(ExamDefinition::from_json_bytes(&response.body)?)
    }

    /// `GET /exams/{id}/questions`. Accepts a bare array or `{questions}`.
    ///
    /// # Errors
    /// Returns [`ApiError`] for transport, status or decode failures.
    pub fn fetch_questions(&self, exam_id: &str, token: &str) -> Result<Vec<Question>, ApiError> {
        let url = self.endpoint(&["exams", exam_id, "questions"]);
        let response = self.send_with_retry(&self.request(HttpMethod::Get, url, token))?;
        let body: QuestionsBody = serde_json::from_slice(&response.body)?;
        Ok(match body {
            QuestionsBody::Bare(questions) | QuestionsBody::Wrapped { questions } => questions,
        })
    }

    /// `POST /exams/{id}/start`. Never retried.
    ///
    /// # Errors
    /// Returns [`ApiError::SebRequired`] when the server demands the
    /// controlled browser, or another [`ApiError`] on failure.
    pub fn start_attempt(&self, exam_id: &str, token: &str) -> Result<StartedAttempt, ApiError> {
        let url = self.endpoint(&["exams", exam_id, "start"]);
        let response = self.send_once(&self.request(HttpMethod::Post, url, token))?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    /// `GET /exams/{id}/seb-config?platform=..&token=..` returning the opaque
    /// artifact bytes.
    ///
    /// # Errors
    /// Returns [`ApiError`] for transport or status failures.
    pub fn download_seb_config(
        &self,
        exam_id: &str,
        platform: &str,
        token: &str,
    ) -> Result<Vec<u8>, ApiError> {
        let mut url = self.endpoint(&["exams", exam_id, "seb-config"]);
        url.query_pairs_mut()
            .append_pair("platform", platform)
            .append_pair("token", token);
        let response = self.send_with_retry(&self.request(HttpMethod::Get, url, token))?;
        Ok(response.body)
    }

    /// `POST /attempts/{id}/submit` with an `Idempotency-Key`. Never retried.
    ///
    /// # Errors
    /// Returns [`ApiError`] for encode, transport, status or decode failures.
    pub fn submit_attempt(
        &self,
        attempt_id: &str,
        token: &str,
        payload: &SubmissionPayload,
    ) -> Result<SubmissionResult, ApiError> {
        let url = self.endpoint(&["attempts", attempt_id, "submit"]);
        let mut request = self.request(HttpMethod::Post, url, token);
        request.idempotency_key = Some(idempotency_key_for_submission(attempt_id, payload)?);
        request.body = Some(payload.to_json_bytes()?);

        let response = self.send_once(&request)?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: HttpMethod, url: Url, token: &str) -> ApiRequest {
        ApiRequest {
            method,
            url,
            bearer_token: Some(token.to_string()).filter(|token| !token.is_empty()),
            user_agent: self.user_agent.clone(),
            idempotency_key: None,
            body: None,
        }
    }

    fn send_once(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let response = self.transport.send(request).map_err(|error| match error {
            TransportError::Timeout => ApiError::Timeout,
            TransportError::Connection(detail) => ApiError::Connection(detail),
        })?;

        tracing::debug!(
            method = ?request.method,
            path = request.url.path(),
            status = response.status,
            "exam api response"
        );

        if (200..300).contains(&response.status) {
            Ok(response)
        } else {
            Err(error_for_status(response.status, &response.body))
        }
    }

    fn send_with_retry(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut retry = 0;
        loop {
            match self.send_once(request) {
                Err(error)
                    if retry < self.retry.max_retries
                        && classify_api_error(&error) == FailureClass::Retriable =>
                {
                    let delay = match self.rng.lock() {
                        Ok(mut rng) => self.retry.delay_for_retry(retry, &mut *rng),
                        Err(_) => Duration::from_millis(self.retry.base_delay_ms),
                    };
                    tracing::warn!(
                        path = request.url.path(),
                        retry = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "retrying exam api load"
                    );
                    std::thread::sleep(delay);
                    retry += 1;
                }
                other => return other,
            }
        }
    }
}

/// Validates the API base URL.
///
/// # Errors
/// Returns [`ApiError::InvalidEndpoint`] for unparsable or non-HTTPS URLs.
pub fn validate_base_url(base_url: &str) -> Result<Url, ApiError> {
    let parsed = Url::parse(base_url)
        .map_err(|error| ApiError::InvalidEndpoint(format!("invalid api url: {error}")))?;
    if parsed.scheme() != "https" {
        return Err(ApiError::InvalidEndpoint(
            "api endpoint must use https".to_string(),
        ));
    }
    if parsed.cannot_be_a_base() {
        return Err(ApiError::InvalidEndpoint(
            "api endpoint cannot be a base url".to_string(),
        ));
    }
    Ok(parsed)
}

/// Maps a non-2xx response onto [`ApiError`].
pub fn error_for_status(status: u16, body: &[u8]) -> ApiError {
    let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
    let message = parsed.message.unwrap_or_default();

    if status == 403 && parsed.error.as_deref() == Some(SEB_REQUIRED_CODE) {
        return ApiError::SebRequired { message };
    }
    if status >= 500 {
        ApiError::Server { status, message }
    } else {
        ApiError::Client { status, message }
    }
}

/// Stable key over attempt id and canonical payload encoding.
///
/// Answer maps are ordered, so identical submissions always hash identically.
///
/// # Errors
/// Returns [`ApiError::Core`] when the payload cannot be encoded.
pub fn idempotency_key_for_submission(
    attempt_id: &str,
    payload: &SubmissionPayload,
) -> Result<String, ApiError> {
    let mut hasher = Sha256::new();
    hasher.update(attempt_id.as_bytes());
    hasher.update([0_u8]);
    hasher.update(payload.to_json_bytes()?);
    Ok(hex::encode(hasher.finalize()))
}

/// Classifies an error for retry decisions.
pub fn classify_api_error(error: &ApiError) -> FailureClass {
    match error {
        ApiError::Timeout | ApiError::Connection(_) | ApiError::Server { .. } => {
            FailureClass::Retriable
        }
        ApiError::InvalidEndpoint(_)
        | ApiError::Client { .. }
        | ApiError::SebRequired { .. }
        | ApiError::Decode(_)
        | ApiError::Core(_) => FailureClass::Permanent,
    }
}

/// Exam API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Base URL violates endpoint policy.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// Request timed out.
    #[error("request timed out")]
    Timeout,
    /// Connection failure.
    #[error("connection failure: {0}")]
    Connection(String),
    /// 5xx response.
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status.
        status: u16,
        /// Server-provided message.
        message: String,
    },
    /// 4xx response other than `SEB_REQUIRED`.
    #[error("request rejected {status}: {message}")]
    Client {
        /// HTTP status.
        status: u16,
        /// Server-provided message.
        message: String,
    },
    /// 403 with `SEB_REQUIRED`: the controlled browser is mandatory.
    #[error("controlled browser required: {message}")]
    SebRequired {
        /// Guidance text from the server.
        message: String,
    },
    /// Response JSON did not match the contract.
    #[error("response decode failure: {0}")]
    Decode(#[from] serde_json::Error),
    /// Core model validation failure.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ApiError {
    /// Maps the error onto the workspace taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SebRequired { .. } | Self::InvalidEndpoint(_) => {
                ErrorCategory::PreconditionFailed
            }
            Self::Timeout
            | Self::Connection(_)
            | Self::Server { .. }
            | Self::Client { .. }
            | Self::Decode(_)
            | Self::Core(_) => ErrorCategory::NetworkFailure,
        }
    }
}
