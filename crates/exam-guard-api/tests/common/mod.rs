//! Shared fake transport for exam api integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use exam_guard_api::{
    ApiRequest, ApiResponse, ExamApiClient, ExamTransport, RetryPolicy, TransportError,
};

/// Transport that replays scripted replies and records every request.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<ApiResponse, TransportError>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn new(replies: Vec<Result<ApiResponse, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().expect("request lock").clone()
    }
}

impl ExamTransport for ScriptedTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests
            .lock()
            .expect("request lock")
            .push(request.clone());
        self.replies
            .lock()
            .expect("reply lock")
            .pop_front()
            .unwrap_or(Err(TransportError::Connection("script exhausted".to_string())))
    }
}

#[allow(dead_code)]
pub fn ok(body: &str) -> Result<ApiResponse, TransportError> {
    Ok(ApiResponse {
        status: 200,
        body: body.as_bytes().to_vec(),
    })
}

#[allow(dead_code)]
pub fn status(code: u16, body: &str) -> Result<ApiResponse, TransportError> {
    Ok(ApiResponse {
        status: code,
        body: body.as_bytes().to_vec(),
    })
}

#[allow(dead_code)]
pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay_ms: 1,
        max_delay_ms: 5,
        jitter_ms: 1,
    }
}

#[allow(dead_code)]
pub fn client(transport: Arc<ScriptedTransport>, retry: RetryPolicy) -> ExamApiClient {
    ExamApiClient::new(
        "https://lms.example.test/api/",
        "exam-guard/0.1.0 (desktop)",
        transport,
        retry,
    )
    .expect("client should build")
}
