//! Shared fakes for gate integration tests.

use std::sync::Mutex;

use exam_guard_api::{
    ApiError, ApiRequest, ApiResponse, ExamTransport, StartedAttempt, TransportError,
};
use exam_guard_core::ExamDefinition;
use exam_guard_gate::{ConfigPlatform, GateApi};

/// Counting gate api with a fixed start outcome.
#[derive(Default)]
pub struct CountingApi {
    pub downloads: Mutex<u32>,
    pub starts: Mutex<u32>,
    pub reject_start: bool,
}

impl GateApi for CountingApi {
    fn download_seb_config(
        &self,
        exam_id: &str,
        platform: ConfigPlatform,
        _token: &str,
    ) -> Result<Vec<u8>, ApiError> {
        *self.downloads.lock().expect("download lock") += 1;
        Ok(format!("cfg:{exam_id}:{platform}").into_bytes())
    }

    fn start_attempt(&self, _exam_id: &str, _token: &str) -> Result<StartedAttempt, ApiError> {
        *self.starts.lock().expect("start lock") += 1;
        if self.reject_start {
            Err(ApiError::SebRequired {
                message: "Open in Safe Exam Browser".to_string(),
            })
        } else {
            Ok(StartedAttempt {
                id: "attempt-1".to_string(),
                duration_minutes: None,
            })
        }
    }
}

#[allow(dead_code)]
impl CountingApi {
    pub fn start_count(&self) -> u32 {
        *self.starts.lock().expect("start lock")
    }

    pub fn download_count(&self) -> u32 {
        *self.downloads.lock().expect("download lock")
    }
}

/// Server double enforcing the controlled-browser rule on the user agent.
#[derive(Default)]
pub struct SebServer {
    pub starts: Mutex<u32>,
}

impl ExamTransport for SebServer {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let path = request.url.path();
        if path.ends_with("/seb-config") {
            return Ok(ApiResponse {
                status: 200,
                body: b"<plist/>".to_vec(),
            });
        }
        if path.ends_with("/start") {
            *self.starts.lock().expect("start lock") += 1;
            return Ok(if request.user_agent.contains("SEB") {
                ApiResponse {
                    status: 200,
                    body: br#"{"id":"attempt-9"}"#.to_vec(),
                }
            } else {
                ApiResponse {
                    status: 403,
                    body: br#"{"error":"SEB_REQUIRED","message":"Use Safe Exam Browser"}"#.to_vec(),
                }
            });
        }
        Ok(ApiResponse {
            status: 404,
            body: Vec::new(),
        })
    }
}

#[allow(dead_code)]
pub fn exam(seb_enabled: bool) -> ExamDefinition {
    ExamDefinition::from_json_bytes(
        format!(r#"{{"id":"exam-1","title":"Chemistry","sebEnabled":{seb_enabled}}}"#).as_bytes(),
    )
    .expect("exam fixture should decode")
}
