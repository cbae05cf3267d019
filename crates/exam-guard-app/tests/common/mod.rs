//! Shared fixtures for app integration tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use exam_guard_api::{
    ApiRequest, ApiResponse, ExamApiClient, ExamTransport, HttpMethod, RetryPolicy,
    TransportError,
};
use exam_guard_app::{
    AppConfig, ENV_API_BASE, ENV_USER_AGENT, ExamScreen, MediaDeniedHandler, ScreenDeps,
};
use exam_guard_lockdown::{
    BridgeConfig, DesktopBridge, LockdownController, hash_quit_password,
};
use exam_guard_media::{MediaError, SyntheticMediaDevices};
use exam_guard_monitor::{ManualClock, ManualLifecycleSource};
use exam_guard_platform::{SyntheticClipboard, SyntheticShortcutRegistry, SyntheticWindow};
use exam_guard_restriction::{RestrictionConfig, RestrictionEnforcer};

/// In-memory exam server.
pub struct ExamServer {
    pub exam_json: String,
    pub submits: Mutex<Vec<Vec<u8>>>,
    pub starts: Mutex<u32>,
    start_hook: Mutex<Option<StartHook>>,
}

type StartHook = Box<dyn Fn() + Send>;

#[allow(dead_code)]
impl ExamServer {
    pub fn new(seb_enabled: bool, proctoring_enabled: bool, duration_minutes: u32) -> Arc<Self> {
        let exam_json = format!(
            r#"{{"id":"exam-1","title":"Biology","durationMinutes":{duration_minutes},
                "sebEnabled":{seb_enabled},"proctoringEnabled":{proctoring_enabled},
                "passPercentage":60,
                "questions":[{{"id":"q1","prompt":"Cell?","options":["a","b"]}},
                             {{"id":"q2","prompt":"DNA?","options":["a","b"]}}]}}"#
        );
        Arc::new(Self {
            exam_json,
            submits: Mutex::new(Vec::new()),
            starts: Mutex::new(0),
            start_hook: Mutex::new(None),
        })
    }

    pub fn submit_count(&self) -> usize {
        self.submits.lock().expect("submit lock").len()
    }

    /// Runs `hook` while the start request is being served.
    pub fn during_start(&self, hook: impl Fn() + Send + 'static) {
        *self.start_hook.lock().expect("hook lock") = Some(Box::new(hook));
    }

    pub fn start_count(&self) -> u32 {
        *self.starts.lock().expect("start lock")
    }
}

fn reply(status: u16, body: &str) -> Result<ApiResponse, TransportError> {
    Ok(ApiResponse {
        status,
        body: body.as_bytes().to_vec(),
    })
}

impl ExamTransport for ExamServer {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let path = request.url.path();
        match (request.method, path) {
            (HttpMethod::Get, "/api/exams/exam-1") => reply(200, &self.exam_json),
            (HttpMethod::Get, "/api/exams/exam-1/seb-config") => reply(200, "<plist/>"),
            (HttpMethod::Post, "/api/exams/exam-1/start") => {
                *self.starts.lock().expect("start lock") += 1;
                if let Some(hook) = self.start_hook.lock().expect("hook lock").as_ref() {
                    hook();
                }
                reply(200, r#"{"id":"attempt-1"}"#)
            }
            (HttpMethod::Post, "/api/attempts/attempt-1/submit") => {
                self.submits
                    .lock()
                    .expect("submit lock")
                    .push(request.body.clone().unwrap_or_default());
                reply(200, r#"{"score":1,"total":2,"status":"graded"}"#)
            }
            _ => reply(404, r#"{"message":"not found"}"#),
        }
    }
}

/// Synthetic host collaborators kept for assertions.
#[allow(dead_code)]
pub struct Host {
    pub server: Arc<ExamServer>,
    pub lifecycle: Arc<ManualLifecycleSource>,
    pub clock: Arc<ManualClock>,
    pub registry: Arc<SyntheticShortcutRegistry>,
    pub clipboard: Arc<SyntheticClipboard>,
    pub window: Arc<SyntheticWindow>,
    pub devices: Arc<SyntheticMediaDevices>,
    pub media_denials: Arc<AtomicU32>,
}

#[allow(dead_code)]
impl Host {
    pub fn denial_count(&self) -> u32 {
        self.media_denials.load(Ordering::SeqCst)
    }
}

#[allow(dead_code)]
pub fn host(server: Arc<ExamServer>) -> Host {
    Host {
        server,
        lifecycle: Arc::new(ManualLifecycleSource::new()),
        clock: Arc::new(ManualClock::new(1_700_000_000_000)),
        registry: Arc::new(SyntheticShortcutRegistry::new()),
        clipboard: Arc::new(SyntheticClipboard::new()),
        window: Arc::new(SyntheticWindow::new()),
        devices: Arc::new(SyntheticMediaDevices::new()),
        media_denials: Arc::new(AtomicU32::new(0)),
    }
}

/// Proctor quit password configured on the fixture bridge.
#[allow(dead_code)]
pub const QUIT_PASSWORD: &str = "proctor-42";
/// User agent of the controlled browser.
#[allow(dead_code)]
pub const SEB_AGENT: &str = "Mozilla/5.0 SEB/3.4 exam-guard/0.1.0";
/// Plain desktop user agent.
#[allow(dead_code)]
pub const PLAIN_AGENT: &str = "exam-guard/0.1.0 (desktop)";

#[allow(dead_code)]
pub fn config(user_agent: &str) -> AppConfig {
    AppConfig::from_lookup(|key| match key {
        ENV_API_BASE => Some("https://lms.example.test/api/".to_string()),
        ENV_USER_AGENT => Some(user_agent.to_string()),
        _ => None,
    })
    .expect("config fixture")
}

#[allow(dead_code)]
pub fn open(host: &Host, user_agent: &str) -> ExamScreen {
    open_with(host, &config(user_agent))
}

#[allow(dead_code)]
pub fn open_with(host: &Host, config: &AppConfig) -> ExamScreen {
    let api = Arc::new(
        ExamApiClient::new(
            config.api_base.as_str(),
            config.user_agent.clone(),
            host.server.clone(),
            RetryPolicy::NONE,
        )
        .expect("client fixture"),
    );
    let bridge = DesktopBridge::new(
        BridgeConfig {
            platform: "win".to_string(),
            app_version: "0.1.0".to_string(),
            quit_password_sha256: Some(hash_quit_password(QUIT_PASSWORD)),
        },
        LockdownController::new(host.registry.clone(), host.window.clone()),
        RestrictionEnforcer::new(
            host.registry.clone(),
            host.clipboard.clone(),
            RestrictionConfig::new(Duration::from_secs(60)),
        ),
    );
    let denials = Arc::clone(&host.media_denials);
    let on_media_denied: MediaDeniedHandler = Box::new(move |_error: &MediaError| {
        denials.fetch_add(1, Ordering::SeqCst);
    });
    let deps = ScreenDeps {
        api,
        lifecycle: host.lifecycle.clone(),
        clock: host.clock.clone(),
        bridge: Some(bridge),
        media: Some(host.devices.clone()),
        on_media_denied: Some(on_media_denied),
    };
    ExamScreen::open(config, deps, "exam-1", "token").expect("screen should open")
}
