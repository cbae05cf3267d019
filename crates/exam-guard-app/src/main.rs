#![warn(missing_docs)]
//! # exam-guard-app binary
//!
//! Prints the build version and effective configuration. The exam screen
//! itself is embedded by the desktop, browser or mobile host shell.

use exam_guard_app::{
    AppConfig, ENV_LOCKDOWN_ENABLED, ENV_PROCTORING_ENABLED, app_version, redact_url,
};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// CLI entry point.
fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    println!("exam-guard-app {}", app_version());

    match AppConfig::from_env() {
        Ok(config) => {
            println!("api_base={}", redact_url(&config.api_base));
            println!("lockdown_enabled={} ({ENV_LOCKDOWN_ENABLED})", config.lockdown_enabled);
            println!(
                "proctoring_enabled={} ({ENV_PROCTORING_ENABLED})",
                config.proctoring_enabled
            );
            println!("user_agent={}", config.user_agent);
        }
        Err(error) => {
            tracing::error!(category = ?error.category(), %error, "configuration rejected");
            std::process::exit(2);
        }
    }
}
