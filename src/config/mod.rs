use std::env;
use std::fmt;
use std::time::Duration;

use crate::api::http::DEFAULT_TIMEOUT_SECS;
use crate::sync::TransitionMode;

/// Distinguishes runtime behavior for different stages of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }

    /// Seed data is only ever loaded outside production.
    pub fn allows_seed_data(self) -> bool {
        self != Self::Production
    }
}

/// Top-level configuration for the client.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub api: ApiConfig,
    pub sync: SyncConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let base_url =
            env::var("APP_API_URL").unwrap_or_else(|_| "http://localhost:5000/api".to_string());
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidApiUrl(base_url));
        }

        let timeout_secs = match env::var("APP_REQUEST_TIMEOUT_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidTimeout)?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        let transition_mode = match env::var("APP_TRANSITION_MODE") {
            Ok(raw) => TransitionMode::parse(&raw).ok_or(ConfigError::InvalidTransitionMode(raw))?,
            Err(_) => TransitionMode::default(),
        };

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            api: ApiConfig {
                base_url,
                timeout_secs,
            },
            sync: SyncConfig { transition_mode },
            telemetry: TelemetryConfig { log_level },
        })
    }
}

/// Where and how the HTTP adapter reaches the backend.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    pub transition_mode: TransitionMode,
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidApiUrl(String),
    InvalidTimeout,
    InvalidTransitionMode(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidApiUrl(url) => {
                write!(f, "APP_API_URL must be an http(s) URL, got '{url}'")
            }
            ConfigError::InvalidTimeout => {
                write!(f, "APP_REQUEST_TIMEOUT_SECS must be a positive integer")
            }
            ConfigError::InvalidTransitionMode(raw) => write!(
                f,
                "APP_TRANSITION_MODE must be 'optimistic' or 'confirmed', got '{raw}'"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_API_URL");
        env::remove_var("APP_REQUEST_TIMEOUT_SECS");
        env::remove_var("APP_TRANSITION_MODE");
        env::remove_var("APP_LOG_LEVEL");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.api.base_url, "http://localhost:5000/api");
        assert_eq!(config.api.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.sync.transition_mode, TransitionMode::Optimistic);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn reads_overrides_from_env() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ENV", "production");
        env::set_var("APP_API_URL", "https://jobs.example.com/api");
        env::set_var("APP_REQUEST_TIMEOUT_SECS", "5");
        env::set_var("APP_TRANSITION_MODE", "confirmed");
        let config = AppConfig::load().expect("config loads");
        reset_env();

        assert_eq!(config.environment, AppEnvironment::Production);
        assert!(!config.environment.allows_seed_data());
        assert_eq!(config.api.base_url, "https://jobs.example.com/api");
        assert_eq!(config.api.timeout_secs, 5);
        assert_eq!(config.sync.transition_mode, TransitionMode::Confirmed);
    }

    #[test]
    fn rejects_invalid_values() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_REQUEST_TIMEOUT_SECS", "0");
        assert!(matches!(AppConfig::load(), Err(ConfigError::InvalidTimeout)));

        reset_env();
        env::set_var("APP_TRANSITION_MODE", "eventually");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidTransitionMode(_))
        ));

        reset_env();
        env::set_var("APP_API_URL", "jobs.example.com");
        assert!(matches!(AppConfig::load(), Err(ConfigError::InvalidApiUrl(_))));
        reset_env();
    }
}
