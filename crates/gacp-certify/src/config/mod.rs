use std::env;
use std::fmt;
use std::str::FromStr;

use crate::workflows::certification::certificates::is_valid_prefix;
use crate::workflows::certification::config::WorkflowConfig;
use crate::workflows::certification::queue::RetryPolicy;

const DEVELOPMENT_SIGNING_KEY: &str = "gacp-development-signing-key";

/// Distinguishes runtime behavior for different stages of the service.
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
}

/// Top-level configuration for the engine and its adapters.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub telemetry: TelemetryConfig,
    pub queue: QueueConfig,
    pub certificates: CertificateConfig,
    pub workflow: WorkflowConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = LogFormat::from_str(
            &env::var("APP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
        );

        let queue = QueueConfig {
            enabled: parse_bool("GACP_QUEUE_ENABLED", true)?,
            max_attempts: parse_number("GACP_QUEUE_MAX_ATTEMPTS", 3)?,
            backoff_ms: parse_number("GACP_QUEUE_BACKOFF_MS", 2_000)?,
            poll_interval_ms: parse_number("GACP_QUEUE_POLL_MS", 250)?,
        };

        let mut workflow = WorkflowConfig::default();
        workflow.auto_transition_delay_secs = parse_number(
            "GACP_AUTO_TRANSITION_DELAY_SECS",
            workflow.auto_transition_delay_secs,
        )?;
        if let Ok(prefix) = env::var("GACP_CERTIFICATE_PREFIX") {
            let prefix = prefix.trim().to_ascii_uppercase();
            if !prefix.is_empty() {
                if !is_valid_prefix(&prefix) {
                    return Err(ConfigError::InvalidCertificatePrefix(prefix));
                }
                workflow.certificates.prefix = prefix;
            }
        }
        let validity_months = parse_number(
            "GACP_CERTIFICATE_VALIDITY_MONTHS",
            workflow.certificates.validity_months,
        )?;
        workflow.set_certificate_validity(validity_months);

        let signing_key = match env::var("CERTIFICATE_SIGNING_KEY") {
            Ok(key) if !key.trim().is_empty() => key,
            _ if environment == AppEnvironment::Production => {
                return Err(ConfigError::MissingSigningKey)
            }
            _ => DEVELOPMENT_SIGNING_KEY.to_string(),
        };

        Ok(Self {
            environment,
            telemetry: TelemetryConfig {
                log_level,
                log_format,
            },
            queue,
            certificates: CertificateConfig { signing_key },
            workflow,
        })
    }
}

fn parse_number<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBoolean { key, value }),
        },
        Err(_) => Ok(default),
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Background task queue settings. `enabled = false` runs every job inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub poll_interval_ms: u64,
}

impl QueueConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_backoff_ms: self.backoff_ms,
        }
    }
}

/// Key material for certificate signatures.
#[derive(Clone)]
pub struct CertificateConfig {
    pub signing_key: String,
}

impl fmt::Debug for CertificateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateConfig")
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidNumber { key: &'static str, value: String },
    InvalidBoolean { key: &'static str, value: String },
    InvalidCertificatePrefix(String),
    MissingSigningKey,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be a non-negative number (got '{value}')")
            }
            ConfigError::InvalidBoolean { key, value } => {
                write!(f, "{key} must be true or false (got '{value}')")
            }
            ConfigError::InvalidCertificatePrefix(prefix) => write!(
                f,
                "GACP_CERTIFICATE_PREFIX may only hold letters, digits and inner hyphens (got '{prefix}')"
            ),
            ConfigError::MissingSigningKey => {
                write!(f, "CERTIFICATE_SIGNING_KEY is required in production")
            }
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
        for key in [
            "APP_ENV",
            "APP_LOG_LEVEL",
            "APP_LOG_FORMAT",
            "GACP_QUEUE_ENABLED",
            "GACP_QUEUE_MAX_ATTEMPTS",
            "GACP_QUEUE_BACKOFF_MS",
            "GACP_QUEUE_POLL_MS",
            "GACP_AUTO_TRANSITION_DELAY_SECS",
            "GACP_CERTIFICATE_PREFIX",
            "GACP_CERTIFICATE_VALIDITY_MONTHS",
            "CERTIFICATE_SIGNING_KEY",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.telemetry.log_format, LogFormat::Compact);
        assert!(config.queue.enabled);
        assert_eq!(config.queue.retry_policy(), RetryPolicy::default());
        assert_eq!(config.workflow.auto_transition_delay_secs, 1);
        assert_eq!(config.workflow.certificates.prefix, "GACP");
        assert_eq!(config.workflow.certificates.validity_months, 24);
        assert_eq!(config.certificates.signing_key, DEVELOPMENT_SIGNING_KEY);
    }

    #[test]
    fn reads_queue_and_certificate_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("GACP_QUEUE_ENABLED", "off");
        env::set_var("GACP_QUEUE_MAX_ATTEMPTS", "5");
        env::set_var("GACP_CERTIFICATE_PREFIX", "thgacp");
        env::set_var("APP_LOG_FORMAT", "JSON");
        let config = AppConfig::load().expect("config loads");
        assert!(!config.queue.enabled);
        assert_eq!(config.queue.retry_policy().max_attempts, 5);
        assert_eq!(config.workflow.certificates.prefix, "THGACP");
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
        reset_env();
    }

    #[test]
    fn rejects_malformed_numbers_and_booleans() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("GACP_QUEUE_BACKOFF_MS", "soon");
        match AppConfig::load() {
            Err(ConfigError::InvalidNumber { key, .. }) => assert_eq!(key, "GACP_QUEUE_BACKOFF_MS"),
            other => panic!("expected invalid number, got {other:?}"),
        }

        reset_env();
        env::set_var("GACP_QUEUE_ENABLED", "maybe");
        match AppConfig::load() {
            Err(ConfigError::InvalidBoolean { key, .. }) => assert_eq!(key, "GACP_QUEUE_ENABLED"),
            other => panic!("expected invalid boolean, got {other:?}"),
        }
        reset_env();
    }

    #[test]
    fn certificate_prefix_and_validity_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("GACP_CERTIFICATE_PREFIX", " th-gacp ");
        env::set_var("GACP_CERTIFICATE_VALIDITY_MONTHS", "36");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.workflow.certificates.prefix, "TH-GACP");
        assert_eq!(config.workflow.certificates.validity_months, 36);
        assert_eq!(config.workflow.scoring.approved_validity_months, 36);

        for bad in ["GACP 2", "-GACP", "GACP-", "GACP/TH"] {
            env::set_var("GACP_CERTIFICATE_PREFIX", bad);
            match AppConfig::load() {
                Err(ConfigError::InvalidCertificatePrefix(_)) => {}
                other => panic!("expected invalid prefix for {bad:?}, got {other:?}"),
            }
        }
        reset_env();
    }

    #[test]
    fn production_requires_signing_key() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ENV", "production");
        match AppConfig::load() {
            Err(ConfigError::MissingSigningKey) => {}
            other => panic!("expected missing signing key, got {other:?}"),
        }

        env::set_var("CERTIFICATE_SIGNING_KEY", "prod-secret");
        let config = AppConfig::load().expect("config loads with key");
        assert_eq!(config.environment, AppEnvironment::Production);
        assert_eq!(config.certificates.signing_key, "prod-secret");
        reset_env();
    }
}
