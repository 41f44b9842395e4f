use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::workflows::registration::AssignmentPolicy;

const MAX_BACKOFF_CAP_MS: u64 = 200;

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

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub workflow: WorkflowConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            workflow: WorkflowConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Knobs for the registration workflow engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub assignment_policy: AssignmentPolicy,
    pub reference_max_attempts: u32,
    pub reference_backoff: Duration,
    pub utc_offset_minutes: i32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            assignment_policy: AssignmentPolicy::AuditedOverride,
            reference_max_attempts: 5,
            reference_backoff: Duration::from_millis(5),
            utc_offset_minutes: 0,
        }
    }
}

impl WorkflowConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let assignment_policy = match env::var("APP_ASSIGNMENT_POLICY") {
            Ok(raw) => AssignmentPolicy::parse(&raw).ok_or(ConfigError::InvalidAssignmentPolicy)?,
            Err(_) => defaults.assignment_policy,
        };

        let reference_max_attempts = match env::var("APP_REFERENCE_MAX_ATTEMPTS") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|attempts| *attempts >= 1)
                .ok_or(ConfigError::InvalidReferenceAttempts)?,
            Err(_) => defaults.reference_max_attempts,
        };

        let reference_backoff = match env::var("APP_REFERENCE_BACKOFF_MS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map(|ms| Duration::from_millis(ms.min(MAX_BACKOFF_CAP_MS)))
                .map_err(|_| ConfigError::InvalidReferenceBackoff)?,
            Err(_) => defaults.reference_backoff,
        };

        let utc_offset_minutes = match env::var("APP_UTC_OFFSET_MINUTES") {
            Ok(raw) => raw
                .trim()
                .parse::<i32>()
                .ok()
                .filter(|minutes| (-720..=840).contains(minutes))
                .ok_or(ConfigError::InvalidUtcOffset)?,
            Err(_) => defaults.utc_offset_minutes,
        };

        Ok(Self {
            assignment_policy,
            reference_max_attempts,
            reference_backoff,
            utc_offset_minutes,
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidAssignmentPolicy,
    InvalidReferenceAttempts,
    InvalidReferenceBackoff,
    InvalidUtcOffset,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidAssignmentPolicy => {
                write!(f, "APP_ASSIGNMENT_POLICY must be 'enforce' or 'audit'")
            }
            ConfigError::InvalidReferenceAttempts => {
                write!(f, "APP_REFERENCE_MAX_ATTEMPTS must be a positive integer")
            }
            ConfigError::InvalidReferenceBackoff => {
                write!(f, "APP_REFERENCE_BACKOFF_MS must be a non-negative integer")
            }
            ConfigError::InvalidUtcOffset => {
                write!(f, "APP_UTC_OFFSET_MINUTES must be an integer between -720 and 840")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
