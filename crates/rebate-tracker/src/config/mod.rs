use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

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

        let storage_secret = match env::var("APP_STORAGE_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ if environment == AppEnvironment::Production => {
                return Err(ConfigError::MissingStorageSecret)
            }
            _ => DEVELOPMENT_STORAGE_SECRET.to_string(),
        };

        let admin_subject = match env::var("APP_ADMIN_SUBJECT") {
            Ok(subject) if !subject.trim().is_empty() => subject.trim().to_string(),
            _ if environment == AppEnvironment::Production => {
                return Err(ConfigError::MissingAdminSubject)
            }
            _ => DEVELOPMENT_ADMIN_SUBJECT.to_string(),
        };

        let workflow = WorkflowConfig {
            admin_subject,
            download_ttl_secs: numeric_var("APP_DOWNLOAD_TTL_SECS", 300, MAX_DOWNLOAD_TTL_SECS)?,
            max_upload_bytes: numeric_var(
                "APP_MAX_UPLOAD_BYTES",
                10 * 1024 * 1024,
                MAX_UPLOAD_BYTES,
            )?,
            match_limit: numeric_var("APP_MATCH_LIMIT", 5, MAX_MATCH_LIMIT)?,
            storage_secret,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            workflow,
        })
    }
}

const DEVELOPMENT_STORAGE_SECRET: &str = "development-only-storage-secret";
const DEVELOPMENT_ADMIN_SUBJECT: &str = "admin";

/// One week.
pub const MAX_DOWNLOAD_TTL_SECS: u64 = 7 * 24 * 60 * 60;
/// 1 GiB.
pub const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;
pub const MAX_MATCH_LIMIT: usize = 100;

fn numeric_var<T>(name: &'static str, default: T, max: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + fmt::Display,
{
    let Ok(raw) = env::var(name) else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value <= max => Ok(value),
        _ => Err(ConfigError::InvalidNumber {
            name,
            value: raw,
            max: max.to_string(),
        }),
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Rebate workflow tunables.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Subject that receives admin notifications and may read any inbox entry.
    pub admin_subject: String,
    pub download_ttl_secs: u64,
    pub max_upload_bytes: usize,
    pub match_limit: usize,
    /// Key for signing download URLs.
    pub storage_secret: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber {
        name: &'static str,
        value: String,
        max: String,
    },
    MissingStorageSecret,
    MissingAdminSubject,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name, value, max } => {
                write!(f, "{name} must be an integer between 0 and {max} (got '{value}')")
            }
            ConfigError::MissingStorageSecret => {
                write!(f, "APP_STORAGE_SECRET must be set in production")
            }
            ConfigError::MissingAdminSubject => {
                write!(f, "APP_ADMIN_SUBJECT must be set in production")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::MissingStorageSecret
            | ConfigError::MissingAdminSubject => None,
        }
    }
}
