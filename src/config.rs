use envconfig::Envconfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

use crate::config_validator::ConfigValidator;
use crate::error::{Error, Result};

/// Rate limiting window; `requests_per_minute` is always counted over it.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Envconfig, Validate, Clone)]
pub struct Config {
    /// Deployment environment name
    #[envconfig(from = "ENVIRONMENT", default = "development")]
    pub environment: String,

    /// Server bind host
    #[envconfig(from = "HOST", default = "0.0.0.0")]
    #[validate(length(min = 1))]
    pub host: String,

    /// Server bind port
    #[envconfig(from = "PORT", default = "8080")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Per-request timeout in seconds
    #[envconfig(from = "REQUEST_TIMEOUT_SECS", default = "60")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    /// Grace period for in-flight requests on shutdown
    #[envconfig(from = "SHUTDOWN_TIMEOUT_SECS", default = "30")]
    pub shutdown_timeout_secs: u64,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,

    /// `json` or `console`
    #[envconfig(from = "LOG_FORMAT", default = "json")]
    pub log_format: String,

    #[envconfig(from = "RATE_LIMIT_ENABLED", default = "true")]
    pub rate_limit_enabled: bool,

    #[envconfig(from = "RATE_LIMIT_REQUESTS_PER_MINUTE", default = "100")]
    #[validate(range(min = 1))]
    pub rate_limit_requests_per_minute: u32,

    /// Minimum interval between idle limiter sweeps, in seconds
    #[envconfig(from = "RATE_LIMIT_SWEEP_INTERVAL_SECS", default = "300")]
    #[validate(range(min = 1))]
    pub rate_limit_sweep_interval_secs: u64,

    /// Comma separated list of allowed origins
    #[envconfig(from = "CORS_ALLOWED_ORIGINS", default = "")]
    pub cors_allowed_origins: String,

    #[envconfig(from = "CORS_ALLOWED_METHODS", default = "GET,POST,PUT,PATCH,DELETE,OPTIONS")]
    pub cors_allowed_methods: String,

    #[envconfig(
        from = "CORS_ALLOWED_HEADERS",
        default = "Accept,Authorization,Content-Type,X-Request-ID"
    )]
    pub cors_allowed_headers: String,

    #[envconfig(
        from = "CORS_EXPOSED_HEADERS",
        default = "X-Request-ID,X-RateLimit-Limit,X-RateLimit-Remaining,X-RateLimit-Reset,X-RateLimit-Window,Retry-After"
    )]
    pub cors_exposed_headers: String,

    #[envconfig(from = "CORS_ALLOW_CREDENTIALS", default = "false")]
    pub cors_allow_credentials: bool,

    #[envconfig(from = "CORS_MAX_AGE_SECS", default = "300")]
    pub cors_max_age_secs: u64,
}

/// Settings consumed by the rate limiting middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub requests_per_minute: u32,
    pub window: Duration,
    pub sweep_interval: Duration,
}

/// Settings consumed by the CORS layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsSettings {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Console,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 60,
            shutdown_timeout_secs: 30,
            log_level: "info".to_string(),
            log_format: "json".to_string(),
            rate_limit_enabled: true,
            rate_limit_requests_per_minute: 100,
            rate_limit_sweep_interval_secs: 300,
            cors_allowed_origins: String::new(),
            cors_allowed_methods: "GET,POST,PUT,PATCH,DELETE,OPTIONS".to_string(),
            cors_allowed_headers: "Accept,Authorization,Content-Type,X-Request-ID".to_string(),
            cors_exposed_headers: "X-Request-ID,X-RateLimit-Limit,X-RateLimit-Remaining,X-RateLimit-Reset,X-RateLimit-Window,Retry-After".to_string(),
            cors_allow_credentials: false,
            cors_max_age_secs: 300,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config::init_from_env()?)
    }

    /// Run field validation and the cross-field checks.
    pub fn validate_all(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::Validation(e.to_string()))?;

        ConfigValidator::validate_environment(&self.environment)?;
        ConfigValidator::validate_log_level(&self.log_level)?;
        ConfigValidator::validate_log_format(&self.log_format)?;
        ConfigValidator::validate_bind_address(&self.host, self.port)?;
        for origin in split_list(&self.cors_allowed_origins) {
            ConfigValidator::validate_origin_pattern(&origin)?;
        }

        Ok(())
    }

    /// `host:port` to bind. Hostnames are resolved when the listener binds.
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn rate_limit(&self) -> RateLimitSettings {
        RateLimitSettings {
            enabled: self.rate_limit_enabled,
            requests_per_minute: self.rate_limit_requests_per_minute,
            window: RATE_LIMIT_WINDOW,
            sweep_interval: Duration::from_secs(self.rate_limit_sweep_interval_secs),
        }
    }

    pub fn cors(&self) -> CorsSettings {
        CorsSettings {
            allowed_origins: split_list(&self.cors_allowed_origins),
            allowed_methods: split_list(&self.cors_allowed_methods),
            allowed_headers: split_list(&self.cors_allowed_headers),
            exposed_headers: split_list(&self.cors_exposed_headers),
            allow_credentials: self.cors_allow_credentials,
            max_age: Duration::from_secs(self.cors_max_age_secs),
        }
    }

    pub fn logging(&self) -> LoggingSettings {
        let format = if self.log_format.eq_ignore_ascii_case("console") {
            LogFormat::Console
        } else {
            LogFormat::Json
        };
        LoggingSettings {
            level: self.log_level.to_lowercase(),
            format,
        }
    }
}

/// Load a dotenv file into the process environment.
///
/// An explicit path must exist. Without one, `.env` and then `.env.example`
/// are looked up in the working directory and up to two parents; finding
/// none is not an error. Returns the file that was loaded.
pub fn load_env_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        dotenv::from_path(path).map_err(|source| Error::EnvFile {
            path: path.display().to_string(),
            source,
        })?;
        return Ok(Some(path.to_path_buf()));
    }

    for name in [".env", ".env.example"] {
        for dir in [".", "..", "../.."] {
            let candidate = Path::new(dir).join(name);
            if candidate.is_file() {
                dotenv::from_path(&candidate).map_err(|source| Error::EnvFile {
                    path: candidate.display().to_string(),
                    source,
                })?;
                return Ok(Some(candidate));
            }
        }
    }

    Ok(None)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
