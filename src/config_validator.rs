use crate::error::Error;

/// Validates configuration values for consistency and correctness
pub struct ConfigValidator;

const VALID_ENVIRONMENTS: [&str; 4] = ["development", "staging", "production", "test"];
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_LOG_FORMATS: [&str; 2] = ["json", "console"];

impl ConfigValidator {
    /// Validates a bind host and port
    pub fn validate_bind_address(host: &str, port: u16) -> Result<(), Error> {
        if host.is_empty() {
            return Err(Error::Validation("Server host cannot be empty".to_string()));
        }

        if port == 0 {
            return Err(Error::Validation(
                "Server port must be greater than 0".to_string(),
            ));
        }

        if host.chars().any(char::is_whitespace) {
            return Err(Error::Validation(format!(
                "Server host '{}' must not contain whitespace",
                host
            )));
        }

        Ok(())
    }

    /// Validates environment name
    pub fn validate_environment(env: &str) -> Result<(), Error> {
        if !VALID_ENVIRONMENTS.contains(&env.to_lowercase().as_str()) {
            return Err(Error::Validation(format!(
                "Invalid environment '{}'. Must be one of: {:?}",
                env, VALID_ENVIRONMENTS
            )));
        }

        Ok(())
    }

    /// Validates a log level name
    pub fn validate_log_level(level: &str) -> Result<(), Error> {
        if !VALID_LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
            return Err(Error::Validation(format!(
                "Invalid log level '{}'. Must be one of: {:?}",
                level, VALID_LOG_LEVELS
            )));
        }

        Ok(())
    }

    /// Validates a log format name
    pub fn validate_log_format(format: &str) -> Result<(), Error> {
        if !VALID_LOG_FORMATS.contains(&format.to_lowercase().as_str()) {
            return Err(Error::Validation(format!(
                "Invalid log format '{}'. Must be one of: {:?}",
                format, VALID_LOG_FORMATS
            )));
        }

        Ok(())
    }

    /// Validates an allowed-origin entry
    pub fn validate_origin_pattern(pattern: &str) -> Result<(), Error> {
        if pattern == "*" {
            return Err(Error::Validation(
                "Wildcard '*' is not accepted as an allowed origin".to_string(),
            ));
        }

        let host = pattern
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(pattern);
        if host.trim_start_matches("*.").is_empty() {
            return Err(Error::Validation(format!(
                "Allowed origin '{}' has no host",
                pattern
            )));
        }

        Ok(())
    }
}
