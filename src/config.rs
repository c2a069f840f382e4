//! Client configuration parsed from environment variables.

use std::path::PathBuf;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_LOGIN_PAGE: &str = "/login";
pub const FALLBACK_TOKEN_FILE: &str = ".voyage-token";

/// Errors produced while reading client configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable was present but its value could not be used.
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeouts: Timeouts,
    pub token_file: PathBuf,
    pub login_page: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeouts: Timeouts {
                request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            },
            token_file: PathBuf::from(FALLBACK_TOKEN_FILE),
            login_page: DEFAULT_LOGIN_PAGE.to_owned(),
        }
    }
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `VOYAGE_BASE_URL`: API origin, default `http://127.0.0.1:5000`
    /// - `VOYAGE_REQUEST_TIMEOUT_SECS`: default 10
    /// - `VOYAGE_CONNECT_TIMEOUT_SECS`: default 5
    /// - `VOYAGE_TOKEN_FILE`: default `$HOME/.voyage/token`
    /// - `VOYAGE_LOGIN_PAGE`: redirect target on 401, default `/login`
    ///
    /// # Errors
    ///
    /// Returns an error if a timeout is not a positive integer or the base
    /// URL is blank.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`], reading values through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("VOYAGE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        let base_url = base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return Err(ConfigError::Invalid { key: "VOYAGE_BASE_URL", reason: "must not be empty".into() });
        }

        let timeouts = Timeouts {
            request_secs: parse_secs(&lookup, "VOYAGE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
            connect_secs: parse_secs(&lookup, "VOYAGE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?,
        };

        let token_file = lookup("VOYAGE_TOKEN_FILE")
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| default_token_file(lookup("HOME")), PathBuf::from);

        let login_page = lookup("VOYAGE_LOGIN_PAGE")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOGIN_PAGE.to_owned());

        Ok(Self { base_url, timeouts, token_file, login_page })
    }
}

fn parse_secs<F>(lookup: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    let secs = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::Invalid { key, reason: e.to_string() })?;
    if secs == 0 {
        return Err(ConfigError::Invalid { key, reason: "must be greater than zero".into() });
    }
    Ok(secs)
}

fn default_token_file(home: Option<String>) -> PathBuf {
    match home {
        Some(home) if !home.is_empty() => PathBuf::from(home).join(".voyage").join("token"),
        _ => PathBuf::from(FALLBACK_TOKEN_FILE),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
