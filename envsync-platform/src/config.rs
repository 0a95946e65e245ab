//! Connection settings for the platform.
//!
//! A [`PlatformConfig`] is an explicit value: the binary builds one from its
//! flags and environment, tests build their own. Nothing here reads the
//! process environment.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryPolicy;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors building a [`PlatformConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no platform URL given; set DOMINO_URL (or DOMINO_API_PROXY)")]
    MissingUrl,

    #[error("invalid platform URL '{0}'")]
    InvalidUrl(String),

    #[error("no credential given; set DOMINO_API_KEY or DOMINO_AUTH_TOKEN")]
    MissingCredential,
}

/// How requests authenticate.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Sent as `X-Domino-Api-Key`.
    ApiKey(String),
    /// Service-account token, sent as `Authorization: Bearer`.
    AuthToken(String),
    /// A local API proxy injects credentials.
    None,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Credential::AuthToken(_) => f.write_str("AuthToken(<redacted>)"),
            Credential::None => f.write_str("None"),
        }
    }
}

/// Everything needed to talk to the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    /// Always ends with `/`.
    pub base_url: String,
    pub credential: Credential,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl PlatformConfig {
    /// Direct connection to `host`. The API key wins if both credentials
    /// are supplied.
    pub fn direct(
        host: &str,
        api_key: Option<String>,
        auth_token: Option<String>,
    ) -> Result<Self, ConfigError> {
        let base_url = normalize_base_url(host)?;
        let credential = match (non_empty(api_key), non_empty(auth_token)) {
            (Some(key), _) => Credential::ApiKey(key),
            (None, Some(token)) => Credential::AuthToken(token),
            (None, None) => return Err(ConfigError::MissingCredential),
        };
        Ok(Self::with_defaults(base_url, credential))
    }

    /// Connection through a local API proxy. The proxy URL is used as given
    /// (no scheme rewrite) and no credential is sent.
    pub fn via_proxy(proxy_url: &str) -> Result<Self, ConfigError> {
        let trimmed = proxy_url.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        if !trimmed.contains("://") {
            return Err(ConfigError::InvalidUrl(trimmed.to_string()));
        }
        Ok(Self::with_defaults(with_trailing_slash(trimmed), Credential::None))
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn with_defaults(base_url: String, credential: Credential) -> Self {
        Self {
            base_url,
            credential,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Force `https`, add a missing scheme and ensure a trailing slash.
///
/// `example.com` → `https://example.com/`,
/// `http://example.com/x` → `https://example.com/x/`.
pub fn normalize_base_url(host: &str) -> Result<String, ConfigError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(ConfigError::MissingUrl);
    }
    let rest = match host.split_once("://") {
        Some((_, rest)) => rest,
        None => host,
    };
    if rest.is_empty() || rest.starts_with('/') || rest.contains(char::is_whitespace) {
        return Err(ConfigError::InvalidUrl(host.to_string()));
    }
    Ok(with_trailing_slash(&format!("https://{rest}")))
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
