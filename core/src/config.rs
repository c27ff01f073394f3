//! Connection parameters for the code generation service.

use std::time::Duration;

use crate::error::ApiError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub const ENV_BASE_URL: &str = "EMBEDDED_AI_BASE_URL";
pub const ENV_API_KEY: &str = "EMBEDDED_AI_API_KEY";
pub const ENV_TIMEOUT: &str = "EMBEDDED_AI_TIMEOUT";

/// Immutable client configuration.
///
/// The base URL is stored without a trailing slash so endpoint paths can be
/// appended directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Attach an API key. Blank keys are ignored.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.api_key = if api_key.trim().is_empty() { None } else { Some(api_key) };
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read `EMBEDDED_AI_BASE_URL`, `EMBEDDED_AI_API_KEY` and
    /// `EMBEDDED_AI_TIMEOUT` (whole seconds) from the environment.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let base_url = lookup(ENV_BASE_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ApiError::InvalidArgument(format!("{ENV_BASE_URL} is not set")))?;

        let mut config = Self::new(base_url.trim());
        if let Some(key) = lookup(ENV_API_KEY) {
            config = config.with_api_key(key);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                ApiError::InvalidArgument(format!("{ENV_TIMEOUT} must be whole seconds, got {raw:?}"))
            })?;
            config = config.with_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn trailing_slashes_are_stripped() {
        let config = ClientConfig::new("http://localhost:8080//");
        assert_eq!(config.base_url(), "http://localhost:8080");
    }

    #[test]
    fn defaults_to_sixty_seconds_without_key() {
        let config = ClientConfig::new("http://localhost:8080");
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert!(config.api_key().is_none());
    }

    #[test]
    fn blank_api_key_is_ignored() {
        let config = ClientConfig::new("http://x").with_api_key("  ");
        assert!(config.api_key().is_none());
    }

    #[test]
    fn reads_all_values_from_lookup() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, "https://api.example.com/"),
            (ENV_API_KEY, "secret"),
            (ENV_TIMEOUT, "5"),
        ]))
        .unwrap();
        assert_eq!(config.base_url(), "https://api.example.com");
        assert_eq!(config.api_key(), Some("secret"));
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn missing_base_url_is_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument(_)));
    }

    #[test]
    fn non_numeric_timeout_is_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, "http://localhost"),
            (ENV_TIMEOUT, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument(msg) if msg.contains("soon")));
    }
}
