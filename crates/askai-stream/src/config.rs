use std::time::Duration;

use crate::errors::ChatError;

/// Environment variable holding the chat endpoint URL.
pub const ENDPOINT_VAR: &str = "ASKAI_ENDPOINT";
/// Environment variable holding the optional `api-key` header value.
pub const API_KEY_VAR: &str = "ASKAI_API_KEY";
/// Environment variable overriding the request timeout, in seconds.
pub const TIMEOUT_VAR: &str = "ASKAI_TIMEOUT_SECS";
/// Environment variable overriding the partial-update throttle, in milliseconds.
pub const THROTTLE_VAR: &str = "ASKAI_THROTTLE_MS";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_THROTTLE: Duration = Duration::from_millis(50);

/// Configuration for the chat endpoint client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatClientConfig {
    /// URL that receives `POST {query, sessionId}`.
    pub endpoint: String,
    /// Sent as the `api-key` header when present.
    pub api_key: Option<String>,
    /// Whole-request HTTP timeout.
    pub timeout: Duration,
    /// Pause after each partial-text update. Zero disables it.
    pub update_throttle: Duration,
}

impl ChatClientConfig {
    /// Creates a config with default timeout and throttle.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            update_throttle: DEFAULT_THROTTLE,
        }
    }

    /// Builds a config from `ASKAI_*` environment variables.
    pub fn from_env() -> Result<Self, ChatError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ChatError> {
        let endpoint = lookup(ENDPOINT_VAR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ChatError::Config(format!("missing {ENDPOINT_VAR} for chat client")))?;

        let mut config = Self::new(endpoint);
        if let Some(key) = lookup(API_KEY_VAR).filter(|k| !k.trim().is_empty()) {
            config.api_key = Some(key);
        }
        if let Some(secs) = parse_u64(&lookup, TIMEOUT_VAR)? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(millis) = parse_u64(&lookup, THROTTLE_VAR)? {
            config.update_throttle = Duration::from_millis(millis);
        }
        Ok(config)
    }

    /// Sets the `api-key` header value.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Overrides the HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the partial-update throttle.
    pub fn update_throttle(mut self, throttle: Duration) -> Self {
        self.update_throttle = throttle;
        self
    }
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<u64>, ChatError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ChatError::Config(format!("invalid {key} value {raw:?}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_endpoint_is_set() {
        let config =
            ChatClientConfig::from_lookup(lookup_from(&[(ENDPOINT_VAR, "http://x/api/chat/")]))
                .expect("config");
        assert_eq!(config.endpoint, "http://x/api/chat/");
        assert_eq!(config.api_key, None);
        assert_eq!(config.timeout, Duration::from_secs(120));
        assert_eq!(config.update_throttle, Duration::from_millis(50));
    }

    #[test]
    fn reads_overrides() {
        let config = ChatClientConfig::from_lookup(lookup_from(&[
            (ENDPOINT_VAR, "http://x"),
            (API_KEY_VAR, "secret"),
            (TIMEOUT_VAR, "5"),
            (THROTTLE_VAR, "0"),
        ]))
        .expect("config");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.update_throttle.is_zero());
    }

    #[test]
    fn missing_endpoint_is_a_config_error() {
        let err = ChatClientConfig::from_lookup(lookup_from(&[])).expect_err("should fail");
        assert!(matches!(err, ChatError::Config(msg) if msg.contains(ENDPOINT_VAR)));
    }

    #[test]
    fn bad_numbers_are_config_errors() {
        let err = ChatClientConfig::from_lookup(lookup_from(&[
            (ENDPOINT_VAR, "http://x"),
            (THROTTLE_VAR, "fast"),
        ]))
        .expect_err("should fail");
        assert!(matches!(err, ChatError::Config(msg) if msg.contains(THROTTLE_VAR)));
    }
}
