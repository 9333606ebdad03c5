//! Client configuration.

use std::time::Duration;

use doccheck_core::ApiUrl;

/// Upper bound on any single request, including the token refresh.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for an [`AuthClient`](crate::AuthClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) api_url: ApiUrl,
    pub(crate) timeout: Option<Duration>,
    pub(crate) user_agent: String,
}

impl ClientConfig {
    /// Default configuration for the given API base URL.
    pub fn new(api_url: ApiUrl) -> Self {
        Self {
            api_url,
            timeout: Some(DEFAULT_TIMEOUT),
            user_agent: concat!("doccheck/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Bound every request by `timeout`; expiry surfaces as a network error.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Let requests run for as long as the server takes.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn api_url(&self) -> &ApiUrl {
        &self.api_url
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::new(ApiUrl::new("http://127.0.0.1:8000/api").unwrap());
        assert_eq!(config.timeout(), Some(DEFAULT_TIMEOUT));
        assert!(config.user_agent.starts_with("doccheck/"));
    }

    #[test]
    fn timeout_can_be_lifted() {
        let config = ClientConfig::new(ApiUrl::new("http://127.0.0.1:8000/api").unwrap())
            .with_timeout(Duration::from_secs(5))
            .without_timeout();
        assert_eq!(config.timeout(), None);
    }
}
