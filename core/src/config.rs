//! Client configuration.
//!
//! `ClientConfig` is fixed once a client is built. The header set is derived
//! from it on every request, so there is nothing to keep in sync.

/// Environment variable holding the backend base URL.
pub const ENV_BASE_URL: &str = "AI_BACKEND_URL";
/// Environment variable holding an optional bearer token.
pub const ENV_ACCESS_TOKEN: &str = "AI_BACKEND_TOKEN";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("base URL must not be empty")]
    EmptyBaseUrl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    base_url: String,
    access_token: Option<String>,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: None,
        }
    }

    /// Attach a bearer token. An empty token is treated as no token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.access_token = (!token.is_empty()).then_some(token);
        self
    }

    /// Read `AI_BACKEND_URL` and, if set, `AI_BACKEND_TOKEN`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup(ENV_BASE_URL).ok_or(ConfigError::MissingVar(ENV_BASE_URL))?;
        if base_url.trim().is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        let config = Self::new(base_url.trim());
        Ok(match lookup(ENV_ACCESS_TOKEN) {
            Some(token) => config.with_access_token(token),
            None => config,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Headers sent with every request.
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        if let Some(token) = &self.access_token {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        headers
    }
}
