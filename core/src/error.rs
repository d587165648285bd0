//! Error types for the AI backend client.
//!
//! # Design
//! Two failure kinds are kept apart. `ApiError` means the server answered
//! with a non-2xx status; it carries the status and whatever JSON body came
//! back. Everything below the HTTP layer (refused connections, broken reads)
//! is a `TransportError`. `ClientError` is the union callers match on.

use serde_json::Value;

/// The server answered with a status outside `200..300`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    status: u16,
    message: String,
    body: Option<Value>,
}

impl ApiError {
    /// Error for `status` with the generic failure message and no body.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            message: format!("API request failed with status code: {status}"),
            body: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Decoded response body, `None` when it was empty or not JSON.
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// The `detail` field most backend errors carry, if present.
    pub fn detail(&self) -> Option<&str> {
        self.body.as_ref()?.get("detail")?.as_str()
    }
}

/// The HTTP exchange itself failed.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Errors returned by `BackendClient` operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A 2xx response whose body was present but not JSON.
    #[error("response with status {status} is not valid JSON: {source}")]
    Decode {
        status: u16,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize request payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// The `ApiError` behind this error, if the server rejected the request.
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            ClientError::Api(err) => Some(err),
            _ => None,
        }
    }

    /// HTTP status, for errors that got as far as a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api(err) => Some(err.status()),
            ClientError::Decode { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
