//! Blocking client for the AI backend REST API.
//!
//! # Overview
//! One method per endpoint: authentication, API tokens, private AI keys,
//! regions, users, audit logs and the health check. Each call issues exactly
//! one HTTP request and returns the decoded JSON body, or a `ClientError`
//! that separates server rejections (`ApiError`) from transport failures.
//!
//! # Design
//! - `BackendClient` holds only immutable configuration and a transport, so
//!   it can be shared across threads.
//! - Requests and responses are plain data (`HttpRequest`/`HttpResponse`);
//!   the `Transport` trait is the only place I/O happens.
//! - `build_request` and `parse_response` are public for callers that want
//!   to execute the exchange themselves.
//!
//! ```no_run
//! use ai_backend_client::BackendClient;
//!
//! let client = BackendClient::with_access_token("https://api.example.com", "tok123");
//! let regions = client.list_regions()?;
//! println!("{regions}");
//! # Ok::<(), ai_backend_client::ClientError>(())
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod transport;
pub mod types;

pub use client::{parse_response, BackendClient};
pub use config::{ClientConfig, ConfigError};
pub use error::{ApiError, ClientError, Result, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use transport::{Transport, UreqTransport};
pub use types::{
    CreatePrivateAiKey, CreateToken, Credentials, LoginRequest, ProfileUpdate, RegionCreate,
    RegionUpdate, UserUpdate,
};
