//! Request builder, response decoder and per-endpoint facade for the AI
//! backend API.
//!
//! # Design
//! `BackendClient` holds an immutable `ClientConfig` and a `Transport`, and
//! carries no mutable state between calls. Every endpoint method goes through
//! the same three steps: `build_request` produces an `HttpRequest`, the
//! transport executes it once, and `parse_response` maps the status code to
//! success or `ApiError`. The first and last steps are public so a caller can
//! run the exchange itself.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::{ClientConfig, ConfigError};
use crate::error::{ApiError, ClientError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::transport::{Transport, UreqTransport};
use crate::types::{CreatePrivateAiKey, CreateToken, Credentials, LoginRequest};

/// Blocking client for the AI backend API.
///
/// Each method issues exactly one request and returns the decoded JSON body.
#[derive(Debug, Clone)]
pub struct BackendClient<T = UreqTransport> {
    config: ClientConfig,
    transport: T,
}

impl BackendClient<UreqTransport> {
    pub fn new(base_url: &str) -> Self {
        Self::from_config(ClientConfig::new(base_url))
    }

    pub fn with_access_token(base_url: &str, token: impl Into<String>) -> Self {
        Self::from_config(ClientConfig::new(base_url).with_access_token(token))
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self::with_transport(config, UreqTransport::new())
    }

    /// Build a client from `AI_BACKEND_URL` / `AI_BACKEND_TOKEN`.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Ok(Self::from_config(ClientConfig::from_env()?))
    }
}

impl<T: Transport> BackendClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Auth
    // -----------------------------------------------------------------------

    pub fn login(&self, email: &str, password: &str) -> Result<Value> {
        self.post(
            "/auth/login",
            &LoginRequest {
                username: email.to_string(),
                password: password.to_string(),
            },
        )
    }

    pub fn logout(&self) -> Result<Value> {
        self.post("/auth/logout", &())
    }

    pub fn register(&self, email: &str, password: &str) -> Result<Value> {
        self.post("/auth/register", &credentials(email, password))
    }

    pub fn get_me(&self) -> Result<Value> {
        self.get("/auth/me", &[])
    }

    /// Update the current user. See [`ProfileUpdate`](crate::ProfileUpdate)
    /// for the usual fields.
    pub fn update_me(&self, data: &impl Serialize) -> Result<Value> {
        self.put("/auth/me/update", data)
    }

    // -----------------------------------------------------------------------
    // API tokens
    // -----------------------------------------------------------------------

    pub fn create_token(&self, name: &str) -> Result<Value> {
        self.post(
            "/auth/token",
            &CreateToken {
                name: name.to_string(),
            },
        )
    }

    pub fn list_tokens(&self) -> Result<Value> {
        self.get("/auth/token", &[])
    }

    pub fn delete_token(&self, token_id: &str) -> Result<Value> {
        self.delete(&format!("/auth/token/{token_id}"))
    }

    // -----------------------------------------------------------------------
    // Private AI keys
    // -----------------------------------------------------------------------

    /// Provision a key in `region_id`. `user_id` is sent only when it is a
    /// positive id; otherwise the key belongs to the caller.
    pub fn create_private_ai_key(
        &self,
        region_id: i64,
        name: &str,
        user_id: Option<i64>,
    ) -> Result<Value> {
        self.post(
            "/private-ai-keys",
            &CreatePrivateAiKey {
                region_id,
                name: name.to_string(),
                user_id: user_id.filter(|id| *id > 0),
            },
        )
    }

    pub fn list_private_ai_keys(&self) -> Result<Value> {
        self.get("/private-ai-keys", &[])
    }

    pub fn delete_private_ai_key(&self, key_name: &str) -> Result<Value> {
        self.delete(&format!("/private-ai-keys/{key_name}"))
    }

    // -----------------------------------------------------------------------
    // Regions
    // -----------------------------------------------------------------------

    pub fn list_regions(&self) -> Result<Value> {
        self.get("/regions", &[])
    }

    pub fn get_region(&self, region_id: i64) -> Result<Value> {
        self.get(&format!("/regions/{region_id}"), &[])
    }

    pub fn create_region(&self, data: &impl Serialize) -> Result<Value> {
        self.post("/regions", data)
    }

    pub fn update_region(&self, region_id: i64, data: &impl Serialize) -> Result<Value> {
        self.put(&format!("/regions/{region_id}"), data)
    }

    pub fn delete_region(&self, region_id: i64) -> Result<Value> {
        self.delete(&format!("/regions/{region_id}"))
    }

    pub fn list_admin_regions(&self) -> Result<Value> {
        self.get("/regions/admin", &[])
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    pub fn list_users(&self) -> Result<Value> {
        self.get("/users", &[])
    }

    pub fn get_user(&self, user_id: i64) -> Result<Value> {
        self.get(&format!("/users/{user_id}"), &[])
    }

    pub fn create_user(&self, email: &str, password: &str) -> Result<Value> {
        self.post("/users", &credentials(email, password))
    }

    pub fn update_user(&self, user_id: i64, data: &impl Serialize) -> Result<Value> {
        self.put(&format!("/users/{user_id}"), data)
    }

    pub fn delete_user(&self, user_id: i64) -> Result<Value> {
        self.delete(&format!("/users/{user_id}"))
    }

    pub fn search_users(&self, email: &str) -> Result<Value> {
        self.get("/users/search", &[("email", email)])
    }

    // -----------------------------------------------------------------------
    // Audit and health
    // -----------------------------------------------------------------------

    pub fn get_audit_logs(&self) -> Result<Value> {
        self.get("/audit/logs", &[])
    }

    pub fn get_audit_logs_metadata(&self) -> Result<Value> {
        self.get("/audit/logs/metadata", &[])
    }

    pub fn health(&self) -> Result<Value> {
        self.get("/health", &[])
    }

    // -----------------------------------------------------------------------
    // Request plumbing
    // -----------------------------------------------------------------------

    /// Build the request for `method` on `path`.
    ///
    /// `query` pairs are form-urlencoded onto the URL. `payload` becomes the
    /// JSON body unless it serializes to `null`, `{}` or `[]`; GET requests
    /// never carry a body.
    pub fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(&str, &str)],
        payload: &impl Serialize,
    ) -> Result<HttpRequest> {
        let mut url = format!("{}{path}", self.config.base_url());
        if !query.is_empty() {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(query)
                .finish();
            url.push('?');
            url.push_str(&encoded);
        }

        let body = match method {
            HttpMethod::Get => None,
            _ => encode_body(payload)?,
        };

        Ok(HttpRequest {
            method,
            url,
            headers: self.config.headers(),
            body,
        })
    }

    fn send(&self, request: HttpRequest) -> Result<Value> {
        debug!(method = %request.method, url = %request.url, "sending request");
        let response = self.transport.execute(request)?;
        debug!(status = response.status, "received response");
        parse_response(response)
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        self.send(self.build_request(HttpMethod::Get, path, query, &())?)
    }

    fn post(&self, path: &str, payload: &impl Serialize) -> Result<Value> {
        self.send(self.build_request(HttpMethod::Post, path, &[], payload)?)
    }

    fn put(&self, path: &str, payload: &impl Serialize) -> Result<Value> {
        self.send(self.build_request(HttpMethod::Put, path, &[], payload)?)
    }

    fn delete(&self, path: &str) -> Result<Value> {
        self.send(self.build_request(HttpMethod::Delete, path, &[], &())?)
    }
}

fn credentials(email: &str, password: &str) -> Credentials {
    Credentials {
        email: email.to_string(),
        password: password.to_string(),
    }
}

/// Serialize `payload`, or `None` when there is nothing worth sending.
fn encode_body(payload: &impl Serialize) -> Result<Option<String>> {
    let value = serde_json::to_value(payload)?;
    let is_empty = match &value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    };
    if is_empty {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(&value)?))
}

/// Map a response to its decoded body or an error.
///
/// Non-2xx statuses become `ApiError`, with the body attached when it is
/// JSON. On success an empty body decodes to `Value::Null`; a non-empty body
/// that is not JSON is a `Decode` error.
pub fn parse_response(response: HttpResponse) -> Result<Value> {
    let text = response.body.trim();

    if !response.is_success() {
        let body = if text.is_empty() {
            None
        } else {
            serde_json::from_str(text).ok()
        };
        debug!(status = response.status, "request rejected by server");
        return Err(ApiError::new(response.status).with_body(body).into());
    }

    if text.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|source| ClientError::Decode {
        status: response.status,
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::error::TransportError;
    use crate::types::{RegionUpdate, UserUpdate};

    const BASE_URL: &str = "https://api.example.com";

    /// Records every request and answers each with the same canned response.
    struct MockTransport {
        requests: Mutex<Vec<HttpRequest>>,
        response: HttpResponse,
    }

    impl MockTransport {
        fn replying(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                response: HttpResponse {
                    status,
                    headers: Vec::new(),
                    body: body.to_string(),
                },
            })
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn only_request(&self) -> HttpRequest {
            let requests = self.requests();
            assert_eq!(requests.len(), 1, "expected exactly one request");
            requests.into_iter().next().unwrap()
        }
    }

    impl Transport for MockTransport {
        fn execute(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
            self.requests.lock().unwrap().push(request);
            Ok(self.response.clone())
        }
    }

    struct FailingTransport;

    impl Transport for FailingTransport {
        fn execute(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
            Err(TransportError::Request {
                url: request.url,
                message: "connection refused".to_string(),
            })
        }
    }

    type TestClient = BackendClient<Arc<MockTransport>>;

    fn client(transport: &Arc<MockTransport>) -> TestClient {
        BackendClient::with_transport(ClientConfig::new(BASE_URL), Arc::clone(transport))
    }

    fn client_with_token(transport: &Arc<MockTransport>, token: &str) -> TestClient {
        BackendClient::with_transport(
            ClientConfig::new(BASE_URL).with_access_token(token),
            Arc::clone(transport),
        )
    }

    fn body_json(req: &HttpRequest) -> Value {
        serde_json::from_str(req.body.as_deref().expect("request has no body")).unwrap()
    }

    struct Case {
        method: HttpMethod,
        path: &'static str,
        call: fn(&TestClient) -> Result<Value>,
    }

    fn case(method: HttpMethod, path: &'static str, call: fn(&TestClient) -> Result<Value>) -> Case {
        Case { method, path, call }
    }

    #[test]
    fn every_operation_targets_its_route() {
        use HttpMethod::*;

        let cases = vec![
            case(Post, "/auth/login", |c| c.login("a@b.com", "pw")),
            case(Post, "/auth/logout", |c| c.logout()),
            case(Post, "/auth/register", |c| c.register("a@b.com", "pw")),
            case(Get, "/auth/me", |c| c.get_me()),
            case(Put, "/auth/me/update", |c| c.update_me(&json!({"email": "n@b.com"}))),
            case(Post, "/auth/token", |c| c.create_token("ci")),
            case(Get, "/auth/token", |c| c.list_tokens()),
            case(Delete, "/auth/token/abc", |c| c.delete_token("abc")),
            case(Post, "/private-ai-keys", |c| c.create_private_ai_key(1, "dev", None)),
            case(Get, "/private-ai-keys", |c| c.list_private_ai_keys()),
            case(Delete, "/private-ai-keys/dev-key", |c| c.delete_private_ai_key("dev-key")),
            case(Get, "/regions", |c| c.list_regions()),
            case(Get, "/regions/7", |c| c.get_region(7)),
            case(Post, "/regions", |c| c.create_region(&json!({"name": "eu"}))),
            case(Put, "/regions/7", |c| c.update_region(7, &json!({"name": "us"}))),
            case(Delete, "/regions/7", |c| c.delete_region(7)),
            case(Get, "/regions/admin", |c| c.list_admin_regions()),
            case(Get, "/users", |c| c.list_users()),
            case(Get, "/users/42", |c| c.get_user(42)),
            case(Post, "/users", |c| c.create_user("a@b.com", "pw")),
            case(Put, "/users/42", |c| c.update_user(42, &json!({"is_admin": true}))),
            case(Delete, "/users/42", |c| c.delete_user(42)),
            case(Get, "/users/search?email=a%40b.com", |c| c.search_users("a@b.com")),
            case(Get, "/audit/logs", |c| c.get_audit_logs()),
            case(Get, "/audit/logs/metadata", |c| c.get_audit_logs_metadata()),
            case(Get, "/health", |c| c.health()),
        ];

        for case in cases {
            let transport = MockTransport::replying(200, "{}");
            (case.call)(&client(&transport)).unwrap();
            let req = transport.only_request();
            assert_eq!(req.method, case.method, "{}", case.path);
            assert_eq!(req.url, format!("{BASE_URL}{}", case.path));
        }
    }

    #[test]
    fn list_regions_without_token() {
        let transport = MockTransport::replying(200, "[]");
        client(&transport).list_regions().unwrap();

        let req = transport.only_request();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "https://api.example.com/regions");
        assert_eq!(req.header("Authorization"), None);
        assert!(req.body.is_none());
    }

    #[test]
    fn create_user_with_token() {
        let transport = MockTransport::replying(201, r#"{"id":1}"#);
        let result = client_with_token(&transport, "tok123")
            .create_user("a@b.com", "pw")
            .unwrap();
        assert_eq!(result, json!({"id": 1}));

        let req = transport.only_request();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "https://api.example.com/users");
        assert_eq!(body_json(&req), json!({"email": "a@b.com", "password": "pw"}));
        let auth: Vec<_> = req.headers.iter().filter(|(k, _)| k == "Authorization").collect();
        assert_eq!(auth.len(), 1);
        assert_eq!(auth[0].1, "Bearer tok123");
    }

    #[test]
    fn get_user_not_found() {
        let transport = MockTransport::replying(404, r#"{"detail":"not found"}"#);
        let err = client(&transport).get_user(999).unwrap_err();

        let api = err.as_api().expect("expected an API error");
        assert_eq!(api.status(), 404);
        assert_eq!(api.body(), Some(&json!({"detail": "not found"})));
        assert_eq!(api.message(), "API request failed with status code: 404");
    }

    #[test]
    fn fixed_headers_are_always_sent() {
        let transport = MockTransport::replying(200, "{}");
        client(&transport).health().unwrap();

        let req = transport.only_request();
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.header("Accept"), Some("application/json"));
        assert_eq!(req.headers.len(), 2);
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let transport = MockTransport::replying(200, "{}");
        BackendClient::with_transport(ClientConfig::new("https://api.example.com/"), Arc::clone(&transport))
            .get_region(3)
            .unwrap();
        assert_eq!(transport.only_request().url, "https://api.example.com/regions/3");
    }

    #[test]
    fn login_sends_email_as_username() {
        let transport = MockTransport::replying(200, r#"{"access_token":"t","token_type":"bearer"}"#);
        client(&transport).login("a@b.com", "pw").unwrap();
        assert_eq!(
            body_json(&transport.only_request()),
            json!({"username": "a@b.com", "password": "pw"})
        );
    }

    #[test]
    fn logout_sends_no_body() {
        let transport = MockTransport::replying(200, r#"{"message":"ok"}"#);
        client(&transport).logout().unwrap();
        let req = transport.only_request();
        assert_eq!(req.method, HttpMethod::Post);
        assert!(req.body.is_none());
    }

    #[test]
    fn empty_update_sends_no_body() {
        let transport = MockTransport::replying(200, "{}");
        client(&transport).update_user(5, &UserUpdate::default()).unwrap();
        assert!(transport.only_request().body.is_none());
    }

    #[test]
    fn typed_region_update_is_json_body() {
        let transport = MockTransport::replying(200, "{}");
        let update = RegionUpdate {
            name: Some("eu-west".to_string()),
            is_active: Some(true),
            ..Default::default()
        };
        client(&transport).update_region(2, &update).unwrap();

        let req = transport.only_request();
        assert_eq!(req.url, "https://api.example.com/regions/2");
        assert_eq!(body_json(&req), json!({"name": "eu-west", "is_active": true}));
    }

    #[test]
    fn private_ai_key_user_id_only_when_positive() {
        let transport = MockTransport::replying(200, "{}");
        let c = client(&transport);
        c.create_private_ai_key(1, "a", Some(9)).unwrap();
        c.create_private_ai_key(1, "b", Some(0)).unwrap();
        c.create_private_ai_key(1, "c", None).unwrap();

        let bodies: Vec<Value> = transport.requests().iter().map(body_json).collect();
        assert_eq!(bodies[0], json!({"region_id": 1, "name": "a", "user_id": 9}));
        assert_eq!(bodies[1], json!({"region_id": 1, "name": "b"}));
        assert_eq!(bodies[2], json!({"region_id": 1, "name": "c"}));
    }

    #[test]
    fn search_users_uses_query_not_body() {
        let transport = MockTransport::replying(200, "[]");
        client(&transport).search_users("a+b@c.com").unwrap();

        let req = transport.only_request();
        assert_eq!(req.url, "https://api.example.com/users/search?email=a%2Bb%40c.com");
        assert!(req.body.is_none());
    }

    #[test]
    fn post_payload_never_lands_in_query() {
        let transport = MockTransport::replying(200, "{}");
        client(&transport).create_token("ci").unwrap();

        let req = transport.only_request();
        assert!(!req.url.contains('?'));
        assert_eq!(body_json(&req), json!({"name": "ci"}));
    }

    #[test]
    fn success_body_is_returned_unchanged() {
        let payload = json!([{"id": 1, "name": "eu", "nested": {"ok": true, "n": null}}]);
        let transport = MockTransport::replying(200, &payload.to_string());
        assert_eq!(client(&transport).list_regions().unwrap(), payload);
    }

    #[test]
    fn unserializable_payload_is_rejected_before_sending() {
        let transport = MockTransport::replying(200, "{}");
        let mut data = std::collections::HashMap::new();
        data.insert((1, 2), 3);

        let err = client(&transport).create_region(&data).unwrap_err();
        assert!(matches!(err, ClientError::Serialization(_)));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn transport_failure_is_not_an_api_error() {
        let c = BackendClient::with_transport(ClientConfig::new(BASE_URL), FailingTransport);
        let err = c.health().unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn build_request_get_ignores_payload() {
        let transport = MockTransport::replying(200, "{}");
        let req = client(&transport)
            .build_request(HttpMethod::Get, "/users", &[], &json!({"x": 1}))
            .unwrap();
        assert!(req.body.is_none());
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn parse_response_empty_success_is_null() {
        let response = HttpResponse {
            status: 204,
            headers: Vec::new(),
            body: String::new(),
        };
        assert_eq!(parse_response(response).unwrap(), Value::Null);
    }

    #[test]
    fn parse_response_bad_json_success_is_decode_error() {
        let response = HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: "<html>oops</html>".to_string(),
        };
        let err = parse_response(response).unwrap_err();
        assert!(matches!(err, ClientError::Decode { status: 200, .. }));
    }

    #[test]
    fn parse_response_bad_json_failure_has_no_body() {
        let response = HttpResponse {
            status: 502,
            headers: Vec::new(),
            body: "Bad Gateway".to_string(),
        };
        let err = parse_response(response).unwrap_err();
        let api = err.as_api().unwrap();
        assert_eq!(api.status(), 502);
        assert!(api.body().is_none());
    }

    #[test]
    fn parse_response_redirect_is_failure() {
        let response = HttpResponse {
            status: 301,
            headers: Vec::new(),
            body: String::new(),
        };
        assert_eq!(parse_response(response).unwrap_err().status(), Some(301));
    }
}
