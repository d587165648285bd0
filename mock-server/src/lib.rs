//! In-memory stand-in for the AI backend.
//!
//! Serves every route the client talks to from a single `RwLock`-guarded
//! `Db`. Authentication is bearer-based: login sessions and API tokens both
//! authenticate. Errors use the backend's `{"detail": "..."}` shape.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::info;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub is_active: bool,
    pub is_admin: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiToken {
    pub id: i64,
    pub name: String,
    pub token: String,
    pub user_id: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Region {
    pub id: i64,
    pub name: String,
    pub postgres_host: String,
    pub postgres_port: u16,
    pub postgres_admin_user: String,
    pub postgres_admin_password: String,
    pub litellm_api_url: String,
    pub litellm_api_key: String,
    pub is_active: bool,
}

impl Region {
    /// The fields non-admin callers may see.
    fn public(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "postgres_host": self.postgres_host,
            "litellm_api_url": self.litellm_api_url,
            "is_active": self.is_active,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrivateAiKey {
    pub name: String,
    pub region: String,
    pub region_id: i64,
    pub owner_id: i64,
    pub database_name: String,
    pub database_host: String,
    pub database_username: String,
    pub database_password: String,
    pub litellm_token: String,
    pub litellm_api_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditLog {
    pub id: i64,
    pub user_id: Option<i64>,
    pub event_type: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateToken {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreatePrivateAiKey {
    pub region_id: i64,
    pub name: String,
    pub user_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct RegionCreate {
    pub name: String,
    pub postgres_host: String,
    pub postgres_port: u16,
    pub postgres_admin_user: String,
    pub postgres_admin_password: String,
    pub litellm_api_url: String,
    pub litellm_api_key: String,
}

#[derive(Deserialize)]
pub struct RegionUpdate {
    pub name: Option<String>,
    pub postgres_host: Option<String>,
    pub postgres_port: Option<u16>,
    pub postgres_admin_user: Option<String>,
    pub postgres_admin_password: Option<String>,
    pub litellm_api_url: Option<String>,
    pub litellm_api_key: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Deserialize)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub is_active: Option<bool>,
    pub is_admin: Option<bool>,
}

/// Error response in the backend's `{"detail": ...}` shape.
#[derive(Debug)]
pub struct ApiFailure {
    status: StatusCode,
    detail: &'static str,
}

impl ApiFailure {
    const fn new(status: StatusCode, detail: &'static str) -> Self {
        Self { status, detail }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

const NOT_AUTHENTICATED: ApiFailure = ApiFailure::new(StatusCode::UNAUTHORIZED, "Not authenticated");
const NOT_AUTHORIZED: ApiFailure = ApiFailure::new(StatusCode::FORBIDDEN, "Not authorized to perform this action");
const USER_NOT_FOUND: ApiFailure = ApiFailure::new(StatusCode::NOT_FOUND, "User not found");
const REGION_NOT_FOUND: ApiFailure = ApiFailure::new(StatusCode::NOT_FOUND, "Region not found");
const EMAIL_TAKEN: ApiFailure = ApiFailure::new(StatusCode::BAD_REQUEST, "Email already registered");

type ApiResult<T> = Result<T, ApiFailure>;

struct Account {
    user: User,
    password: String,
}

/// All backend state. Ids are allocated from per-resource counters.
#[derive(Default)]
pub struct Db {
    accounts: BTreeMap<i64, Account>,
    sessions: HashMap<String, i64>,
    tokens: Vec<ApiToken>,
    regions: BTreeMap<i64, Region>,
    keys: Vec<PrivateAiKey>,
    audit: Vec<AuditLog>,
    next_user_id: i64,
    next_token_id: i64,
    next_region_id: i64,
}

impl Db {
    /// Database with a single active admin account.
    pub fn with_admin(email: &str, password: &str) -> Self {
        let mut db = Self::default();
        let id = db.insert_user(email, password);
        if let Some(account) = db.accounts.get_mut(&id) {
            account.user.is_admin = true;
        }
        db
    }

    fn insert_user(&mut self, email: &str, password: &str) -> i64 {
        self.next_user_id += 1;
        let id = self.next_user_id;
        let user = User {
            id,
            email: email.to_string(),
            is_active: true,
            is_admin: false,
        };
        self.accounts.insert(
            id,
            Account {
                user,
                password: password.to_string(),
            },
        );
        id
    }

    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.accounts
            .values()
            .any(|a| a.user.email.eq_ignore_ascii_case(email) && Some(a.user.id) != except)
    }

    fn user(&self, id: i64) -> ApiResult<User> {
        self.accounts.get(&id).map(|a| a.user.clone()).ok_or(USER_NOT_FOUND)
    }

    /// Resolve the bearer token to an active user.
    fn authenticate(&self, headers: &HeaderMap) -> ApiResult<User> {
        let token = bearer(headers).ok_or(NOT_AUTHENTICATED)?;
        let user_id = self
            .sessions
            .get(token)
            .copied()
            .or_else(|| self.tokens.iter().find(|t| t.token == token).map(|t| t.user_id))
            .ok_or(NOT_AUTHENTICATED)?;
        let user = self.user(user_id).map_err(|_| NOT_AUTHENTICATED)?;
        if !user.is_active {
            return Err(NOT_AUTHENTICATED);
        }
        Ok(user)
    }

    fn authenticate_admin(&self, headers: &HeaderMap) -> ApiResult<User> {
        let user = self.authenticate(headers)?;
        if !user.is_admin {
            return Err(NOT_AUTHORIZED);
        }
        Ok(user)
    }

    fn record(&mut self, user_id: Option<i64>, event_type: &str, resource_type: &str, resource_id: Option<String>) {
        let id = self.audit.len() as i64 + 1;
        info!(event_type, resource_type, ?user_id, "audit");
        self.audit.push(AuditLog {
            id,
            user_id,
            event_type: event_type.to_string(),
            resource_type: resource_type.to_string(),
            resource_id,
        });
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
}

fn message(text: &str) -> Json<Value> {
    Json(json!({ "message": text }))
}

pub type SharedDb = Arc<RwLock<Db>>;

/// Router with no accounts; only `/health`, `/auth/register` and
/// `/auth/login` are usable until someone registers.
pub fn app() -> Router {
    app_with_db(Db::default())
}

pub fn app_with_db(db: Db) -> Router {
    let db: SharedDb = Arc::new(RwLock::new(db));
    Router::new()
        .route("/health", get(health))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/register", post(register))
        .route("/auth/me", get(get_me))
        .route("/auth/me/update", put(update_me))
        .route("/auth/token", get(list_tokens).post(create_token))
        .route("/auth/token/{id}", delete(delete_token))
        .route("/private-ai-keys", get(list_keys).post(create_key))
        .route("/private-ai-keys/{name}", delete(delete_key))
        .route("/regions", get(list_regions).post(create_region))
        .route("/regions/admin", get(list_admin_regions))
        .route("/regions/{id}", get(get_region).put(update_region).delete(delete_region))
        .route("/users", get(list_users).post(create_user))
        .route("/users/search", get(search_users))
        .route("/users/{id}", get(get_user).put(update_user).delete(delete_user))
        .route("/audit/logs", get(audit_logs))
        .route("/audit/logs/metadata", get(audit_metadata))
        .with_state(db)
}

pub async fn run(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_db(db)).await
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

// --- auth ---

async fn login(State(db): State<SharedDb>, Json(input): Json<LoginRequest>) -> ApiResult<Json<Value>> {
    let mut db = db.write().await;
    let user_id = db
        .accounts
        .values()
        .find(|a| a.user.email.eq_ignore_ascii_case(&input.username) && a.password == input.password)
        .filter(|a| a.user.is_active)
        .map(|a| a.user.id)
        .ok_or(ApiFailure::new(StatusCode::UNAUTHORIZED, "Incorrect email or password"))?;

    let token = Uuid::new_v4().simple().to_string();
    db.sessions.insert(token.clone(), user_id);
    db.record(Some(user_id), "login", "auth", None);
    Ok(Json(json!({ "access_token": token, "token_type": "bearer" })))
}

async fn logout(State(db): State<SharedDb>, headers: HeaderMap) -> Json<Value> {
    let mut db = db.write().await;
    if let Some(token) = bearer(&headers) {
        if let Some(user_id) = db.sessions.remove(token) {
            db.record(Some(user_id), "logout", "auth", None);
        }
    }
    message("Successfully logged out")
}

async fn register(
    State(db): State<SharedDb>,
    Json(input): Json<Credentials>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let mut db = db.write().await;
    if db.email_taken(&input.email, None) {
        return Err(EMAIL_TAKEN);
    }
    let id = db.insert_user(&input.email, &input.password);
    db.record(Some(id), "register", "user", Some(id.to_string()));
    Ok((StatusCode::CREATED, Json(db.user(id)?)))
}

async fn get_me(State(db): State<SharedDb>, headers: HeaderMap) -> ApiResult<Json<User>> {
    let db = db.read().await;
    db.authenticate(&headers).map(Json)
}

async fn update_me(
    State(db): State<SharedDb>,
    headers: HeaderMap,
    Json(input): Json<ProfileUpdate>,
) -> ApiResult<Json<User>> {
    let mut db = db.write().await;
    let me = db.authenticate(&headers)?;

    if let Some(email) = &input.email {
        if db.email_taken(email, Some(me.id)) {
            return Err(EMAIL_TAKEN);
        }
    }
    let account = db.accounts.get_mut(&me.id).ok_or(USER_NOT_FOUND)?;
    if let Some(new_password) = input.new_password {
        if input.current_password.as_deref() != Some(account.password.as_str()) {
            return Err(ApiFailure::new(StatusCode::BAD_REQUEST, "Incorrect password"));
        }
        account.password = new_password;
    }
    if let Some(email) = input.email {
        account.user.email = email;
    }
    let user = account.user.clone();
    db.record(Some(me.id), "update", "user", Some(me.id.to_string()));
    Ok(Json(user))
}

// --- api tokens ---

async fn create_token(
    State(db): State<SharedDb>,
    headers: HeaderMap,
    Json(input): Json<CreateToken>,
) -> ApiResult<(StatusCode, Json<ApiToken>)> {
    let mut db = db.write().await;
    let me = db.authenticate(&headers)?;
    db.next_token_id += 1;
    let token = ApiToken {
        id: db.next_token_id,
        name: input.name,
        token: Uuid::new_v4().simple().to_string(),
        user_id: me.id,
    };
    db.tokens.push(token.clone());
    db.record(Some(me.id), "create", "token", Some(token.id.to_string()));
    Ok((StatusCode::CREATED, Json(token)))
}

async fn list_tokens(State(db): State<SharedDb>, headers: HeaderMap) -> ApiResult<Json<Vec<ApiToken>>> {
    let db = db.read().await;
    let me = db.authenticate(&headers)?;
    Ok(Json(db.tokens.iter().filter(|t| t.user_id == me.id).cloned().collect()))
}

async fn delete_token(
    State(db): State<SharedDb>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let mut db = db.write().await;
    let me = db.authenticate(&headers)?;
    let index = db
        .tokens
        .iter()
        .position(|t| t.id.to_string() == id && t.user_id == me.id)
        .ok_or(ApiFailure::new(StatusCode::NOT_FOUND, "Token not found"))?;
    db.tokens.remove(index);
    db.record(Some(me.id), "delete", "token", Some(id));
    Ok(message("Token deleted successfully"))
}

// --- private ai keys ---

async fn create_key(
    State(db): State<SharedDb>,
    headers: HeaderMap,
    Json(input): Json<CreatePrivateAiKey>,
) -> ApiResult<(StatusCode, Json<PrivateAiKey>)> {
    let mut db = db.write().await;
    let me = db.authenticate(&headers)?;

    let owner_id = match input.user_id {
        Some(id) if id != me.id => {
            if !me.is_admin {
                return Err(NOT_AUTHORIZED);
            }
            db.user(id)?.id
        }
        _ => me.id,
    };
    let region = db
        .regions
        .get(&input.region_id)
        .filter(|r| r.is_active)
        .cloned()
        .ok_or(REGION_NOT_FOUND)?;
    if db.keys.iter().any(|k| k.name == input.name) {
        return Err(ApiFailure::new(StatusCode::BAD_REQUEST, "Private AI Key with this name already exists"));
    }

    let suffix = Uuid::new_v4().simple().to_string();
    let key = PrivateAiKey {
        name: input.name,
        region: region.name.clone(),
        region_id: region.id,
        owner_id,
        database_name: format!("db_{}", &suffix[..12]),
        database_host: region.postgres_host.clone(),
        database_username: format!("user_{}", &suffix[12..24]),
        database_password: Uuid::new_v4().simple().to_string(),
        litellm_token: format!("sk-{}", Uuid::new_v4().simple()),
        litellm_api_url: region.litellm_api_url.clone(),
    };
    db.keys.push(key.clone());
    db.record(Some(me.id), "create", "private_ai_key", Some(key.name.clone()));
    Ok((StatusCode::CREATED, Json(key)))
}

async fn list_keys(State(db): State<SharedDb>, headers: HeaderMap) -> ApiResult<Json<Vec<PrivateAiKey>>> {
    let db = db.read().await;
    let me = db.authenticate(&headers)?;
    let keys = db
        .keys
        .iter()
        .filter(|k| me.is_admin || k.owner_id == me.id)
        .cloned()
        .collect();
    Ok(Json(keys))
}

async fn delete_key(
    State(db): State<SharedDb>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let mut db = db.write().await;
    let me = db.authenticate(&headers)?;
    let index = db
        .keys
        .iter()
        .position(|k| k.name == name && (me.is_admin || k.owner_id == me.id))
        .ok_or(ApiFailure::new(StatusCode::NOT_FOUND, "Private AI Key not found"))?;
    db.keys.remove(index);
    db.record(Some(me.id), "delete", "private_ai_key", Some(name));
    Ok(message("Private AI Key deleted successfully"))
}

// --- regions ---

async fn list_regions(State(db): State<SharedDb>, headers: HeaderMap) -> ApiResult<Json<Vec<Value>>> {
    let db = db.read().await;
    db.authenticate(&headers)?;
    Ok(Json(db.regions.values().filter(|r| r.is_active).map(Region::public).collect()))
}

async fn list_admin_regions(State(db): State<SharedDb>, headers: HeaderMap) -> ApiResult<Json<Vec<Region>>> {
    let db = db.read().await;
    db.authenticate_admin(&headers)?;
    Ok(Json(db.regions.values().cloned().collect()))
}

async fn get_region(
    State(db): State<SharedDb>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let db = db.read().await;
    db.authenticate(&headers)?;
    db.regions.get(&id).map(|r| Json(r.public())).ok_or(REGION_NOT_FOUND)
}

async fn create_region(
    State(db): State<SharedDb>,
    headers: HeaderMap,
    Json(input): Json<RegionCreate>,
) -> ApiResult<(StatusCode, Json<Region>)> {
    let mut db = db.write().await;
    let me = db.authenticate_admin(&headers)?;
    if db.regions.values().any(|r| r.name == input.name) {
        return Err(ApiFailure::new(StatusCode::BAD_REQUEST, "Region with this name already exists"));
    }
    db.next_region_id += 1;
    let region = Region {
        id: db.next_region_id,
        name: input.name,
        postgres_host: input.postgres_host,
        postgres_port: input.postgres_port,
        postgres_admin_user: input.postgres_admin_user,
        postgres_admin_password: input.postgres_admin_password,
        litellm_api_url: input.litellm_api_url,
        litellm_api_key: input.litellm_api_key,
        is_active: true,
    };
    db.regions.insert(region.id, region.clone());
    db.record(Some(me.id), "create", "region", Some(region.id.to_string()));
    Ok((StatusCode::CREATED, Json(region)))
}

async fn update_region(
    State(db): State<SharedDb>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(input): Json<RegionUpdate>,
) -> ApiResult<Json<Region>> {
    let mut db = db.write().await;
    let me = db.authenticate_admin(&headers)?;
    let region = db.regions.get_mut(&id).ok_or(REGION_NOT_FOUND)?;
    if let Some(name) = input.name {
        region.name = name;
    }
    if let Some(host) = input.postgres_host {
        region.postgres_host = host;
    }
    if let Some(port) = input.postgres_port {
        region.postgres_port = port;
    }
    if let Some(user) = input.postgres_admin_user {
        region.postgres_admin_user = user;
    }
    if let Some(password) = input.postgres_admin_password {
        region.postgres_admin_password = password;
    }
    if let Some(url) = input.litellm_api_url {
        region.litellm_api_url = url;
    }
    if let Some(key) = input.litellm_api_key {
        region.litellm_api_key = key;
    }
    if let Some(active) = input.is_active {
        region.is_active = active;
    }
    let region = region.clone();
    db.record(Some(me.id), "update", "region", Some(id.to_string()));
    Ok(Json(region))
}

async fn delete_region(
    State(db): State<SharedDb>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let mut db = db.write().await;
    let me = db.authenticate_admin(&headers)?;
    if !db.regions.contains_key(&id) {
        return Err(REGION_NOT_FOUND);
    }
    if db.keys.iter().any(|k| k.region_id == id) {
        return Err(ApiFailure::new(StatusCode::BAD_REQUEST, "Region has active private AI keys"));
    }
    db.regions.remove(&id);
    db.record(Some(me.id), "delete", "region", Some(id.to_string()));
    Ok(message("Region deleted successfully"))
}

// --- users ---

async fn list_users(State(db): State<SharedDb>, headers: HeaderMap) -> ApiResult<Json<Vec<User>>> {
    let db = db.read().await;
    db.authenticate_admin(&headers)?;
    Ok(Json(db.accounts.values().map(|a| a.user.clone()).collect()))
}

async fn search_users(
    State(db): State<SharedDb>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Vec<User>>> {
    let db = db.read().await;
    db.authenticate_admin(&headers)?;
    let needle = params
        .get("email")
        .ok_or(ApiFailure::new(StatusCode::UNPROCESSABLE_ENTITY, "Query parameter 'email' is required"))?
        .to_lowercase();
    let users = db
        .accounts
        .values()
        .filter(|a| a.user.email.to_lowercase().contains(&needle))
        .map(|a| a.user.clone())
        .collect();
    Ok(Json(users))
}

async fn get_user(
    State(db): State<SharedDb>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<User>> {
    let db = db.read().await;
    db.authenticate_admin(&headers)?;
    db.user(id).map(Json)
}

async fn create_user(
    State(db): State<SharedDb>,
    headers: HeaderMap,
    Json(input): Json<Credentials>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let mut db = db.write().await;
    let me = db.authenticate_admin(&headers)?;
    if db.email_taken(&input.email, None) {
        return Err(EMAIL_TAKEN);
    }
    let id = db.insert_user(&input.email, &input.password);
    db.record(Some(me.id), "create", "user", Some(id.to_string()));
    Ok((StatusCode::CREATED, Json(db.user(id)?)))
}

async fn update_user(
    State(db): State<SharedDb>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(input): Json<UserUpdate>,
) -> ApiResult<Json<User>> {
    let mut db = db.write().await;
    let me = db.authenticate_admin(&headers)?;
    if let Some(email) = &input.email {
        if db.email_taken(email, Some(id)) {
            return Err(EMAIL_TAKEN);
        }
    }
    let user = &mut db.accounts.get_mut(&id).ok_or(USER_NOT_FOUND)?.user;
    if let Some(email) = input.email {
        user.email = email;
    }
    if let Some(active) = input.is_active {
        user.is_active = active;
    }
    if let Some(admin) = input.is_admin {
        user.is_admin = admin;
    }
    let user = user.clone();
    db.record(Some(me.id), "update", "user", Some(id.to_string()));
    Ok(Json(user))
}

async fn delete_user(
    State(db): State<SharedDb>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let mut db = db.write().await;
    let me = db.authenticate_admin(&headers)?;
    if id == me.id {
        return Err(ApiFailure::new(StatusCode::BAD_REQUEST, "Cannot delete your own account"));
    }
    if db.accounts.remove(&id).is_none() {
        return Err(USER_NOT_FOUND);
    }
    db.sessions.retain(|_, user_id| *user_id != id);
    db.tokens.retain(|t| t.user_id != id);
    db.keys.retain(|k| k.owner_id != id);
    db.record(Some(me.id), "delete", "user", Some(id.to_string()));
    Ok(message("User deleted successfully"))
}

// --- audit ---

async fn audit_logs(State(db): State<SharedDb>, headers: HeaderMap) -> ApiResult<Json<Vec<AuditLog>>> {
    let db = db.read().await;
    db.authenticate_admin(&headers)?;
    Ok(Json(db.audit.iter().rev().cloned().collect()))
}

async fn audit_metadata(State(db): State<SharedDb>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    let db = db.read().await;
    db.authenticate_admin(&headers)?;
    let event_types: BTreeSet<&str> = db.audit.iter().map(|l| l.event_type.as_str()).collect();
    let resource_types: BTreeSet<&str> = db.audit.iter().map(|l| l.resource_type.as_str()).collect();
    Ok(Json(json!({
        "event_types": event_types,
        "resource_types": resource_types,
    })))
}
