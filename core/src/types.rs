//! Request payloads for the AI backend API.
//!
//! # Design
//! Fixed-shape bodies get a struct each; field names are the wire names.
//! Endpoints that accept arbitrary fields (`update_me`, region and user
//! mutation) take any `Serialize` value, and the `*Update` / `RegionCreate`
//! structs here are typed conveniences for them. Optional fields are skipped
//! when `None` so a partial update only sends what it changes.

use serde::{Deserialize, Serialize};

/// `POST /auth/login`. The backend names the email field `username`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// `POST /auth/register` and `POST /users`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// `POST /auth/token`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateToken {
    pub name: String,
}

/// `POST /private-ai-keys`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatePrivateAiKey {
    pub region_id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

/// Fields accepted by `PUT /auth/me/update`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_password: Option<String>,
}

/// Full region definition for `POST /regions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegionCreate {
    pub name: String,
    pub postgres_host: String,
    pub postgres_port: u16,
    pub postgres_admin_user: String,
    pub postgres_admin_password: String,
    pub litellm_api_url: String,
    pub litellm_api_key: String,
}

/// Partial region update for `PUT /regions/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres_admin_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres_admin_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub litellm_api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub litellm_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// Partial user update for `PUT /users/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
}
