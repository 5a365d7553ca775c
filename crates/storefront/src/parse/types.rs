//! Wire types for the Parse REST API.

use serde::{Deserialize, Serialize};

/// `GET /classes/{Class}` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

/// `POST /classes/{Class}` and `POST /users` reply.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedObject {
    pub object_id: Option<String>,
    pub created_at: Option<String>,
    /// Only present when signing up a user.
    pub session_token: Option<String>,
}

/// `PUT /classes/{Class}/{id}` reply.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedObject {
    pub updated_at: Option<String>,
}

/// Error body, e.g. `{"code":101,"error":"Invalid username/password."}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: i64,
    pub error: String,
}

/// `GET /login` success body.
///
/// Parse returns the whole user object; the raw JSON is kept alongside the
/// fields we act on.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub session_token: Option<String>,
    pub object_id: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    #[serde(skip)]
    pub raw: serde_json::Value,
}

/// `POST /users` body.
#[derive(Debug, Clone, Serialize)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub email: &'a str,
    pub name: &'a str,
}
