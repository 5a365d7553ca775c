//! Parse REST API client.
//!
//! # Architecture
//!
//! - Plain `reqwest` with the application id, REST key and JSON content type
//!   installed as default headers
//! - User endpoints (`/login`, `/users`) live at the API root; every other
//!   class lives under `/classes/{Class}`
//! - Equality queries are sent as a JSON `where` parameter
//!
//! # Example
//!
//! ```rust,ignore
//! use pokebolsa_storefront::parse::ParseClient;
//!
//! let client = ParseClient::new(&config.parse)?;
//! let carts: Vec<serde_json::Value> = client
//!     .query("CartSession", Some(&json!({ "sessionId": "sess_1_abc" })))
//!     .await?;
//! ```

pub mod types;

use std::sync::Arc;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::config::ParseConfig;

pub use types::{CreatedObject, ErrorBody, LoginResponse, NewUser, QueryResponse, UpdatedObject};

/// Parse error code for a failed login.
pub const INVALID_LOGIN_CODE: i64 = 101;

const APP_ID_HEADER: &str = "x-parse-application-id";
const REST_KEY_HEADER: &str = "x-parse-rest-api-key";

/// Errors that can occur when talking to Parse.
#[derive(Debug, Error)]
pub enum ParseError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Parse answered with an error body or a non-success status.
    #[error("API error: {status} - {message} (code {code})")]
    Api {
        status: u16,
        code: i64,
        message: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configured base URL cannot carry path segments.
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// A credential cannot be sent as a header value.
    #[error("Invalid header value for {0}")]
    InvalidHeader(&'static str),
}

impl ParseError {
    /// Whether Parse rejected a username/password pair.
    #[must_use]
    pub fn is_invalid_login(&self) -> bool {
        match self {
            Self::Api { code, message, .. } => {
                *code == INVALID_LOGIN_CODE || message.contains("Invalid username/password")
            }
            _ => false,
        }
    }
}

/// Client for the Parse REST API.
#[derive(Clone)]
pub struct ParseClient {
    inner: Arc<ParseClientInner>,
}

struct ParseClientInner {
    client: reqwest::Client,
    base_url: Url,
}

impl std::fmt::Debug for ParseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseClient")
            .field("base_url", &self.inner.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ParseClient {
    /// Create a new Parse client.
    ///
    /// # Errors
    ///
    /// Returns an error if a credential is not a valid header value or the
    /// HTTP client fails to build.
    pub fn new(config: &ParseConfig) -> Result<Self, ParseError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            APP_ID_HEADER,
            HeaderValue::from_str(&config.app_id)
                .map_err(|_| ParseError::InvalidHeader("X-Parse-Application-Id"))?,
        );
        let mut rest_key = HeaderValue::from_str(config.rest_key.expose_secret())
            .map_err(|_| ParseError::InvalidHeader("X-Parse-REST-API-Key"))?;
        rest_key.set_sensitive(true);
        headers.insert(REST_KEY_HEADER, rest_key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            inner: Arc::new(ParseClientInner {
                client,
                base_url: config.base_url.clone(),
            }),
        })
    }

    /// Base URL plus path segments.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ParseError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ParseError::InvalidBaseUrl(self.inner.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Read a response body, turning error bodies into [`ParseError::Api`].
    async fn read_body(response: reqwest::Response) -> Result<String, ParseError> {
        let status = response.status();
        let text = response.text().await?;

        // Parse reports some failures with a 200 and an `error` field.
        let error_body = serde_json::from_str::<ErrorBody>(&text).ok();
        if !status.is_success() || error_body.is_some() {
            let (code, message) = error_body.map_or_else(
                || (0, text.chars().take(200).collect()),
                |body| (body.code, body.error),
            );
            tracing::warn!(status = %status, code, message = %message, "Parse returned an error");
            return Err(ParseError::Api {
                status: status.as_u16(),
                code,
                message,
            });
        }

        Ok(text)
    }

    fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
        serde_json::from_str(text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %text.chars().take(500).collect::<String>(),
                "Failed to parse Parse response"
            );
            ParseError::Parse(e)
        })
    }

    // =========================================================================
    // Class Methods
    // =========================================================================

    /// List objects of `class`, optionally filtered by field equality.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body is not a result list.
    #[instrument(skip(self, filter), fields(class = %class))]
    pub async fn query<T: DeserializeOwned>(
        &self,
        class: &str,
        filter: Option<&serde_json::Value>,
    ) -> Result<Vec<T>, ParseError> {
        let mut url = self.endpoint(&["classes", class])?;
        if let Some(filter) = filter {
            url.query_pairs_mut()
                .append_pair("where", &serde_json::to_string(filter)?);
        }

        let response = self.inner.client.get(url).send().await?;
        let text = Self::read_body(response).await?;
        let envelope: QueryResponse<T> = Self::decode(&text)?;
        debug!(count = envelope.results.len(), "Query returned");
        Ok(envelope.results)
    }

    /// Create an object of `class`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Parse rejects the object.
    #[instrument(skip(self, body), fields(class = %class))]
    pub async fn create<B: Serialize + ?Sized + Sync>(
        &self,
        class: &str,
        body: &B,
    ) -> Result<CreatedObject, ParseError> {
        let url = self.endpoint(&["classes", class])?;
        let response = self.inner.client.post(url).json(body).send().await?;
        Self::decode(&Self::read_body(response).await?)
    }

    /// Overwrite the given fields of an existing object.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the object does not exist.
    #[instrument(skip(self, body), fields(class = %class, object_id = %object_id))]
    pub async fn update<B: Serialize + ?Sized + Sync>(
        &self,
        class: &str,
        object_id: &str,
        body: &B,
    ) -> Result<UpdatedObject, ParseError> {
        let url = self.endpoint(&["classes", class, object_id])?;
        let response = self.inner.client.put(url).json(body).send().await?;
        Self::decode(&Self::read_body(response).await?)
    }

    /// Delete an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the object does not exist.
    #[instrument(skip(self), fields(class = %class, object_id = %object_id))]
    pub async fn delete(&self, class: &str, object_id: &str) -> Result<(), ParseError> {
        let url = self.endpoint(&["classes", class, object_id])?;
        let response = self.inner.client.delete(url).send().await?;
        Self::read_body(response).await.map(drop)
    }

    // =========================================================================
    // User Methods
    // =========================================================================

    /// Log in with username and password (`GET /login`).
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Api`] with code 101 for bad credentials, or any
    /// transport/decoding error.
    #[instrument(skip(self, password), fields(username = %username))]
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ParseError> {
        let mut url = self.endpoint(&["login"])?;
        url.query_pairs_mut()
            .append_pair("username", username)
            .append_pair("password", password);

        let response = self.inner.client.get(url).send().await?;
        let text = Self::read_body(response).await?;
        let raw: serde_json::Value = Self::decode(&text)?;
        let mut login: LoginResponse = serde_json::from_value(raw.clone())?;
        login.raw = raw;
        Ok(login)
    }

    /// Register a new user (`POST /users`).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Parse rejects the user
    /// (e.g. the username is taken).
    #[instrument(skip(self, user), fields(username = %user.username))]
    pub async fn sign_up(&self, user: &NewUser<'_>) -> Result<CreatedObject, ParseError> {
        let url = self.endpoint(&["users"])?;
        let response = self.inner.client.post(url).json(user).send().await?;
        Self::decode(&Self::read_body(response).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn client(base: &str) -> ParseClient {
        ParseClient::new(&ParseConfig {
            base_url: Url::parse(base).unwrap(),
            app_id: "app".to_string(),
            rest_key: SecretString::from("key"),
        })
        .unwrap()
    }

    #[test]
    fn test_class_endpoints_live_under_classes() {
        let client = client("https://parseapi.back4app.com");
        assert_eq!(
            client.endpoint(&["classes", "CartSession"]).unwrap().as_str(),
            "https://parseapi.back4app.com/classes/CartSession"
        );
        assert_eq!(
            client.endpoint(&["classes", "CartSession", "abc"]).unwrap().as_str(),
            "https://parseapi.back4app.com/classes/CartSession/abc"
        );
    }

    #[test]
    fn test_user_endpoints_live_at_root() {
        let client = client("https://example.test/parse/");
        assert_eq!(
            client.endpoint(&["login"]).unwrap().as_str(),
            "https://example.test/parse/login"
        );
    }

    #[test]
    fn test_invalid_login_detection() {
        let err = ParseError::Api {
            status: 404,
            code: INVALID_LOGIN_CODE,
            message: "Invalid username/password.".to_string(),
        };
        assert!(err.is_invalid_login());

        let err = ParseError::Api {
            status: 500,
            code: 1,
            message: "Internal server error".to_string(),
        };
        assert!(!err.is_invalid_login());
    }

    #[test]
    fn test_api_error_display() {
        let err = ParseError::Api {
            status: 400,
            code: 202,
            message: "Account already exists for this username.".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "API error: 400 - Account already exists for this username. (code 202)"
        );
    }
}
