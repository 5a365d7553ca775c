//! Customer accounts on the Parse `_User` class.
//!
//! Login stores the session token and user record locally; the presence of
//! the token is what "logged in" means for the client. Logging out never
//! touches the anonymous cart session id, so the cart survives.

use pokebolsa_core::UserId;
use thiserror::Error;
use tracing::{info, instrument};

use crate::parse::{NewUser, ParseClient, ParseError};
use crate::storage::{KeyValueStore, StorageError, keys};

/// A required form field was empty. Raised before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("login succeeded but no session token was returned")]
    MissingToken,

    #[error("account request failed: {0}")]
    Store(#[source] ParseError),

    #[error("local storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<ParseError> for AuthError {
    fn from(e: ParseError) -> Self {
        if e.is_invalid_login() {
            Self::InvalidCredentials
        } else {
            Self::Store(e)
        }
    }
}

/// A logged-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub user_id: UserId,
    pub username: Option<String>,
    pub email: Option<String>,
}

fn require<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(value)
}

/// Login, registration and logout against Parse.
#[derive(Debug, Clone)]
pub struct AccountService<K> {
    client: ParseClient,
    storage: K,
}

impl<K: KeyValueStore> AccountService<K> {
    pub const fn new(client: ParseClient, storage: K) -> Self {
        Self { client, storage }
    }

    /// Log in and remember the session locally.
    ///
    /// # Errors
    ///
    /// [`AuthError::Validation`] for an empty field,
    /// [`AuthError::InvalidCredentials`] when Parse rejects the pair, or a
    /// store/storage error.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<Account, AuthError> {
        let username = require("username", username)?;
        // Passwords are sent as typed.
        if password.is_empty() {
            return Err(ValidationError::MissingField("password").into());
        }

        let response = self.client.login(username, password).await?;
        let token = response
            .session_token
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;
        let user_id = UserId::new(response.object_id.unwrap_or_default());

        self.storage.set(keys::USER_TOKEN, &token).await?;
        self.storage.set(keys::USER_ID, user_id.as_str()).await?;
        self.storage
            .set(keys::USER_DATA, &response.raw.to_string())
            .await?;

        info!(user_id = %user_id, "User logged in");
        Ok(Account {
            user_id,
            username: response.username,
            email: response.email,
        })
    }

    /// Register a new user. The email doubles as the username.
    ///
    /// Does not log the user in.
    ///
    /// # Errors
    ///
    /// [`AuthError::Validation`] for an empty field, or the store's
    /// rejection (e.g. the email is already taken).
    #[instrument(skip(self, password))]
    pub async fn sign_up(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<UserId, AuthError> {
        let name = require("name", name)?;
        let email = require("email", email)?;
        if password.is_empty() {
            return Err(ValidationError::MissingField("password").into());
        }

        let created = self
            .client
            .sign_up(&NewUser {
                username: email,
                password,
                email,
                name,
            })
            .await
            .map_err(AuthError::Store)?;

        let user_id = UserId::new(created.object_id.unwrap_or_default());
        info!(user_id = %user_id, "User registered");
        Ok(user_id)
    }

    /// Whether a session token is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store cannot be read.
    pub async fn is_logged_in(&self) -> Result<bool, StorageError> {
        Ok(self
            .storage
            .get(keys::USER_TOKEN)
            .await?
            .is_some_and(|token| !token.is_empty()))
    }

    /// Forget the logged-in user. The cart session id is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store cannot be written.
    pub async fn logout(&self) -> Result<(), StorageError> {
        for key in [keys::USER_TOKEN, keys::USER_ID, keys::USER_DATA] {
            self.storage.remove(key).await?;
        }
        info!("User logged out");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;
    use url::Url;

    use super::*;
    use crate::config::ParseConfig;
    use crate::storage::MemoryStore;

    // Nothing listens here; validation must fail before any request.
    fn service() -> AccountService<MemoryStore> {
        let client = ParseClient::new(&ParseConfig {
            base_url: Url::parse("http://127.0.0.1:9").unwrap(),
            app_id: "app".to_string(),
            rest_key: SecretString::from("key"),
        })
        .unwrap();
        AccountService::new(client, MemoryStore::new())
    }

    #[tokio::test]
    async fn test_login_requires_both_fields() {
        let service = service();
        assert!(matches!(
            service.login("", "pw").await,
            Err(AuthError::Validation(ValidationError::MissingField("username")))
        ));
        assert!(matches!(
            service.login("ash", "").await,
            Err(AuthError::Validation(ValidationError::MissingField("password")))
        ));
    }

    #[tokio::test]
    async fn test_sign_up_requires_all_fields() {
        let service = service();
        assert!(matches!(
            service.sign_up("  ", "a@b.c", "pw").await,
            Err(AuthError::Validation(ValidationError::MissingField("name")))
        ));
        assert!(matches!(
            service.sign_up("Ash", "", "pw").await,
            Err(AuthError::Validation(ValidationError::MissingField("email")))
        ));
    }

    #[tokio::test]
    async fn test_logout_keeps_session_id() {
        let service = service();
        service.storage.set(keys::SESSION_ID, "sess_1_abc").await.unwrap();
        service.storage.set(keys::USER_TOKEN, "r:tok").await.unwrap();
        service.storage.set(keys::USER_ID, "u1").await.unwrap();
        assert!(service.is_logged_in().await.unwrap());

        service.logout().await.unwrap();

        assert!(!service.is_logged_in().await.unwrap());
        assert!(service.storage.get(keys::USER_ID).await.unwrap().is_none());
        assert_eq!(
            service.storage.get(keys::SESSION_ID).await.unwrap().as_deref(),
            Some("sess_1_abc")
        );
    }

    #[test]
    fn test_invalid_login_maps_to_invalid_credentials() {
        let err = AuthError::from(ParseError::Api {
            status: 404,
            code: 101,
            message: "Invalid username/password.".to_string(),
        });
        assert!(matches!(err, AuthError::InvalidCredentials));
    }
}
