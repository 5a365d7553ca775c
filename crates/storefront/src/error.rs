//! Unified error handling with Sentry integration.
//!
//! Every component catches its own remote failures; what reaches the shell
//! is an `AppError`. [`AppError::report`] captures the ones worth an alert
//! to Sentry, and [`AppError::notice`] gives the short user-facing text.

use thiserror::Error;

use crate::account::{AuthError, ValidationError};
use crate::cart_store::{CartReadError, RemoteWriteError};
use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::parse::ParseError;
use crate::storage::StorageError;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Local key-value store failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Parse backend failed outside of a cart or account call.
    #[error("Backend error: {0}")]
    Parse(#[from] ParseError),

    /// Cart record could not be written.
    #[error("Cart save error: {0}")]
    RemoteWrite(#[from] RemoteWriteError),

    /// Cart record could not be read.
    #[error("Cart load error: {0}")]
    CartRead(#[from] CartReadError),

    /// Catalog fetch failed.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Login or registration failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Something the user asked for does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        Self::Auth(AuthError::Validation(e))
    }
}

impl AppError {
    /// Whether this error indicates a fault rather than user input.
    #[must_use]
    pub const fn is_fault(&self) -> bool {
        match self {
            Self::Config(_)
            | Self::Storage(_)
            | Self::Parse(_)
            | Self::RemoteWrite(_)
            | Self::CartRead(_) => true,
            Self::Catalog(err) => !err.is_cancelled(),
            Self::Auth(err) => matches!(err, AuthError::Store(_) | AuthError::Storage(_)),
            Self::NotFound(_) => false,
        }
    }

    /// Log the error and capture faults to Sentry.
    pub fn report(&self) {
        if self.is_fault() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Operation failed"
            );
        } else {
            tracing::info!(error = %self, "Operation rejected");
        }
    }

    /// Short message for the user. Internal details stay in the logs.
    #[must_use]
    pub fn notice(&self) -> String {
        match self {
            Self::Config(err) => format!("Configuration problem: {err}"),
            Self::Storage(_) => "Could not access local data".to_string(),
            Self::Parse(_) | Self::CartRead(_) => "External service error".to_string(),
            Self::RemoteWrite(_) => "Cart could not be saved; it is kept on this device".to_string(),
            Self::Catalog(CatalogError::Cancelled) => "Cancelled".to_string(),
            Self::Catalog(_) => "Could not load products. Please try again".to_string(),
            Self::Auth(err) => match err {
                AuthError::Validation(ValidationError::MissingField(field)) => {
                    format!("Please fill in the {field} field")
                }
                AuthError::InvalidCredentials => "Invalid username or password".to_string(),
                AuthError::MissingToken => "Login failed, please try again".to_string(),
                AuthError::Store(_) | AuthError::Storage(_) => "Authentication error".to_string(),
            },
            Self::NotFound(what) => format!("Not found: {what}"),
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after a successful login to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of cart
/// actions leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("product_id", "xy1-1")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SourceError;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product xy1-1".to_string());
        assert_eq!(err.to_string(), "Not found: product xy1-1");
    }

    #[test]
    fn test_user_input_is_not_a_fault() {
        assert!(!AppError::from(ValidationError::MissingField("email")).is_fault());
        assert!(!AppError::Auth(AuthError::InvalidCredentials).is_fault());
        assert!(!AppError::Catalog(CatalogError::Cancelled).is_fault());
        assert!(
            AppError::Catalog(CatalogError::Unavailable {
                attempts: 3,
                last: SourceError::Status(500),
            })
            .is_fault()
        );
    }

    #[test]
    fn test_notices_hide_internals() {
        let err = AppError::RemoteWrite(RemoteWriteError::Unavailable(
            "connection refused 10.0.0.1".to_string(),
        ));
        assert!(!err.notice().contains("10.0.0.1"));

        let err = AppError::from(ValidationError::MissingField("password"));
        assert_eq!(err.notice(), "Please fill in the password field");
    }
}
