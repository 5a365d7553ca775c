//! Session and account commands.

use std::sync::Arc;

use pokebolsa_storefront::{AccountService, FileStore};
use pokebolsa_storefront::error::{Result, clear_sentry_user, set_sentry_user};
use tracing::info;

use super::Context;

fn service(ctx: &Context) -> AccountService<Arc<FileStore>> {
    AccountService::new(ctx.parse.clone(), Arc::clone(&ctx.storage))
}

/// Print the anonymous session id, creating it on first use.
///
/// # Errors
///
/// Returns an error if the local store cannot be read or written.
pub async fn session(ctx: &Context) -> Result<()> {
    let session_id = ctx.identity().get_or_create().await?;
    let logged_in = service(ctx).is_logged_in().await?;
    info!("Session: {session_id}");
    info!("Logged in: {}", if logged_in { "yes" } else { "no" });
    Ok(())
}

/// Log in and store the session token.
///
/// # Errors
///
/// Validation, credential, backend or storage errors.
pub async fn login(ctx: &Context, username: &str, password: &str) -> Result<()> {
    let account = service(ctx).login(username, password).await?;
    set_sentry_user(&account.user_id, account.email.as_deref());
    info!(
        "Welcome back, {}",
        account.username.as_deref().unwrap_or(username)
    );
    Ok(())
}

/// Create an account. Log in afterwards with `pokebolsa login`.
///
/// # Errors
///
/// Validation or backend errors.
pub async fn register(ctx: &Context, name: &str, email: &str, password: &str) -> Result<()> {
    let user_id = service(ctx).sign_up(name, email, password).await?;
    info!(user_id = %user_id, "Account created for {email}. You can now log in.");
    Ok(())
}

/// Forget the logged-in user; the cart stays.
///
/// # Errors
///
/// Returns an error if the local store cannot be written.
pub async fn logout(ctx: &Context) -> Result<()> {
    service(ctx).logout().await?;
    clear_sentry_user();
    info!("Logged out");
    Ok(())
}
