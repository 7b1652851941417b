//! Access token freshness
//!
//! Before every publish the stored token is checked against its expiry:
//!
//! - already expired: refresh, and fail the job asking the user to reconnect
//!   if that does not work
//! - expiring within the lookahead window: refresh, but fall back to the
//!   current token if the refresh fails
//! - otherwise: use the stored token as is

use chrono::Utc;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{PlatformError, PolycastError, Result};
use crate::platforms::{PlatformAdapter, TokenGrant};
use crate::store::TokenStore;
use crate::types::{Platform, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    UseExisting,
    RefreshProactively,
    RefreshRequired,
}

/// Decide what to do with a token expiring at `expires_at` (unix seconds).
///
/// A non-positive `expires_at` means the platform never reported an expiry.
pub fn decide(expires_at: i64, now: i64, lookahead_secs: i64) -> RefreshDecision {
    if expires_at <= 0 {
        RefreshDecision::UseExisting
    } else if now >= expires_at {
        RefreshDecision::RefreshRequired
    } else if now.saturating_add(lookahead_secs) >= expires_at {
        RefreshDecision::RefreshProactively
    } else {
        RefreshDecision::UseExisting
    }
}

/// Build the stored form of a grant.
///
/// `previous_refresh` is kept when the grant carries no refresh token.
pub fn token_from_grant(
    user_id: i64,
    platform: Platform,
    grant: TokenGrant,
    previous_refresh: Option<SecretString>,
    now: i64,
) -> Token {
    let expires_at = if grant.expires_in > 0 {
        now + grant.expires_in
    } else {
        0
    };

    Token {
        user_id,
        platform,
        access_token: grant.access_token,
        refresh_token: grant.refresh_token.or(previous_refresh),
        token_type: if grant.token_type.is_empty() {
            "bearer".to_string()
        } else {
            grant.token_type
        },
        expires_at,
        scope: grant.scope,
        updated_at: now,
    }
}

fn reconnect(platform: Platform, detail: &str) -> PolycastError {
    PlatformError::Authentication(format!(
        "{} access token expired and could not be refreshed ({}). Please reconnect your {} account.",
        platform.display_name(),
        detail,
        platform.display_name()
    ))
    .into()
}

#[derive(Clone)]
pub struct TokenManager {
    tokens: Arc<dyn TokenStore>,
    lookahead_secs: i64,
}

impl TokenManager {
    pub fn new(tokens: Arc<dyn TokenStore>, lookahead: chrono::Duration) -> Self {
        Self {
            tokens,
            lookahead_secs: lookahead.num_seconds(),
        }
    }

    /// Usable access token for `user_id` on the adapter's platform.
    ///
    /// # Errors
    ///
    /// `PlatformError::Authentication` when no token is stored or an expired
    /// token cannot be refreshed.
    pub async fn access_token(
        &self,
        adapter: &dyn PlatformAdapter,
        user_id: i64,
    ) -> Result<SecretString> {
        let platform = adapter.platform();
        let token = self.tokens.get_token(user_id, platform).await?.ok_or_else(|| {
            PlatformError::Authentication(format!(
                "no {} token stored. Please reconnect your {} account.",
                platform.display_name(),
                platform.display_name()
            ))
        })?;

        let now = Utc::now().timestamp();
        match decide(token.expires_at, now, self.lookahead_secs) {
            RefreshDecision::UseExisting => Ok(token.access_token),
            RefreshDecision::RefreshRequired => {
                info!(user_id, %platform, "Access token expired, refreshing");
                let Token {
                    refresh_token,
                    ..
                } = token;
                let Some(refresh) = refresh_token else {
                    return Err(reconnect(platform, "no refresh token stored"));
                };
                match adapter.refresh_access_token(&refresh).await {
                    Ok(grant) => self.store(user_id, platform, grant, refresh, now).await,
                    Err(e) => Err(reconnect(platform, &e.detail())),
                }
            }
            RefreshDecision::RefreshProactively => {
                debug!(user_id, %platform, expires_at = token.expires_at, "Refreshing token ahead of expiry");
                let Token {
                    access_token,
                    refresh_token,
                    ..
                } = token;
                let Some(refresh) = refresh_token else {
                    return Ok(access_token);
                };
                match adapter.refresh_access_token(&refresh).await {
                    Ok(grant) => self.store(user_id, platform, grant, refresh, now).await,
                    Err(e) => {
                        warn!(user_id, %platform, error = %e, "Proactive token refresh failed, using current token");
                        Ok(access_token)
                    }
                }
            }
        }
    }

    async fn store(
        &self,
        user_id: i64,
        platform: Platform,
        grant: TokenGrant,
        previous_refresh: SecretString,
        now: i64,
    ) -> Result<SecretString> {
        let token = token_from_grant(user_id, platform, grant, Some(previous_refresh), now);
        self.tokens.upsert_token(&token).await?;
        info!(user_id, %platform, expires_at = token.expires_at, "Stored refreshed token");
        Ok(token.access_token)
    }
}
