//! Linking platform accounts
//!
//! The OAuth dance is split in two: `authorization_url` produces the redirect
//! (plus the PKCE verifier where the platform wants one), and
//! `complete_connection` trades the returned code for a token, looks up the
//! account and records both.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{PlatformError, Result};
use crate::platforms::{AuthExtras, AuthUrl, PlatformAdapter};
use crate::registry::PlatformRegistry;
use crate::store::{ConnectionStore, TokenStore};
use crate::tokens::token_from_grant;
use crate::types::{Platform, PlatformConnection};

/// Connection state of one platform for a user
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub platform: Platform,
    /// An adapter is configured for the platform
    pub available: bool,
    pub connection: Option<PlatformConnection>,
    /// Unix seconds, 0 when the platform reported no expiry
    pub token_expires_at: Option<i64>,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| c.is_active)
    }
}

#[derive(Clone)]
pub struct ConnectionService {
    tokens: Arc<dyn TokenStore>,
    connections: Arc<dyn ConnectionStore>,
    registry: PlatformRegistry,
}

impl ConnectionService {
    pub fn new(
        tokens: Arc<dyn TokenStore>,
        connections: Arc<dyn ConnectionStore>,
        registry: PlatformRegistry,
    ) -> Self {
        Self {
            tokens,
            connections,
            registry,
        }
    }

    fn adapter(&self, platform: Platform) -> Result<Arc<dyn PlatformAdapter>> {
        self.registry.get(platform).ok_or_else(|| {
            PlatformError::NotAvailable(format!(
                "{} is not configured",
                platform.display_name()
            ))
            .into()
        })
    }

    /// Start linking `platform`. The caller keeps `state` and
    /// `code_verifier` until the callback arrives.
    pub fn authorization_url(&self, platform: Platform) -> Result<AuthUrl> {
        self.adapter(platform)?.generate_auth_url()
    }

    /// Finish linking: exchange the code, store the token and (re)activate
    /// the connection.
    pub async fn complete_connection(
        &self,
        user_id: i64,
        platform: Platform,
        code: &str,
        code_verifier: Option<String>,
    ) -> Result<PlatformConnection> {
        let adapter = self.adapter(platform)?;
        let grant = adapter
            .exchange_code(code, &AuthExtras { code_verifier })
            .await?;

        let now = Utc::now().timestamp();
        let token = token_from_grant(user_id, platform, grant, None, now);
        let account = adapter.user_info(&token.access_token).await?;
        self.tokens.upsert_token(&token).await?;

        let connection = PlatformConnection {
            user_id,
            platform,
            platform_user_id: account.platform_user_id,
            username: account.username,
            display_name: account.display_name,
            avatar_url: account.avatar_url,
            is_active: true,
            connected_at: now,
            last_used_at: None,
        };
        self.connections.upsert_connection(&connection).await?;

        info!(user_id, %platform, username = %connection.username, "Platform connected");
        Ok(connection)
    }

    /// Deactivate the connection and forget its token. Returns `false` when
    /// there was nothing to disconnect.
    pub async fn disconnect(&self, user_id: i64, platform: Platform) -> Result<bool> {
        let deactivated = self
            .connections
            .deactivate_connection(user_id, platform)
            .await?;
        let deleted = self.tokens.delete_token(user_id, platform).await?;
        if deactivated || deleted {
            info!(user_id, %platform, "Platform disconnected");
        } else {
            warn!(user_id, %platform, "Nothing to disconnect");
        }
        Ok(deactivated || deleted)
    }

    /// One entry per supported platform
    pub async fn status(&self, user_id: i64) -> Result<Vec<ConnectionStatus>> {
        let connections = self.connections.connected_platforms(user_id).await?;

        let mut statuses = Vec::with_capacity(Platform::ALL.len());
        for platform in Platform::ALL {
            let token_expires_at = self
                .tokens
                .get_token(user_id, platform)
                .await?
                .map(|t| t.expires_at);
            statuses.push(ConnectionStatus {
                platform,
                available: self.registry.is_registered(platform),
                connection: connections.iter().find(|c| c.platform == platform).cloned(),
                token_expires_at,
            });
        }
        Ok(statuses)
    }
}
