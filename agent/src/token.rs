//! Token Manager (§2.6): process-wide JWT cache with expiry check and
//! refresh hook, consulted before each dial.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::TokenRefresher;
use crate::error::{ForwarderError, Result};

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Shared `{token, expires_at}` state guarded by a reader/writer lock.
/// Read-dominated: one read per dial, writes only on refresh.
pub struct TokenManager {
    refresher: Arc<dyn TokenRefresher>,
    state: RwLock<Option<CachedToken>>,
}

impl TokenManager {
    pub fn new(refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            refresher,
            state: RwLock::new(None),
        }
    }

    /// Returns a valid token, refreshing if the cached one is missing or
    /// expired. Duplicate concurrent refreshes across sessions are benign
    /// (§4.8): this does not serialize refreshes beyond the write lock.
    pub async fn token(&self) -> Result<String> {
        {
            let guard = self.state.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.expires_at > Instant::now() {
                    return Ok(cached.token.clone());
                }
            }
        }
        self.refresh().await
    }

    async fn refresh(&self) -> Result<String> {
        let previous_expiry = {
            let guard = self.state.read().await;
            guard.as_ref().map(|c| c.expires_at)
        };

        let refreshed = self
            .refresher
            .refresh()
            .await
            .map_err(|e| ForwarderError::auth(RefreshError(e.to_string())))?;

        // Invariant 4 (§3): monotonic in expiry within a single refresh.
        if let Some(prev) = previous_expiry {
            if refreshed.expires_at <= prev {
                warn!("token refresher returned a non-monotonic expiry");
            }
        }

        let mut guard = self.state.write().await;
        let token = refreshed.token.clone();
        *guard = Some(CachedToken {
            token: refreshed.token,
            expires_at: refreshed.expires_at,
        });
        debug!("token refreshed");
        Ok(token)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct RefreshError(String);
