// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-through credential store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::session::persist::KeyValueStore;
use crate::session::{Credentials, TokenSet};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const EXPIRES_AT_KEY: &str = "access_token_expires_at";

/// Single source of truth for the current credentials.
///
/// Every mutation persists first and then updates memory under the same lock,
/// so the two never diverge and readers never see a mix of old and new
/// values.
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
    current: Mutex<Credentials>,
}

impl TokenStore {
    /// Load the current credentials from `backend`.
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        let expires_at = backend.get(EXPIRES_AT_KEY).and_then(|raw| {
            match DateTime::parse_from_rfc3339(&raw) {
                Ok(t) => Some(t.with_timezone(&Utc)),
                Err(e) => {
                    warn!("ignoring unparseable persisted expiry: {e}");
                    None
                }
            }
        });
        let current = Credentials {
            access_token: backend.get(ACCESS_TOKEN_KEY),
            refresh_token: backend.get(REFRESH_TOKEN_KEY),
            expires_at,
        };
        Self { backend, current: Mutex::new(current) }
    }

    /// Replace the whole credential set (login with refresh, or rotation).
    pub fn set_session(&self, tokens: &TokenSet) -> anyhow::Result<()> {
        let mut current = self.current.lock();
        self.backend.apply(&[
            (ACCESS_TOKEN_KEY, Some(tokens.access_token.clone())),
            (REFRESH_TOKEN_KEY, Some(tokens.refresh_token.clone())),
            (EXPIRES_AT_KEY, Some(tokens.expires_at.to_rfc3339())),
        ])?;
        *current = Credentials {
            access_token: Some(tokens.access_token.clone()),
            refresh_token: Some(tokens.refresh_token.clone()),
            expires_at: Some(tokens.expires_at),
        };
        debug!(expires_at = %tokens.expires_at, "session stored");
        Ok(())
    }

    /// Store a static API token. Any refresh token and expiry are dropped.
    pub fn set_access_token(&self, token: &str) -> anyhow::Result<()> {
        let mut current = self.current.lock();
        self.backend.apply(&[
            (ACCESS_TOKEN_KEY, Some(token.to_owned())),
            (REFRESH_TOKEN_KEY, None),
            (EXPIRES_AT_KEY, None),
        ])?;
        *current = Credentials {
            access_token: Some(token.to_owned()),
            refresh_token: None,
            expires_at: None,
        };
        debug!("static access token stored");
        Ok(())
    }

    /// Remove every credential from memory and storage.
    ///
    /// Memory is cleared even if the durable write fails, so a broken disk
    /// can never keep a dead session alive in this process.
    pub fn clear(&self) {
        let mut current = self.current.lock();
        if let Err(e) = self.backend.apply(&[
            (ACCESS_TOKEN_KEY, None),
            (REFRESH_TOKEN_KEY, None),
            (EXPIRES_AT_KEY, None),
        ]) {
            warn!("failed to clear persisted session: {e}");
        }
        *current = Credentials::default();
        debug!("session cleared");
    }

    pub fn access_token(&self) -> Option<String> {
        self.current.lock().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.current.lock().refresh_token.clone()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.current.lock().expires_at
    }

    /// Consistent snapshot of all three fields.
    pub fn snapshot(&self) -> Credentials {
        self.current.lock().clone()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
