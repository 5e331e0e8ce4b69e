// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle: persisted credentials, single-flight token refresh,
//! and the controller that owns the signed-in view-state.
//!
//! The [`store::TokenStore`] is the only shared mutable credential state.
//! Both the API client's 401 recovery and the controller's proactive timer
//! refresh through the same [`refresh::RefreshCoordinator`], so at most one
//! refresh call is in flight at any time.

pub mod controller;
pub mod persist;
pub mod refresh;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the current credential was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// Interactive sign-in; short-lived access token plus refresh token.
    Oauth,
    /// Long-lived API token; never refreshed.
    ApiToken,
    #[serde(other)]
    Unknown,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Oauth => "oauth",
            Self::ApiToken => "api_token",
            Self::Unknown => "unknown",
        }
    }
}

/// Identity of the signed-in user as reported by `/api/auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

/// A full rotated credential set, as returned by exchange and refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Snapshot of the stored credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Whether the stored credentials are enough to schedule a proactive
    /// refresh (refresh token and expiry both present).
    pub fn is_refreshable(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some() && self.expires_at.is_some()
    }
}

/// What caused a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTrigger {
    /// A request was rejected with 401.
    Rejected,
    /// The controller's timer fired ahead of expiry.
    Proactive,
}

/// Events published by the refresh coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Tokens were rotated.
    Refreshed { trigger: RefreshTrigger, expires_at: DateTime<Utc> },
    /// The session could not be recovered and the store was cleared.
    Expired { trigger: RefreshTrigger, reason: String },
}
