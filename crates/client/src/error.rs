// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::session::refresh::RefreshError;

/// Machine-readable error codes shared by the API client, the session
/// controller, and the speech player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Unauthorized,
    SessionExpired,
    BadRequest,
    NotFound,
    Upstream,
    Network,
    Decode,
    Synthesis,
    Playback,
    Internal,
}

impl ErrorCode {
    /// Classify a non-success HTTP status from the backend.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Unauthorized,
            404 => Self::NotFound,
            400..=499 => Self::BadRequest,
            500..=599 => Self::Upstream,
            _ => Self::Internal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::Upstream => "UPSTREAM_ERROR",
            Self::Network => "NETWORK",
            Self::Decode => "DECODE",
            Self::Synthesis => "SYNTHESIS_FAILED",
            Self::Playback => "PLAYBACK_FAILED",
            Self::Internal => "INTERNAL",
        }
    }

    /// Whether this error means the local session is gone and the user has
    /// to sign in again.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::SessionExpired)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body returned by the backend (`{"detail": ...}`).
///
/// `detail` is usually a string but validation failures return a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: serde_json::Value,
}

impl ErrorBody {
    /// Extract a human-readable message from a raw response body.
    pub fn message_from(body: &str) -> String {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody { detail: serde_json::Value::String(s) }) => s,
            Ok(ErrorBody { detail }) => detail.to_string(),
            Err(_) => body.trim().to_owned(),
        }
    }
}

/// Failure of a backend call made through [`crate::api::ApiClient`].
#[derive(Debug)]
pub enum ApiError {
    /// Connection, TLS, or timeout failure before a status was received.
    Transport(String),
    /// Backend answered with a non-success status.
    Status { status: u16, message: String },
    /// 401 with no refresh token to recover with. The session was cleared.
    Unauthorized(String),
    /// 401 and the refresh attempt failed. The session was cleared.
    SessionExpired(RefreshError),
    /// Response body did not match the expected shape.
    Decode(String),
}

impl ApiError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Transport(_) => ErrorCode::Network,
            Self::Status { status, .. } => ErrorCode::from_status(*status),
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::SessionExpired(_) => ErrorCode::SessionExpired,
            Self::Decode(_) => ErrorCode::Decode,
        }
    }

    /// HTTP status observed from the backend, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Unauthorized(_) => Some(401),
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "{}: {msg}", self.code()),
            Self::Status { status, message } => {
                write!(f, "{} (HTTP {status}): {message}", self.code())
            }
            Self::Unauthorized(msg) => write!(f, "{}: {msg}", self.code()),
            Self::SessionExpired(e) => write!(f, "{}: {e}", self.code()),
            Self::Decode(msg) => write!(f, "{}: {msg}", self.code()),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
