// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use crate::speech::{clamp_speed, Voice};

/// Client configuration shared by every subcommand.
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// Base URL of the ledger backend.
    #[arg(long, default_value = "http://localhost:8000", env = "VOXLEDGER_API_URL")]
    pub api_url: String,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 30, env = "VOXLEDGER_TIMEOUT_SECS")]
    pub timeout_secs: u64,

    /// Refresh the access token this many seconds before it expires.
    #[arg(long, default_value_t = 60, env = "VOXLEDGER_REFRESH_BUFFER_SECS")]
    pub refresh_buffer_secs: u64,

    /// Directory holding the persisted session.
    #[arg(long, env = "VOXLEDGER_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Voice used for speech synthesis.
    #[arg(long, default_value = "nova", env = "VOXLEDGER_VOICE")]
    pub voice: Voice,

    /// Speech speed (0.25 to 4.0).
    #[arg(long, default_value_t = 1.0, env = "VOXLEDGER_SPEED")]
    pub speed: f32,

    /// Log filter (tracing `EnvFilter` syntax).
    #[arg(long, default_value = "info", env = "VOXLEDGER_LOG_LEVEL")]
    pub log_level: String,

    /// Log format: text or json.
    #[arg(long, default_value = "text", env = "VOXLEDGER_LOG_FORMAT")]
    pub log_format: String,
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.refresh_buffer_secs)
    }

    pub fn speed(&self) -> f32 {
        clamp_speed(self.speed)
    }

    /// Resolve the state directory.
    ///
    /// Checks `--state-dir`, then `$XDG_STATE_HOME/voxledger`, then
    /// `$HOME/.local/state/voxledger`.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("voxledger");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/voxledger");
        }
        PathBuf::from(".voxledger")
    }

    /// Path of the persisted session file.
    pub fn session_path(&self) -> PathBuf {
        self.state_dir().join("session.json")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_url.is_empty() {
            anyhow::bail!("--api-url must not be empty");
        }
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            anyhow::bail!("--api-url must be an http(s) URL: {}", self.api_url);
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("--timeout-secs must be greater than zero");
        }
        if !self.speed.is_finite() {
            anyhow::bail!("--speed must be a number");
        }
        match self.log_format.as_str() {
            "text" | "json" => Ok(()),
            other => anyhow::bail!("invalid log format: {other}"),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
