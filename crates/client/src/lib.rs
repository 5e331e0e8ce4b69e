// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Voxledger: client for the voice expense-ledger backend.
//!
//! Holds the signed-in session (with single-flight token refresh shared by
//! request recovery and a proactive timer) and a cached speech player.

pub mod api;
pub mod config;
pub mod error;
pub mod session;
pub mod speech;

use std::sync::{Arc, Once};

use crate::api::ApiClient;
use crate::config::ClientConfig;
use crate::session::controller::SessionController;
use crate::session::persist::FileStore;
use crate::session::store::TokenStore;
use crate::speech::player::SpeechPlayer;
use crate::speech::AudioOutput;

static CRYPTO: Once = Once::new();

/// Install the process-wide rustls crypto provider. Safe to call repeatedly.
pub fn ensure_crypto() {
    CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

pub fn init_tracing(config: &ClientConfig) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().with_writer(std::io::stderr).try_init(),
        _ => fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init(),
    };
    drop(result);
}

/// Everything a command needs, wired against one persisted session.
pub struct Client {
    pub api: Arc<ApiClient>,
    pub session: Arc<SessionController>,
}

impl Client {
    /// Open the persisted session and wire the API client and controller.
    pub fn open(config: &ClientConfig) -> anyhow::Result<Self> {
        ensure_crypto();
        let store = Arc::new(TokenStore::new(Arc::new(FileStore::open(config.session_path()))));
        let api = ApiClient::new(&config.api_url, config.timeout(), store)?;
        let session = SessionController::new(
            Arc::clone(api.coordinator()),
            api.clone(),
            config.refresh_buffer(),
        );
        Ok(Self { api, session })
    }

    /// Build a speech player that synthesizes through this client.
    pub fn speech_player(&self, config: &ClientConfig, output: Arc<dyn AudioOutput>) -> Arc<SpeechPlayer> {
        let player = SpeechPlayer::new(self.api.clone(), output);
        player.set_voice(config.voice);
        player.set_speed(config.speed());
        player
    }
}
