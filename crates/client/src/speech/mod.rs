// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Speech synthesis cache and single-utterance playback.
//!
//! Synthesis and playback sit behind [`Synthesizer`] and [`AudioOutput`] so
//! the cache and state machine in [`player::SpeechPlayer`] do not care where
//! audio comes from or how it is rendered.

pub mod cache;
#[cfg(feature = "native-audio")]
pub mod native;
pub mod output;
pub mod player;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ErrorCode;

pub const MIN_SPEED: f32 = 0.25;
pub const MAX_SPEED: f32 = 4.0;
pub const DEFAULT_SPEED: f32 = 1.0;

/// Clamp a speed to the range the backend accepts.
pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_finite() {
        speed.clamp(MIN_SPEED, MAX_SPEED)
    } else {
        DEFAULT_SPEED
    }
}

/// Synthesis voices offered by the backend.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Alloy,
    Ash,
    Ballad,
    Coral,
    Echo,
    Fable,
    Onyx,
    #[default]
    Nova,
    Sage,
    Shimmer,
    Verse,
}

impl Voice {
    pub const ALL: [Voice; 11] = [
        Self::Alloy,
        Self::Ash,
        Self::Ballad,
        Self::Coral,
        Self::Echo,
        Self::Fable,
        Self::Onyx,
        Self::Nova,
        Self::Sage,
        Self::Shimmer,
        Self::Verse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Ballad => "ballad",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Fable => "fable",
            Self::Onyx => "onyx",
            Self::Nova => "nova",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
            Self::Verse => "verse",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Voice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == lower)
            .ok_or_else(|| anyhow::anyhow!("unknown voice: {s}"))
    }
}

/// Turns text into encoded audio.
pub trait Synthesizer: Send + Sync + 'static {
    fn synthesize<'a>(
        &'a self,
        text: &'a str,
        voice: Voice,
        speed: f32,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Bytes>> + Send + 'a>>;
}

/// Lifecycle events of one playback resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started,
    Finished,
    Failed(String),
}

/// A loaded playback resource.
///
/// Stopping or dropping it cancels playback and releases the resource.
pub struct Playback {
    events: mpsc::Receiver<PlaybackEvent>,
    cancel: CancellationToken,
}

impl Playback {
    pub fn new(events: mpsc::Receiver<PlaybackEvent>, cancel: CancellationToken) -> Self {
        Self { events, cancel }
    }

    /// Next lifecycle event, or `None` once the output has gone away.
    pub async fn next_event(&mut self) -> Option<PlaybackEvent> {
        self.events.recv().await
    }

    /// Handle that stops this playback from elsewhere.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Renders encoded audio.
///
/// `play` loads the payload and begins playback; progress is reported on the
/// returned [`Playback`]. Implementations must stop promptly once its cancel
/// token fires.
pub trait AudioOutput: Send + Sync + 'static {
    fn play(&self, audio: Bytes) -> anyhow::Result<Playback>;
}

/// Where the player is in its `idle → requesting → playing → idle` cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechPhase {
    #[default]
    Idle,
    Requesting,
    Playing,
    Error,
}

/// Observable player state.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SpeechState {
    pub phase: SpeechPhase,
    pub is_speaking: bool,
    pub is_loading: bool,
    /// Most recent failure; cleared when the next `speak` starts.
    pub error: Option<SpeechError>,
}

/// Speech failures. Synthesis and playback are separate failure domains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechError {
    Synthesis(String),
    Playback(String),
}

impl SpeechError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Synthesis(_) => ErrorCode::Synthesis,
            Self::Playback(_) => ErrorCode::Playback,
        }
    }
}

impl fmt::Display for SpeechError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synthesis(msg) | Self::Playback(msg) => write!(f, "{}: {msg}", self.code()),
        }
    }
}

impl std::error::Error for SpeechError {}
