// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::{Path, PathBuf};

use anyhow::Context;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::speech::{AudioOutput, Playback, PlaybackEvent};

/// Writes each payload to a file instead of a sound device.
///
/// Playback "finishes" as soon as the file is written.
#[derive(Debug, Clone)]
pub struct FileOutput {
    path: PathBuf,
}

impl FileOutput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AudioOutput for FileOutput {
    fn play(&self, audio: Bytes) -> anyhow::Result<Playback> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
        }
        std::fs::write(&self.path, &audio)
            .with_context(|| format!("write {}", self.path.display()))?;
        info!(path = %self.path.display(), bytes = audio.len(), "audio written");

        let (tx, rx) = mpsc::channel(2);
        tx.try_send(PlaybackEvent::Started)?;
        tx.try_send(PlaybackEvent::Finished)?;
        Ok(Playback::new(rx, CancellationToken::new()))
    }
}
