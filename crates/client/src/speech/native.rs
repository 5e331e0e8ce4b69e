// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sound-device output through rodio.

use std::io::Cursor;
use std::time::Duration;

use bytes::Bytes;
use rodio::{Decoder, OutputStreamBuilder, Sink};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::speech::{AudioOutput, Playback, PlaybackEvent};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Plays encoded audio on the default output device.
///
/// Each playback owns its stream on a dedicated thread, polling the sink
/// until it drains or the playback is cancelled.
#[derive(Debug, Default, Clone, Copy)]
pub struct RodioOutput;

impl RodioOutput {
    pub fn new() -> Self {
        Self
    }
}

impl AudioOutput for RodioOutput {
    fn play(&self, audio: Bytes) -> anyhow::Result<Playback> {
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        std::thread::Builder::new()
            .name("voxledger-audio".into())
            .spawn(move || run(audio, &tx, &token))?;
        Ok(Playback::new(rx, cancel))
    }
}

fn run(audio: Bytes, tx: &mpsc::Sender<PlaybackEvent>, cancel: &CancellationToken) {
    let stream = match OutputStreamBuilder::open_default_stream() {
        Ok(s) => s,
        Err(e) => {
            let _ = tx.blocking_send(PlaybackEvent::Failed(format!("open audio output: {e}")));
            return;
        }
    };
    let source = match Decoder::new(Cursor::new(audio.to_vec())) {
        Ok(s) => s,
        Err(e) => {
            let _ = tx.blocking_send(PlaybackEvent::Failed(format!("decode audio: {e}")));
            return;
        }
    };

    let sink = Sink::connect_new(stream.mixer());
    sink.append(source);
    let _ = tx.blocking_send(PlaybackEvent::Started);

    loop {
        if cancel.is_cancelled() {
            sink.stop();
            debug!("native playback cancelled");
            return;
        }
        if sink.empty() {
            if tx.blocking_send(PlaybackEvent::Finished).is_err() {
                warn!("playback listener gone before finish");
            }
            return;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}
