// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::speech::cache::{AudioCache, CacheKey};
use crate::speech::{
    clamp_speed, AudioOutput, Playback, PlaybackEvent, SpeechError, SpeechPhase, SpeechState,
    Synthesizer, Voice, DEFAULT_SPEED,
};

struct Settings {
    voice: Voice,
    speed: f32,
}

struct ActivePlayback {
    generation: u64,
    cancel: CancellationToken,
}

/// Plays one utterance at a time, synthesizing each distinct
/// `(text, voice, speed)` at most once per player.
///
/// Every `speak` and `stop` bumps a generation counter. Work started under an
/// older generation may still finish and fill the cache, but it never touches
/// the observable state or starts playback.
pub struct SpeechPlayer {
    synth: Arc<dyn Synthesizer>,
    output: Arc<dyn AudioOutput>,
    cache: AudioCache,
    settings: Mutex<Settings>,
    active: Mutex<Option<ActivePlayback>>,
    generation: AtomicU64,
    state_tx: watch::Sender<SpeechState>,
}

impl SpeechPlayer {
    pub fn new(synth: Arc<dyn Synthesizer>, output: Arc<dyn AudioOutput>) -> Arc<Self> {
        let (state_tx, _) = watch::channel(SpeechState::default());
        Arc::new(Self {
            synth,
            output,
            cache: AudioCache::new(),
            settings: Mutex::new(Settings { voice: Voice::default(), speed: DEFAULT_SPEED }),
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
            state_tx,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<SpeechState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> SpeechState {
        self.state_tx.borrow().clone()
    }

    pub fn voice(&self) -> Voice {
        self.settings.lock().voice
    }

    pub fn speed(&self) -> f32 {
        self.settings.lock().speed
    }

    /// Change the voice for subsequent calls. Playback in progress continues.
    pub fn set_voice(&self, voice: Voice) {
        self.settings.lock().voice = voice;
    }

    /// Change the speed for subsequent calls, clamped to the supported range.
    pub fn set_speed(&self, speed: f32) {
        self.settings.lock().speed = clamp_speed(speed);
    }

    pub fn is_cached(&self, text: &str) -> bool {
        self.cache.contains(&self.key_for(text))
    }

    /// Number of distinct utterances synthesized so far.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Speak `text`, stopping whatever was playing.
    ///
    /// Returns once playback has started (or, for a superseded call, once the
    /// call gives up). Completion is tracked in the background and reported
    /// through [`SpeechPlayer::subscribe`]. Blank text is a no-op.
    pub async fn speak(self: &Arc<Self>, text: &str) -> Result<(), SpeechError> {
        if text.trim().is_empty() {
            return Ok(());
        }

        let generation = self.teardown();
        self.state_tx.send_modify(|s| s.error = None);
        let key = self.key_for(text);

        let audio = match self.cache.get(&key) {
            Some(audio) => {
                debug!(voice = %key.voice(), "speech cache hit");
                audio
            }
            None => {
                self.state_tx.send_modify(|s| {
                    s.phase = SpeechPhase::Requesting;
                    s.is_loading = true;
                });
                match self.synth.synthesize(text, key.voice(), key.speed()).await {
                    Ok(audio) => {
                        debug!(voice = %key.voice(), bytes = audio.len(), "speech synthesized");
                        self.cache.insert(key, audio.clone());
                        audio
                    }
                    Err(e) => {
                        let err = SpeechError::Synthesis(format!("{e:#}"));
                        warn!(err = %err, "speech synthesis failed");
                        self.fail(generation, &err);
                        return Err(err);
                    }
                }
            }
        };

        if !self.is_current(generation) {
            debug!(generation, "speech superseded before playback");
            return Ok(());
        }

        let mut playback = match self.output.play(audio) {
            Ok(p) => p,
            Err(e) => {
                let err = SpeechError::Playback(format!("{e:#}"));
                warn!(err = %err, "audio output rejected payload");
                self.fail(generation, &err);
                return Err(err);
            }
        };
        let cancel = playback.cancel_token();
        {
            let mut active = self.active.lock();
            if !self.is_current(generation) {
                drop(active);
                debug!(generation, "speech superseded while loading audio");
                playback.stop();
                return Ok(());
            }
            let replaced = active.replace(ActivePlayback { generation, cancel: cancel.clone() });
            if let Some(previous) = replaced {
                previous.cancel.cancel();
            }
        }

        let first = tokio::select! {
            event = playback.next_event() => event,
            _ = cancel.cancelled() => return Ok(()),
        };
        match first {
            Some(PlaybackEvent::Started) => {
                if self.is_current(generation) {
                    self.state_tx.send_modify(|s| {
                        s.phase = SpeechPhase::Playing;
                        s.is_speaking = true;
                        s.is_loading = false;
                    });
                }
            }
            Some(PlaybackEvent::Finished) => {
                self.finish(generation);
                return Ok(());
            }
            Some(PlaybackEvent::Failed(msg)) => {
                let err = SpeechError::Playback(msg);
                self.fail(generation, &err);
                return Err(err);
            }
            None => {
                if !self.is_current(generation) {
                    return Ok(());
                }
                let err = SpeechError::Playback("audio output closed before playback".into());
                self.fail(generation, &err);
                return Err(err);
            }
        }

        let this = Arc::clone(self);
        tokio::spawn(async move { this.monitor(generation, playback).await });
        Ok(())
    }

    /// Synthesize and cache `text` without playing it. Failures are logged
    /// and never surface in the observable state.
    pub async fn preload(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let key = self.key_for(text);
        if self.cache.contains(&key) {
            return;
        }
        match self.synth.synthesize(text, key.voice(), key.speed()).await {
            Ok(audio) => {
                debug!(voice = %key.voice(), bytes = audio.len(), "speech preloaded");
                self.cache.insert(key, audio);
            }
            Err(e) => warn!("speech preload failed: {e:#}"),
        }
    }

    /// Stop playback and drop any in-flight `speak` on the floor.
    pub fn stop(&self) {
        self.teardown();
        self.state_tx.send_modify(|s| {
            s.is_speaking = false;
            s.is_loading = false;
            if s.phase != SpeechPhase::Error {
                s.phase = SpeechPhase::Idle;
            }
        });
    }

    /// Waits for the playback to end and settles state, unless it has been
    /// superseded in the meantime.
    async fn monitor(&self, generation: u64, mut playback: Playback) {
        let cancel = playback.cancel_token();
        loop {
            let event = tokio::select! {
                event = playback.next_event() => event,
                _ = cancel.cancelled() => return,
            };
            match event {
                Some(PlaybackEvent::Started) => continue,
                Some(PlaybackEvent::Finished) => {
                    debug!(generation, "speech finished");
                    self.finish(generation);
                }
                Some(PlaybackEvent::Failed(msg)) => {
                    let err = SpeechError::Playback(msg);
                    warn!(err = %err, "speech playback failed");
                    self.fail(generation, &err);
                }
                None => {
                    let err = SpeechError::Playback("audio output closed mid-playback".into());
                    self.fail(generation, &err);
                }
            }
            return;
        }
    }

    fn key_for(&self, text: &str) -> CacheKey {
        let settings = self.settings.lock();
        CacheKey::new(text, settings.voice, settings.speed)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Start a new generation and cancel whatever playback is active.
    ///
    /// The bump happens under the `active` lock so a call installing its
    /// playback either sees the new generation or is cancelled here.
    fn teardown(&self) -> u64 {
        let mut slot = self.active.lock();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(active) = slot.take() {
            debug!(generation = active.generation, "stopping active playback");
            active.cancel.cancel();
        }
        generation
    }

    /// Release the playback owned by `generation`, if it is still the active one.
    fn release(&self, generation: u64) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|a| a.generation == generation) {
            if let Some(a) = active.take() {
                a.cancel.cancel();
            }
        }
    }

    fn finish(&self, generation: u64) {
        self.release(generation);
        if self.is_current(generation) {
            self.state_tx.send_modify(|s| {
                s.phase = SpeechPhase::Idle;
                s.is_speaking = false;
                s.is_loading = false;
            });
        }
    }

    fn fail(&self, generation: u64, err: &SpeechError) {
        self.release(generation);
        if self.is_current(generation) {
            self.state_tx.send_modify(|s| {
                s.phase = SpeechPhase::Error;
                s.is_speaking = false;
                s.is_loading = false;
                s.error = Some(err.clone());
            });
        }
    }
}

#[cfg(test)]
#[path = "player_tests.rs"]
mod tests;
