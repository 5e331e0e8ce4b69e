// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, Semaphore};

use super::*;

struct FakeSynth {
    calls: AtomicU32,
    fail: bool,
    gate: Option<Semaphore>,
}

impl FakeSynth {
    fn ok() -> Arc<Self> {
        Arc::new(Self { calls: AtomicU32::new(0), fail: false, gate: None })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self { calls: AtomicU32::new(0), fail: true, gate: None })
    }

    fn gated() -> Arc<Self> {
        Arc::new(Self { calls: AtomicU32::new(0), fail: false, gate: Some(Semaphore::new(0)) })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Synthesizer for FakeSynth {
    fn synthesize<'a>(
        &'a self,
        text: &'a str,
        voice: Voice,
        speed: f32,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Bytes>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(ref gate) = self.gate {
                let _permit = gate.acquire().await?;
            }
            if self.fail {
                anyhow::bail!("backend unavailable");
            }
            Ok(Bytes::from(format!("{text}|{voice}|{speed}")))
        })
    }
}

/// Output that reports `first` as soon as a payload is loaded and keeps the
/// event sender so tests can drive the rest of the lifecycle.
struct FakeOutput {
    first: PlaybackEvent,
    /// Payload prefix whose `play` blocks the calling thread, and for how long.
    slow: Option<(&'static str, Duration)>,
    plays: Mutex<Vec<(mpsc::Sender<PlaybackEvent>, CancellationToken, Bytes)>>,
}

impl FakeOutput {
    fn new(first: PlaybackEvent) -> Arc<Self> {
        Arc::new(Self { first, slow: None, plays: Mutex::new(Vec::new()) })
    }

    fn slow_for(prefix: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            first: PlaybackEvent::Started,
            slow: Some((prefix, delay)),
            plays: Mutex::new(Vec::new()),
        })
    }

    fn live(&self) -> usize {
        self.plays.lock().iter().filter(|(_, c, _)| !c.is_cancelled()).count()
    }

    fn play_count(&self) -> usize {
        self.plays.lock().len()
    }

    fn cancelled(&self, index: usize) -> Option<bool> {
        self.plays.lock().get(index).map(|(_, c, _)| c.is_cancelled())
    }

    fn sender(&self, index: usize) -> Option<mpsc::Sender<PlaybackEvent>> {
        self.plays.lock().get(index).map(|(tx, _, _)| tx.clone())
    }
}

impl AudioOutput for FakeOutput {
    fn play(&self, audio: Bytes) -> anyhow::Result<Playback> {
        if let Some((prefix, delay)) = self.slow {
            if audio.starts_with(prefix.as_bytes()) {
                std::thread::sleep(delay);
            }
        }
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        tx.try_send(self.first.clone())?;
        self.plays.lock().push((tx, cancel.clone(), audio));
        Ok(Playback::new(rx, cancel))
    }
}

async fn wait_for_state(
    player: &SpeechPlayer,
    cond: impl Fn(&SpeechState) -> bool,
) -> anyhow::Result<()> {
    let mut rx = player.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| cond(s))).await??;
    Ok(())
}

#[tokio::test]
async fn repeated_speak_synthesizes_once() -> anyhow::Result<()> {
    let synth = FakeSynth::ok();
    let output = FakeOutput::new(PlaybackEvent::Started);
    let player = SpeechPlayer::new(synth.clone(), output.clone());

    player.speak("早餐 35 元").await?;
    player.speak("早餐 35 元").await?;

    assert_eq!(synth.calls(), 1);
    assert_eq!(output.play_count(), 2);
    assert_eq!(player.cached_len(), 1);
    Ok(())
}

#[tokio::test]
async fn speed_change_is_a_cache_miss() -> anyhow::Result<()> {
    let synth = FakeSynth::ok();
    let player = SpeechPlayer::new(synth.clone(), FakeOutput::new(PlaybackEvent::Started));

    player.speak("hello").await?;
    player.set_speed(1.5);
    assert!(!player.is_cached("hello"));
    player.speak("hello").await?;

    assert_eq!(synth.calls(), 2);
    assert_eq!(player.cached_len(), 2);
    Ok(())
}

#[tokio::test]
async fn speed_is_clamped() {
    let player = SpeechPlayer::new(FakeSynth::ok(), FakeOutput::new(PlaybackEvent::Started));
    player.set_speed(9.0);
    assert!((player.speed() - 4.0).abs() < f32::EPSILON);
    player.set_speed(0.0);
    assert!((player.speed() - 0.25).abs() < f32::EPSILON);
}

#[tokio::test]
async fn new_speak_stops_previous_playback() -> anyhow::Result<()> {
    let output = FakeOutput::new(PlaybackEvent::Started);
    let player = SpeechPlayer::new(FakeSynth::ok(), output.clone());

    player.speak("first").await?;
    assert_eq!(output.cancelled(0), Some(false));
    player.speak("second").await?;

    assert_eq!(output.cancelled(0), Some(true));
    assert_eq!(output.cancelled(1), Some(false));
    let state = player.state();
    assert_eq!(state.phase, SpeechPhase::Playing);
    assert!(state.is_speaking);
    assert!(!state.is_loading);
    Ok(())
}

#[tokio::test]
async fn finished_playback_returns_to_idle() -> anyhow::Result<()> {
    let output = FakeOutput::new(PlaybackEvent::Started);
    let player = SpeechPlayer::new(FakeSynth::ok(), output.clone());

    player.speak("done soon").await?;
    let tx = output.sender(0).ok_or_else(|| anyhow::anyhow!("no playback"))?;
    tx.send(PlaybackEvent::Finished).await?;

    wait_for_state(&player, |s| s.phase == SpeechPhase::Idle && !s.is_speaking).await?;
    assert_eq!(output.cancelled(0), Some(true));
    Ok(())
}

#[tokio::test]
async fn preload_fills_cache_silently() -> anyhow::Result<()> {
    let synth = FakeSynth::ok();
    let output = FakeOutput::new(PlaybackEvent::Started);
    let player = SpeechPlayer::new(synth.clone(), output.clone());

    player.preload("later").await;
    assert!(player.is_cached("later"));
    assert_eq!(player.state(), SpeechState::default());
    assert_eq!(output.play_count(), 0);

    player.speak("later").await?;
    assert_eq!(synth.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn preload_failure_is_not_surfaced() {
    let player = SpeechPlayer::new(FakeSynth::failing(), FakeOutput::new(PlaybackEvent::Started));
    player.preload("nope").await;
    assert!(!player.is_cached("nope"));
    assert_eq!(player.state(), SpeechState::default());
}

#[tokio::test]
async fn synthesis_failure_sets_error_state() {
    let player = SpeechPlayer::new(FakeSynth::failing(), FakeOutput::new(PlaybackEvent::Started));

    let result = player.speak("hello").await;
    assert!(matches!(result, Err(SpeechError::Synthesis(_))));

    let state = player.state();
    assert_eq!(state.phase, SpeechPhase::Error);
    assert!(!state.is_loading);
    assert!(!state.is_speaking);
    assert!(matches!(state.error, Some(SpeechError::Synthesis(_))));
    assert!(!player.is_cached("hello"));
}

#[tokio::test]
async fn playback_failure_keeps_cached_audio() {
    let synth = FakeSynth::ok();
    let output = FakeOutput::new(PlaybackEvent::Failed("device busy".into()));
    let player = SpeechPlayer::new(synth.clone(), output);

    let result = player.speak("hello").await;
    assert_eq!(result, Err(SpeechError::Playback("device busy".into())));
    assert!(player.is_cached("hello"));
    assert_eq!(player.state().phase, SpeechPhase::Error);

    let _ = player.speak("hello").await;
    assert_eq!(synth.calls(), 1);
}

#[tokio::test]
async fn stop_discards_in_flight_speak() -> anyhow::Result<()> {
    let synth = FakeSynth::gated();
    let output = FakeOutput::new(PlaybackEvent::Started);
    let player = SpeechPlayer::new(synth.clone(), output.clone());

    let pending = {
        let p = Arc::clone(&player);
        tokio::spawn(async move { p.speak("slow").await })
    };
    wait_for_state(&player, |s| s.is_loading).await?;
    player.stop();
    let state = player.state();
    assert!(!state.is_loading);
    assert_eq!(state.phase, SpeechPhase::Idle);

    if let Some(ref gate) = synth.gate {
        gate.add_permits(1);
    }
    pending.await??;

    assert_eq!(output.play_count(), 0);
    assert!(player.is_cached("slow"));
    assert_eq!(player.state().phase, SpeechPhase::Idle);
    Ok(())
}

#[tokio::test]
async fn blank_text_is_ignored() -> anyhow::Result<()> {
    let synth = FakeSynth::ok();
    let player = SpeechPlayer::new(synth.clone(), FakeOutput::new(PlaybackEvent::Started));
    player.speak("   ").await?;
    player.preload("").await;
    assert_eq!(synth.calls(), 0);
    assert_eq!(player.state(), SpeechState::default());
    Ok(())
}

#[tokio::test]
async fn next_speak_clears_previous_error() -> anyhow::Result<()> {
    let synth = FakeSynth::ok();
    let output = FakeOutput::new(PlaybackEvent::Started);
    let player = SpeechPlayer::new(synth, output.clone());

    player.speak("one").await?;
    let tx = output.sender(0).ok_or_else(|| anyhow::anyhow!("no playback"))?;
    tx.send(PlaybackEvent::Failed("underrun".into())).await?;
    wait_for_state(&player, |s| s.phase == SpeechPhase::Error).await?;

    player.speak("two").await?;
    let state = player.state();
    assert_eq!(state.error, None);
    assert_eq!(state.phase, SpeechPhase::Playing);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_speaks_leave_one_live_playback() -> anyhow::Result<()> {
    let output = FakeOutput::slow_for("slow", Duration::from_millis(300));
    let player = SpeechPlayer::new(FakeSynth::ok(), output.clone());

    let stale = {
        let p = Arc::clone(&player);
        tokio::spawn(async move { p.speak("slow").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    player.speak("fast").await?;
    stale.await??;

    assert_eq!(output.play_count(), 2);
    assert_eq!(output.live(), 1);
    assert_eq!(player.state().phase, SpeechPhase::Playing);

    player.stop();
    assert_eq!(output.live(), 0);
    Ok(())
}
