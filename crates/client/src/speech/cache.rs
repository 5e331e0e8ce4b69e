// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::speech::Voice;

/// Exact `(text, voice, speed)` composite. Any difference is a miss.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    text: String,
    voice: Voice,
    speed_bits: u32,
}

impl CacheKey {
    pub fn new(text: &str, voice: Voice, speed: f32) -> Self {
        Self { text: text.to_owned(), voice, speed_bits: speed.to_bits() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn voice(&self) -> Voice {
        self.voice
    }

    pub fn speed(&self) -> f32 {
        f32::from_bits(self.speed_bits)
    }
}

/// Synthesized audio for the lifetime of one player. Never evicts.
#[derive(Debug, Default)]
pub struct AudioCache {
    entries: Mutex<HashMap<CacheKey, Bytes>>,
}

impl AudioCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Bytes> {
        self.entries.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Store audio for `key`. An existing entry is kept.
    pub fn insert(&self, key: CacheKey, audio: Bytes) {
        self.entries.lock().entry(key).or_insert(audio);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
