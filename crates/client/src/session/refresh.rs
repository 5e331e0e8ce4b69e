// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight token refresh shared by the 401 path and the proactive timer.
//!
//! The first caller runs the refresh. Everyone arriving while it is in flight
//! parks a oneshot sender in a FIFO queue and receives the same outcome when
//! the refresh settles.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::session::store::TokenStore;
use crate::session::{RefreshTrigger, SessionEvent, TokenSet};

/// Calls the backend refresh endpoint. Implementations must not route the
/// call back through 401 recovery.
pub trait TokenRefresher: Send + Sync + 'static {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenSet, RefreshError>> + Send + 'a>>;
}

/// Why a refresh did not produce new tokens. Every outcome is session-fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// No refresh token is stored.
    NoRefreshToken,
    /// Refresh endpoint answered with an error status.
    Rejected { status: u16, message: String },
    /// The refresh call never got a response.
    Transport(String),
    /// Refresh response was malformed.
    Decode(String),
    /// Rotated tokens could not be written to storage.
    Persist(String),
    /// The refreshing task was dropped before it settled.
    Abandoned,
}

impl std::fmt::Display for RefreshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoRefreshToken => f.write_str("no refresh token available"),
            Self::Rejected { status, message } => {
                write!(f, "refresh rejected (HTTP {status}): {message}")
            }
            Self::Transport(msg) => write!(f, "refresh transport error: {msg}"),
            Self::Decode(msg) => write!(f, "refresh response malformed: {msg}"),
            Self::Persist(msg) => write!(f, "failed to persist rotated tokens: {msg}"),
            Self::Abandoned => f.write_str("refresh abandoned before completion"),
        }
    }
}

impl std::error::Error for RefreshError {}

type Outcome = Result<TokenSet, RefreshError>;

#[derive(Default)]
struct Flight {
    refreshing: bool,
    waiters: Vec<oneshot::Sender<Outcome>>,
}

/// Coordinates every token refresh for one session.
pub struct RefreshCoordinator {
    store: Arc<TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
    flight: Mutex<Flight>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<TokenStore>, refresher: Arc<dyn TokenRefresher>) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(16);
        Arc::new(Self { store, refresher, flight: Mutex::new(Flight::default()), event_tx })
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Whether a refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.flight.lock().refreshing
    }

    /// Number of callers parked behind the in-flight refresh.
    pub fn queued(&self) -> usize {
        self.flight.lock().waiters.len()
    }

    /// Recover from a 401 on a request that was sent with `rejected_token`.
    ///
    /// If no refresh is in flight and the store already holds a different
    /// access token, a refresh completed after the request went out; the
    /// current token is returned without refreshing again.
    pub async fn recover(&self, rejected_token: Option<&str>) -> Result<String, RefreshError> {
        let trigger = RefreshTrigger::Rejected;
        let waiter = {
            let mut flight = self.flight.lock();
            if !flight.refreshing {
                if let Some(current) = self.store.access_token() {
                    if rejected_token != Some(current.as_str()) {
                        debug!("request used a superseded token, retrying with current one");
                        return Ok(current);
                    }
                }
            }
            join_or_lead(&mut flight, trigger)
        };
        self.finish(waiter, trigger).await.map(|t| t.access_token)
    }

    /// Refresh the session, joining an in-flight refresh if there is one.
    ///
    /// On success the store holds the rotated tokens; on failure it is empty.
    pub async fn refresh(&self, trigger: RefreshTrigger) -> Result<TokenSet, RefreshError> {
        let waiter = join_or_lead(&mut self.flight.lock(), trigger);
        self.finish(waiter, trigger).await
    }

    async fn finish(
        &self,
        waiter: Option<oneshot::Receiver<Outcome>>,
        trigger: RefreshTrigger,
    ) -> Outcome {
        if let Some(rx) = waiter {
            return rx.await.unwrap_or(Err(RefreshError::Abandoned));
        }

        let guard = FlightGuard { coordinator: self, settled: false };
        let outcome = self.run_refresh(trigger).await;
        guard.settle(&outcome);
        outcome
    }

    async fn run_refresh(&self, trigger: RefreshTrigger) -> Outcome {
        let Some(refresh_token) = self.store.refresh_token() else {
            warn!(?trigger, "no refresh token, clearing session");
            self.expire(trigger, &RefreshError::NoRefreshToken);
            return Err(RefreshError::NoRefreshToken);
        };

        match self.refresher.refresh(&refresh_token).await {
            Ok(tokens) => {
                if let Err(e) = self.store.set_session(&tokens) {
                    // The old refresh token is already spent.
                    let err = RefreshError::Persist(e.to_string());
                    self.expire(trigger, &err);
                    return Err(err);
                }
                info!(?trigger, expires_at = %tokens.expires_at, "session refreshed");
                let _ = self
                    .event_tx
                    .send(SessionEvent::Refreshed { trigger, expires_at: tokens.expires_at });
                Ok(tokens)
            }
            Err(e) => {
                warn!(?trigger, err = %e, "session refresh failed");
                self.expire(trigger, &e);
                Err(e)
            }
        }
    }

    fn expire(&self, trigger: RefreshTrigger, reason: &RefreshError) {
        self.store.clear();
        let _ = self.event_tx.send(SessionEvent::Expired { trigger, reason: reason.to_string() });
    }
}

/// Queue behind an in-flight refresh, or claim the flight for the caller.
fn join_or_lead(
    flight: &mut Flight,
    trigger: RefreshTrigger,
) -> Option<oneshot::Receiver<Outcome>> {
    if flight.refreshing {
        let (tx, rx) = oneshot::channel();
        flight.waiters.push(tx);
        debug!(?trigger, queued = flight.waiters.len(), "refresh in flight, queued");
        Some(rx)
    } else {
        flight.refreshing = true;
        None
    }
}

/// Resets the in-flight flag and drains the queue, even if the refreshing
/// future is dropped mid-flight.
struct FlightGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl FlightGuard<'_> {
    fn settle(mut self, outcome: &Outcome) {
        for tx in self.drain() {
            let _ = tx.send(outcome.clone());
        }
        self.settled = true;
    }

    fn drain(&self) -> Vec<oneshot::Sender<Outcome>> {
        let mut flight = self.coordinator.flight.lock();
        flight.refreshing = false;
        std::mem::take(&mut flight.waiters)
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            // Dropped senders resolve their receivers to `Abandoned`.
            drop(self.drain());
        }
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
