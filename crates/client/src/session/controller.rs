// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signed-in view-state and the proactive refresh timer.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::types::MeResponse;
use crate::error::ApiError;
use crate::session::refresh::RefreshCoordinator;
use crate::session::store::TokenStore;
use crate::session::{AuthType, RefreshTrigger, SessionEvent, TokenSet, UserInfo};

/// Identity calls the controller makes against the backend.
pub trait AuthApi: Send + Sync + 'static {
    fn me(&self) -> Pin<Box<dyn Future<Output = Result<MeResponse, ApiError>> + Send + '_>>;
    fn logout(&self) -> Pin<Box<dyn Future<Output = Result<(), ApiError>> + Send + '_>>;
}

/// What the UI should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Stored credentials have not been checked yet.
    Loading,
    Anonymous,
    Authenticated { user: UserInfo, auth_type: AuthType },
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    pub fn user(&self) -> Option<&UserInfo> {
        match self {
            Self::Authenticated { user, .. } => Some(user),
            _ => None,
        }
    }

    pub fn auth_type(&self) -> Option<AuthType> {
        match self {
            Self::Authenticated { auth_type, .. } => Some(*auth_type),
            _ => None,
        }
    }
}

/// Delay until a proactive refresh should fire: `expires_at - now - buffer`,
/// floored at zero.
pub fn refresh_delay(expires_at: DateTime<Utc>, now: DateTime<Utc>, buffer: Duration) -> Duration {
    let buffer = chrono::Duration::from_std(buffer).unwrap_or_else(|_| chrono::Duration::zero());
    (expires_at - now - buffer).to_std().unwrap_or(Duration::ZERO)
}

/// Owns login, logout, and refresh scheduling for one session. It is the
/// only writer of [`AuthState`].
pub struct SessionController {
    store: Arc<TokenStore>,
    refresh: Arc<RefreshCoordinator>,
    api: Arc<dyn AuthApi>,
    buffer: Duration,
    state_tx: watch::Sender<AuthState>,
    timer: Mutex<Option<CancellationToken>>,
    listening: AtomicBool,
    shutdown: CancellationToken,
}

impl SessionController {
    pub fn new(
        refresh: Arc<RefreshCoordinator>,
        api: Arc<dyn AuthApi>,
        buffer: Duration,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(AuthState::Loading);
        Arc::new(Self {
            store: Arc::clone(refresh.store()),
            refresh,
            api,
            buffer,
            state_tx,
            timer: Mutex::new(None),
            listening: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> AuthState {
        self.state_tx.borrow().clone()
    }

    /// Whether a proactive refresh is currently armed.
    pub fn is_scheduled(&self) -> bool {
        self.timer.lock().as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Resolve the initial state from stored credentials.
    ///
    /// With no stored token this goes straight to `Anonymous` without a
    /// network call. A refreshable stored session arms the proactive timer
    /// whatever the identity fetch returns.
    pub async fn start(self: &Arc<Self>) -> AuthState {
        self.listen();
        if self.store.access_token().is_none() {
            debug!("no stored session");
            self.cancel_timer();
            return self.publish(AuthState::Anonymous);
        }
        let state = self.refresh_user().await;
        // Armed from the stored credentials, independent of the identity outcome.
        if state.auth_type() == Some(AuthType::ApiToken) {
            self.cancel_timer();
        } else {
            self.schedule();
        }
        state
    }

    /// Sign in with an access token. With both a refresh token and an expiry
    /// the full session is stored and refreshed proactively; otherwise the
    /// token is treated as a static API token.
    pub async fn login(
        self: &Arc<Self>,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<AuthState> {
        self.listen();
        match (refresh_token, expires_at) {
            (Some(refresh_token), Some(expires_at)) => {
                self.store.set_session(&TokenSet {
                    access_token: access_token.to_owned(),
                    refresh_token: refresh_token.to_owned(),
                    expires_at,
                })?;
                self.schedule();
            }
            _ => {
                self.store.set_access_token(access_token)?;
                self.cancel_timer();
            }
        }
        let state = self.refresh_user().await;
        info!(authenticated = state.is_authenticated(), "login complete");
        Ok(state)
    }

    /// Sign out. The backend call is best-effort; local state is cleared
    /// whatever it returns.
    pub async fn logout(&self) {
        self.cancel_timer();
        if self.store.access_token().is_some() {
            if let Err(e) = self.api.logout().await {
                warn!(code = %e.code(), "backend logout failed: {e}");
            }
        }
        self.cancel_timer();
        self.store.clear();
        self.publish(AuthState::Anonymous);
        info!("logged out");
    }

    /// Re-fetch the current user.
    ///
    /// A session-fatal failure clears the stored credentials. Any other
    /// failure keeps them and leaves an authenticated view as it was.
    pub async fn refresh_user(&self) -> AuthState {
        if self.store.access_token().is_none() {
            self.cancel_timer();
            return self.publish(AuthState::Anonymous);
        }
        match self.api.me().await {
            Ok(me) => {
                if me.auth_type == AuthType::ApiToken {
                    self.cancel_timer();
                }
                debug!(user = %me.user.id, auth_type = me.auth_type.as_str(), "user refreshed");
                self.publish(AuthState::Authenticated { user: me.user, auth_type: me.auth_type })
            }
            Err(e) if e.code().is_session_fatal() => {
                warn!(code = %e.code(), "session rejected, signing out: {e}");
                self.cancel_timer();
                self.store.clear();
                self.publish(AuthState::Anonymous)
            }
            Err(e) => {
                warn!(code = %e.code(), "failed to fetch user: {e}");
                let current = self.state();
                if current.is_authenticated() {
                    current
                } else {
                    self.publish(AuthState::Anonymous)
                }
            }
        }
    }

    /// Stop the timer and the event listener.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn publish(&self, state: AuthState) -> AuthState {
        self.state_tx.send_replace(state.clone());
        state
    }

    /// Arm the proactive refresh against the stored expiry, replacing any
    /// timer already armed.
    fn schedule(self: &Arc<Self>) {
        let creds = self.store.snapshot();
        let Some(expires_at) = creds.expires_at.filter(|_| creds.is_refreshable()) else {
            self.cancel_timer();
            return;
        };

        let delay = refresh_delay(expires_at, Utc::now(), self.buffer);
        let token = self.shutdown.child_token();
        if let Some(previous) = self.timer.lock().replace(token.clone()) {
            previous.cancel();
        }
        debug!(delay_secs = delay.as_secs(), %expires_at, "proactive refresh armed");

        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if let Some(this) = weak.upgrade() {
                this.on_timer(&token).await;
            }
        });
    }

    async fn on_timer(self: Arc<Self>, token: &CancellationToken) {
        debug!("proactive refresh firing");
        match self.refresh.refresh(RefreshTrigger::Proactive).await {
            Ok(_) => {
                if token.is_cancelled() {
                    return;
                }
                self.refresh_user().await;
                if !token.is_cancelled() {
                    self.schedule();
                }
            }
            Err(e) => {
                warn!("proactive refresh failed, signing out: {e}");
                self.cancel_timer();
                self.publish(AuthState::Anonymous);
            }
        }
    }

    fn cancel_timer(&self) {
        if let Some(token) = self.timer.lock().take() {
            token.cancel();
            debug!("proactive refresh cancelled");
        }
    }

    /// Follow coordinator events: re-arm after a refresh the timer did not
    /// drive, drop to anonymous when the session expires.
    fn listen(self: &Arc<Self>) {
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut events = self.refresh.subscribe();
        let shutdown = self.shutdown.clone();
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => return,
                    event = events.recv() => event,
                };
                match event {
                    Ok(event) => {
                        if !handle_event(&weak, event) {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "session listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });
    }
}

/// Returns false once the controller is gone.
fn handle_event(weak: &Weak<SessionController>, event: SessionEvent) -> bool {
    let Some(this) = weak.upgrade() else {
        return false;
    };
    match event {
        SessionEvent::Refreshed { trigger: RefreshTrigger::Rejected, .. } => {
            if this.state().auth_type() != Some(AuthType::ApiToken) {
                this.schedule();
            }
        }
        SessionEvent::Refreshed { trigger: RefreshTrigger::Proactive, .. } => {}
        SessionEvent::Expired { trigger, reason } => {
            info!(?trigger, %reason, "session expired");
            this.cancel_timer();
            this.publish(AuthState::Anonymous);
        }
    }
    true
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
