// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated HTTP client for the ledger backend.
//!
//! Every call goes through [`ApiClient::execute`], which attaches the current
//! bearer token and recovers from a 401 by refreshing once through the shared
//! [`RefreshCoordinator`] and retrying the request once.

pub mod auth;
pub mod health;
pub mod ledger;
pub mod speech;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ApiError, ErrorBody};
use crate::session::refresh::{RefreshCoordinator, RefreshError};
use crate::session::store::TokenStore;

pub use auth::AuthEndpoint;

/// A request as issued by a caller. `retried` is set before the one allowed
/// resend so a second 401 is returned instead of refreshing again.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    retried: bool,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path.into())
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path.into())
    }

    fn new(method: Method, path: String) -> Self {
        Self { method, path, query: Vec::new(), body: None, retried: false }
    }

    /// Append a query parameter. Values are form-encoded on send.
    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_owned(), value.into()));
        self
    }

    pub fn json(mut self, body: &impl serde::Serialize) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body).map_err(|e| ApiError::Decode(e.to_string()))?);
        Ok(self)
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

pub struct ApiClient {
    base_url: String,
    http: Client,
    store: Arc<TokenStore>,
    refresh: Arc<RefreshCoordinator>,
}

impl ApiClient {
    /// Build a client whose 401 recovery refreshes against the same backend.
    pub fn new(base_url: &str, timeout: Duration, store: Arc<TokenStore>) -> anyhow::Result<Arc<Self>> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        let http = Client::builder().timeout(timeout).build().context("building HTTP client")?;
        let endpoint = Arc::new(AuthEndpoint::new(base_url.clone(), http.clone()));
        let refresh = RefreshCoordinator::new(Arc::clone(&store), endpoint);
        Ok(Arc::new(Self { base_url, http, store, refresh }))
    }

    /// Build a client around an existing coordinator.
    pub fn with_coordinator(
        base_url: &str,
        http: Client,
        refresh: Arc<RefreshCoordinator>,
    ) -> Arc<Self> {
        let store = Arc::clone(refresh.store());
        Arc::new(Self { base_url: base_url.trim_end_matches('/').to_owned(), http, store, refresh })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.refresh
    }

    /// Unauthenticated endpoint for exchange and raw refresh calls.
    pub fn auth_endpoint(&self) -> AuthEndpoint {
        AuthEndpoint::new(self.base_url.clone(), self.http.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send `req` with the current bearer token, recovering once from a 401.
    ///
    /// Returns the response only if its status is a success.
    pub async fn execute(&self, mut req: ApiRequest) -> Result<Response, ApiError> {
        let sent_with = self.store.access_token();
        let resp = self.dispatch(&req, sent_with.as_deref()).await?;
        if resp.status() != StatusCode::UNAUTHORIZED || req.retried {
            return check_status(resp).await;
        }

        debug!(path = %req.path, "request rejected with 401, recovering session");
        let token = match self.refresh.recover(sent_with.as_deref()).await {
            Ok(token) => token,
            Err(RefreshError::NoRefreshToken) => {
                let body = resp.text().await.unwrap_or_default();
                return Err(ApiError::Unauthorized(ErrorBody::message_from(&body)));
            }
            Err(e) => return Err(ApiError::SessionExpired(e)),
        };

        req.retried = true;
        debug!(path = %req.path, "retrying with refreshed token");
        let resp = self.dispatch(&req, Some(&token)).await?;
        check_status(resp).await
    }

    /// Execute and decode a JSON response body.
    pub async fn execute_json<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T, ApiError> {
        let resp = self.execute(req).await?;
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn dispatch(&self, req: &ApiRequest, token: Option<&str>) -> Result<Response, ApiError> {
        let mut builder = self.http.request(req.method.clone(), self.url(&req.path));
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = req.body {
            builder = builder.json(body);
        }
        Ok(builder.send().await?)
    }
}

/// Pass successes through; turn anything else into [`ApiError::Status`].
pub(crate) async fn check_status(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::Status { status: status.as_u16(), message: ErrorBody::message_from(&body) })
}
