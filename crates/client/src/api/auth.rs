// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::future::Future;
use std::pin::Pin;

use reqwest::Client;
use tracing::debug;

use crate::api::types::{
    AuthSessionResponse, ExchangeRequest, GenerateTokenRequest, GenerateTokenResponse, MeResponse,
    RefreshRequest, VerifyTokenResponse,
};
use crate::api::{check_status, ApiClient, ApiRequest};
use crate::error::{ApiError, ErrorBody};
use crate::session::controller::AuthApi;
use crate::session::refresh::{RefreshError, TokenRefresher};
use crate::session::TokenSet;

/// Calls that must never go through 401 recovery: code exchange happens
/// before there is a session, and refresh is the recovery itself.
#[derive(Clone)]
pub struct AuthEndpoint {
    base_url: String,
    http: Client,
}

impl AuthEndpoint {
    pub fn new(base_url: String, http: Client) -> Self {
        Self { base_url, http }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Trade a one-time sign-in code for a session.
    pub async fn exchange(&self, code: &str) -> Result<TokenSet, ApiError> {
        let resp = self
            .http
            .post(self.url("/api/auth/exchange"))
            .json(&ExchangeRequest { code })
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let bytes = resp.bytes().await?;
        let session: AuthSessionResponse =
            serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(session.into_token_set())
    }

    async fn rotate(&self, refresh_token: &str) -> Result<TokenSet, RefreshError> {
        let resp = self
            .http
            .post(self.url("/api/auth/refresh"))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|e| RefreshError::Transport(e.to_string()))?;
        if !status.is_success() {
            let message = ErrorBody::message_from(&String::from_utf8_lossy(&bytes));
            return Err(RefreshError::Rejected { status: status.as_u16(), message });
        }
        let session: AuthSessionResponse =
            serde_json::from_slice(&bytes).map_err(|e| RefreshError::Decode(e.to_string()))?;
        debug!(expires_at = %session.access_token_expires_at, "refresh endpoint rotated tokens");
        Ok(session.into_token_set())
    }
}

impl TokenRefresher for AuthEndpoint {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenSet, RefreshError>> + Send + 'a>> {
        Box::pin(self.rotate(refresh_token))
    }
}

impl ApiClient {
    pub async fn exchange_code(&self, code: &str) -> Result<TokenSet, ApiError> {
        self.auth_endpoint().exchange(code).await
    }

    pub async fn me(&self) -> Result<MeResponse, ApiError> {
        self.execute_json(ApiRequest::get("/api/auth/me")).await
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        self.execute(ApiRequest::post("/api/auth/logout")).await?;
        Ok(())
    }

    /// Mint a long-lived API token bound to the signed-in user.
    pub async fn generate_token(
        &self,
        description: &str,
        expires_in_days: Option<u32>,
    ) -> Result<GenerateTokenResponse, ApiError> {
        let req = ApiRequest::post("/api/auth/token/generate")
            .json(&GenerateTokenRequest { description, expires_in_days })?;
        let resp: GenerateTokenResponse = self.execute_json(req).await?;
        debug!(description, expires_at = ?resp.token.expires_at, "api token generated");
        Ok(resp)
    }

    /// Check that the current bearer token is accepted.
    pub async fn verify_token(&self) -> Result<VerifyTokenResponse, ApiError> {
        self.execute_json(ApiRequest::get("/api/auth/token/verify")).await
    }
}

impl AuthApi for ApiClient {
    fn me(&self) -> Pin<Box<dyn Future<Output = Result<MeResponse, ApiError>> + Send + '_>> {
        Box::pin(ApiClient::me(self))
    }

    fn logout(&self) -> Pin<Box<dyn Future<Output = Result<(), ApiError>> + Send + '_>> {
        Box::pin(ApiClient::logout(self))
    }
}
