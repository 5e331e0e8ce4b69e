// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process mock of the ledger backend.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use voxledger::api::ApiClient;
use voxledger::session::persist::MemoryStore;
use voxledger::session::store::TokenStore;

pub struct Backend {
    /// Access token the backend currently accepts.
    pub valid_access: Mutex<String>,
    /// Refresh token the backend currently accepts.
    pub valid_refresh: Mutex<String>,
    pub refresh_calls: AtomicU32,
    pub refresh_fails: AtomicBool,
    pub refresh_delay_ms: AtomicU64,
    pub synth_calls: AtomicU32,
    /// Bearer token of every authenticated request, in arrival order.
    pub seen_tokens: Mutex<Vec<String>>,
    pub seen_months: Mutex<Vec<Option<String>>>,
    /// Expiry stamped on the most recently issued access token.
    pub issued_expiry: Mutex<Option<String>>,
}

impl Backend {
    fn new(valid_access: &str, valid_refresh: &str) -> Self {
        Self {
            valid_access: Mutex::new(valid_access.to_owned()),
            valid_refresh: Mutex::new(valid_refresh.to_owned()),
            refresh_calls: AtomicU32::new(0),
            refresh_fails: AtomicBool::new(false),
            refresh_delay_ms: AtomicU64::new(0),
            synth_calls: AtomicU32::new(0),
            seen_tokens: Mutex::new(Vec::new()),
            seen_months: Mutex::new(Vec::new()),
            issued_expiry: Mutex::new(None),
        }
    }

    pub fn refresh_calls(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn seen_tokens(&self) -> Vec<String> {
        self.seen_tokens.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn issued_expiry(&self) -> Option<String> {
        self.issued_expiry.lock().ok().and_then(|v| v.clone())
    }

    /// Stamp a fresh one-hour expiry.
    fn issue_expiry(&self) -> String {
        let expiry = (Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        if let Ok(mut v) = self.issued_expiry.lock() {
            *v = Some(expiry.clone());
        }
        expiry
    }

    fn current_access(&self) -> String {
        self.valid_access.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Whether the request carries the currently accepted access token.
    fn authorized(&self, headers: &HeaderMap) -> bool {
        let token = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or_default()
            .to_owned();
        if let Ok(mut seen) = self.seen_tokens.lock() {
            seen.push(token.clone());
        }
        !token.is_empty() && token == self.current_access()
    }
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

fn unauthorized() -> Response {
    detail(StatusCode::UNAUTHORIZED, "未登入")
}

async fn refresh(State(b): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    let n = b.refresh_calls.fetch_add(1, Ordering::SeqCst) + 2;
    let delay = b.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if b.refresh_fails.load(Ordering::SeqCst) {
        return detail(StatusCode::UNAUTHORIZED, "Refresh token 無效");
    }
    let presented = body.get("refresh_token").and_then(Value::as_str).unwrap_or_default();
    let expected = b.valid_refresh.lock().map(|v| v.clone()).unwrap_or_default();
    if presented != expected {
        return detail(StatusCode::UNAUTHORIZED, "Refresh token 無效");
    }

    let access = format!("A{n}");
    let refresh = format!("R{n}");
    if let Ok(mut v) = b.valid_access.lock() {
        *v = access.clone();
    }
    if let Ok(mut v) = b.valid_refresh.lock() {
        *v = refresh.clone();
    }
    Json(json!({
        "success": true,
        "access_token": access,
        "refresh_token": refresh,
        "access_token_expires_at": b.issue_expiry(),
        "token_type": "Bearer",
        "auth_type": "oauth",
    }))
    .into_response()
}

async fn exchange(State(b): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    if body.get("code").and_then(Value::as_str) != Some("good-code") {
        return detail(StatusCode::UNAUTHORIZED, "交換碼無效");
    }
    Json(json!({
        "success": true,
        "access_token": b.current_access(),
        "refresh_token": b.valid_refresh.lock().map(|v| v.clone()).unwrap_or_default(),
        "access_token_expires_at": b.issue_expiry(),
        "token_type": "Bearer",
        "auth_type": "oauth",
    }))
    .into_response()
}

async fn me(State(b): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    if !b.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({
        "success": true,
        "user": { "id": "u1", "email": "u1@example.com", "name": "Test User", "picture": null },
        "auth_type": "oauth",
    }))
    .into_response()
}

async fn logout(State(b): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    if !b.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({ "success": true })).into_response()
}

async fn stats(
    State(b): State<Arc<Backend>>,
    headers: HeaderMap,
    Query(params): Query<std::collections::HashMap<String, String>>,
) -> Response {
    if !b.authorized(&headers) {
        return unauthorized();
    }
    if let Ok(mut months) = b.seen_months.lock() {
        months.push(params.get("month").cloned());
    }
    let month = params.get("month").cloned().unwrap_or_else(|| "2026-03".to_owned());
    Json(json!({
        "success": true,
        "data": {
            "month": month,
            "total": 900.0,
            "record_count": 4,
            "by_category": { "餐飲": 600.0, "交通": 300.0 },
        },
    }))
    .into_response()
}

async fn record(State(b): State<Arc<Backend>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !b.authorized(&headers) {
        return unauthorized();
    }
    let text = body.get("text").and_then(Value::as_str).unwrap_or_default();
    Json(json!({
        "success": true,
        "message": format!("已記錄：{text}"),
        "record": { "時間": "2026-03-01 12:30", "名稱": "排骨便當", "類別": "餐飲", "花費": 120, "幣別": "TWD", "支付方式": null },
        "feedback": null,
    }))
    .into_response()
}

async fn query(State(b): State<Arc<Backend>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !b.authorized(&headers) {
        return unauthorized();
    }
    let q = body.get("query").and_then(Value::as_str).unwrap_or_default();
    Json(json!({ "success": true, "response": format!("answer to {q}") })).into_response()
}

async fn synthesize(State(b): State<Arc<Backend>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !b.authorized(&headers) {
        return unauthorized();
    }
    b.synth_calls.fetch_add(1, Ordering::SeqCst);
    let text = body.get("text").and_then(Value::as_str).unwrap_or_default();
    let voice = body.get("voice").and_then(Value::as_str).unwrap_or_default();
    let speed = body.get("speed").and_then(Value::as_f64).unwrap_or_default();
    (StatusCode::OK, format!("audio:{text}:{voice}:{speed}")).into_response()
}

async fn voices() -> Response {
    Json(json!({
        "success": true,
        "voices": [
            { "id": "alloy", "name": "Alloy", "description": "中性、平衡" },
            { "id": "nova", "name": "Nova", "description": "女性、溫暖" },
        ],
    }))
    .into_response()
}

async fn generate_token(
    State(b): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !b.authorized(&headers) {
        return detail(StatusCode::UNAUTHORIZED, "必須先登入才能產生 API Token");
    }
    let description = body.get("description").and_then(Value::as_str).unwrap_or("Siri 捷徑");
    let expires_at = body
        .get("expires_in_days")
        .and_then(Value::as_i64)
        .map(|days| (Utc::now() + chrono::Duration::days(days)).naive_utc().to_string());
    Json(json!({
        "success": true,
        "token": "vxl_test_token",
        "description": description,
        "created_at": Utc::now().naive_utc().to_string(),
        "expires_at": expires_at,
        "message": "Token 已產生並綁定您的帳號",
    }))
    .into_response()
}

async fn verify_token(State(b): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    if !b.authorized(&headers) {
        return detail(StatusCode::UNAUTHORIZED, "無效的 Token");
    }
    Json(json!({ "success": true, "valid": true, "message": "Token 有效" })).into_response()
}

async fn health() -> Response {
    Json(json!({ "status": "healthy", "service": "ai-accounting" })).into_response()
}

async fn slow() -> Response {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(json!({ "success": true })).into_response()
}

async fn broken() -> Response {
    detail(StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

async fn always_unauthorized(State(b): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    b.authorized(&headers);
    unauthorized()
}

/// Start a backend that accepts `valid_access` / `valid_refresh`.
pub async fn spawn_backend(
    valid_access: &str,
    valid_refresh: &str,
) -> anyhow::Result<(SocketAddr, Arc<Backend>)> {
    let backend = Arc::new(Backend::new(valid_access, valid_refresh));
    let app = Router::new()
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/exchange", post(exchange))
        .route("/api/auth/me", get(me))
        .route("/api/auth/logout", post(logout))
        .route("/api/accounting/stats", get(stats))
        .route("/api/accounting/record", post(record))
        .route("/api/accounting/query", post(query))
        .route("/api/speech/synthesize", post(synthesize))
        .route("/api/speech/voices", get(voices))
        .route("/api/auth/token/generate", post(generate_token))
        .route("/api/auth/token/verify", get(verify_token))
        .route("/health", get(health))
        .route("/api/slow", get(slow))
        .route("/api/broken", get(broken))
        .route("/api/always-401", get(always_unauthorized))
        .with_state(Arc::clone(&backend));

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok((addr, backend))
}

pub fn memory_store() -> Arc<TokenStore> {
    Arc::new(TokenStore::new(Arc::new(MemoryStore::new())))
}

pub fn client(addr: SocketAddr, store: Arc<TokenStore>) -> anyhow::Result<Arc<ApiClient>> {
    client_with_timeout(addr, store, Duration::from_secs(5))
}

pub fn client_with_timeout(
    addr: SocketAddr,
    store: Arc<TokenStore>,
    timeout: Duration,
) -> anyhow::Result<Arc<ApiClient>> {
    voxledger::ensure_crypto();
    ApiClient::new(&format!("http://{addr}"), timeout, store)
}
