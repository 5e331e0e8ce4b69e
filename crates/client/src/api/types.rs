// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types for the ledger backend.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{AuthType, TokenSet, UserInfo};
use crate::speech::Voice;

#[derive(Debug, Clone, Serialize)]
pub struct ExchangeRequest<'a> {
    pub code: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Response to both `/auth/exchange` and `/auth/refresh`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSessionResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub auth_type: Option<AuthType>,
}

impl AuthSessionResponse {
    pub fn into_token_set(self) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.access_token_expires_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeResponse {
    pub user: UserInfo,
    pub auth_type: AuthType,
}

#[derive(Debug, Clone, Serialize)]
pub struct SynthesizeRequest<'a> {
    pub text: &'a str,
    pub voice: Voice,
    pub speed: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoicesResponse {
    #[serde(default)]
    pub voices: Vec<VoiceInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordRequest<'a> {
    pub text: &'a str,
}

/// One ledger row as parsed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountingRecord {
    #[serde(rename = "時間")]
    pub time: String,
    #[serde(rename = "名稱")]
    pub name: String,
    #[serde(rename = "類別")]
    pub category: String,
    #[serde(rename = "花費")]
    pub amount: f64,
    #[serde(rename = "幣別", default = "default_currency")]
    pub currency: String,
    #[serde(rename = "支付方式", default)]
    pub payment_method: Option<String>,
}

fn default_currency() -> String {
    "TWD".to_owned()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountingResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub record: AccountingRecord,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyStats {
    pub month: String,
    pub total: f64,
    #[serde(default)]
    pub record_count: u64,
    #[serde(default)]
    pub by_category: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsResponse {
    #[serde(default)]
    pub success: bool,
    pub data: MonthlyStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryShare {
    pub category: String,
    pub total: f64,
    /// Share of the month's total, 0 to 100.
    pub percentage: f64,
}

/// Monthly stats with per-category shares and a daily average.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSummary {
    pub month: String,
    pub total: f64,
    pub record_count: u64,
    pub categories: Vec<CategoryShare>,
    pub daily_average: f64,
}

/// Days the daily average is spread over, regardless of the calendar month.
pub const DAYS_PER_MONTH: f64 = 30.0;

impl StatsSummary {
    pub fn from_stats(stats: MonthlyStats) -> Self {
        let total = stats.total;
        let mut categories: Vec<CategoryShare> = stats
            .by_category
            .into_iter()
            .map(|(category, amount)| CategoryShare {
                category,
                total: amount,
                percentage: if total > 0.0 { amount / total * 100.0 } else { 0.0 },
            })
            .collect();
        categories.sort_by(|a, b| b.total.total_cmp(&a.total));
        Self {
            month: stats.month,
            total,
            record_count: stats.record_count,
            categories,
            daily_average: total / DAYS_PER_MONTH,
        }
    }
}

/// Format a `YYYY-MM` month parameter.
pub fn month_param(year: i32, month: u32) -> String {
    format!("{year}-{month:02}")
}

/// Parse and normalize a `YYYY-MM` month.
pub fn parse_month(raw: &str) -> anyhow::Result<String> {
    let (year, month) =
        raw.split_once('-').ok_or_else(|| anyhow::anyhow!("month must be YYYY-MM: {raw}"))?;
    let year: i32 = year.parse().map_err(|_| anyhow::anyhow!("invalid year in {raw}"))?;
    let month: u32 = month.parse().map_err(|_| anyhow::anyhow!("invalid month in {raw}"))?;
    if !(1..=12).contains(&month) {
        anyhow::bail!("month out of range: {raw}");
    }
    Ok(month_param(year, month))
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest<'a> {
    pub query: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub success: bool,
    pub response: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateTokenRequest<'a> {
    pub description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_days: Option<u32>,
}

/// A newly minted API token. The raw token is shown once and never again.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiTokenInfo {
    pub token: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// Accepts the token either flat on the response or nested under `token`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "GenerateTokenWire")]
pub struct GenerateTokenResponse {
    pub success: bool,
    pub token: ApiTokenInfo,
    pub message: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TokenField {
    Nested(ApiTokenInfo),
    Raw(String),
}

#[derive(Deserialize)]
struct GenerateTokenWire {
    #[serde(default)]
    success: bool,
    token: TokenField,
    #[serde(default)]
    description: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    message: String,
}

impl From<GenerateTokenWire> for GenerateTokenResponse {
    fn from(wire: GenerateTokenWire) -> Self {
        let token = match wire.token {
            TokenField::Nested(info) => info,
            TokenField::Raw(token) => ApiTokenInfo {
                token,
                description: wire.description,
                created_at: wire.created_at,
                expires_at: wire.expires_at,
            },
        };
        Self { success: wire.success, token, message: wire.message }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VerifyTokenResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub valid: Option<bool>,
    #[serde(default)]
    pub message: String,
}

impl VerifyTokenResponse {
    pub fn is_valid(&self) -> bool {
        self.success && self.valid.unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub service: String,
}

impl HealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
