// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::api::types::{
    AccountingResponse, QueryRequest, QueryResponse, RecordRequest, StatsResponse, StatsSummary,
};
use crate::api::{ApiClient, ApiRequest};
use crate::error::ApiError;

impl ApiClient {
    /// Submit a free-form expense description for parsing and storage.
    pub async fn create_entry(&self, text: &str) -> Result<AccountingResponse, ApiError> {
        let req = ApiRequest::post("/api/accounting/record").json(&RecordRequest { text })?;
        self.execute_json(req).await
    }

    /// Stats for `month` (`YYYY-MM`), or the current month when `None`.
    pub async fn monthly_stats(&self, month: Option<&str>) -> Result<StatsSummary, ApiError> {
        let mut req = ApiRequest::get("/api/accounting/stats");
        if let Some(month) = month {
            req = req.query("month", month);
        }
        let resp: StatsResponse = self.execute_json(req).await?;
        Ok(StatsSummary::from_stats(resp.data))
    }

    /// Ask a natural-language question about the ledger.
    pub async fn query(&self, question: &str) -> Result<QueryResponse, ApiError> {
        let req = ApiRequest::post("/api/accounting/query").json(&QueryRequest { query: question })?;
        self.execute_json(req).await
    }
}
