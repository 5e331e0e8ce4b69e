// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tracing::debug;

use crate::api::types::HealthResponse;
use crate::api::{ApiClient, ApiRequest};
use crate::error::ApiError;

impl ApiClient {
    /// Backend liveness. Deployments serve it under `/api/health` or at the
    /// bare `/health` route; the second is tried when the first is missing.
    pub async fn health(&self) -> Result<HealthResponse, ApiError> {
        match self.execute_json(ApiRequest::get("/api/health")).await {
            Err(ApiError::Status { status: 404, .. }) => {
                debug!("no /api/health route, trying /health");
                self.execute_json(ApiRequest::get("/health")).await
            }
            other => other,
        }
    }
}
