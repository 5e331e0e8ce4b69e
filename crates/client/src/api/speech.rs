// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::api::types::{SynthesizeRequest, VoiceInfo, VoicesResponse};
use crate::api::{ApiClient, ApiRequest};
use crate::error::ApiError;
use crate::speech::{Synthesizer, Voice};

impl ApiClient {
    /// Synthesize `text` and return the encoded audio (MP3).
    pub async fn synthesize(&self, text: &str, voice: Voice, speed: f32) -> Result<Bytes, ApiError> {
        let req = ApiRequest::post("/api/speech/synthesize").json(&SynthesizeRequest {
            text,
            voice,
            speed,
        })?;
        let resp = self.execute(req).await?;
        Ok(resp.bytes().await?)
    }

    pub async fn voices(&self) -> Result<Vec<VoiceInfo>, ApiError> {
        let resp: VoicesResponse = self.execute_json(ApiRequest::get("/api/speech/voices")).await?;
        Ok(resp.voices)
    }
}

impl Synthesizer for ApiClient {
    fn synthesize<'a>(
        &'a self,
        text: &'a str,
        voice: Voice,
        speed: f32,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Bytes>> + Send + 'a>> {
        Box::pin(async move { Ok(ApiClient::synthesize(self, text, voice, speed).await?) })
    }
}
