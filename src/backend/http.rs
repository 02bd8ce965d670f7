//! `reqwest`-based [`Backend`] implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::Backend;
use crate::error::{ApiError, ApiResult};
use crate::protocol::{
    BandCatalog, BandId, BandStatistics, ConvertReceipt, DifferenceRequest, Envelope, ErrorBody,
    ManipulationResult, RatioRequest, RgbRequest,
};

/// HTTP client for the backend at a fixed base URL.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base =
            Url::parse(base_url).with_context(|| format!("Invalid backend URL: {base_url}"))?;
        // Keep any path prefix when joining relative endpoint paths.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Resolve a backend path (absolute or relative) against the base URL.
    pub fn resolve(&self, path: &str) -> ApiResult<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::Payload(format!("invalid path `{path}`: {e}")))
    }

    /// Endpoint URL from raw path segments, each percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::Payload(format!("base URL `{}` cannot carry a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, path: &str) -> ApiResult<Response> {
        self.get_url(self.resolve(path)?).await
    }

    async fn get_url(&self, url: Url) -> ApiResult<Response> {
        debug!(target: "backend", method = "GET", %url, "request");
        let response = self.client.get(url).send().await?;
        check_status(response).await
    }

    async fn post<B: serde::Serialize + ?Sized>(
        &self,
        url: Url,
        body: Option<&B>,
    ) -> ApiResult<Response> {
        debug!(target: "backend", method = "POST", %url, "request");
        let mut request = self.client.post(url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        check_status(response).await
    }
}

/// Turn a non-2xx response into [`ApiError::Backend`], keeping the
/// backend's `detail` message when the body carries one.
async fn check_status(response: Response) -> ApiResult<Response> {
    let status = response.status();
    debug!(target: "backend", status = status.as_u16(), url = %response.url(), "response");
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().await.unwrap_or_default();
    let detail = serde_json::from_slice::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.detail_text())
        .or_else(|| {
            let text = String::from_utf8_lossy(&body).trim().to_string();
            (!text.is_empty()).then_some(text)
        });
    Err(ApiError::Backend {
        status: status.as_u16(),
        detail,
    })
}

async fn envelope<T: DeserializeOwned>(response: Response) -> ApiResult<(StatusCode, Envelope<T>)> {
    let status = response.status();
    let bytes = response.bytes().await?;
    let envelope = serde_json::from_slice(&bytes)?;
    Ok((status, envelope))
}

async fn data<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let (status, envelope) = envelope::<T>(response).await?;
    envelope.into_data(status.as_u16())
}

async fn success_data<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let (status, envelope) = envelope::<T>(response).await?;
    envelope.into_success_data(status.as_u16())
}

async fn image_bytes(response: Response) -> ApiResult<Vec<u8>> {
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Err(ApiError::Payload("empty image body".to_string()));
    }
    Ok(bytes.to_vec())
}

impl Backend for HttpBackend {
    async fn list_bands(&self) -> ApiResult<BandCatalog> {
        data(self.get("/api/bands").await?).await
    }

    async fn convert_band(&self, band: &BandId) -> ApiResult<ConvertReceipt> {
        let url = self.endpoint(&["api", "convert", band.as_str()])?;
        let response = self.post::<()>(url, None).await?;
        let (status, envelope) = envelope::<ConvertReceipt>(response).await?;
        Ok(envelope
            .into_optional_data(status.as_u16())?
            .unwrap_or_default())
    }

    async fn ratio(&self, request: &RatioRequest) -> ApiResult<ManipulationResult> {
        let url = self.endpoint(&["api", "manipulate", "ratio"])?;
        success_data(self.post(url, Some(request)).await?).await
    }

    async fn difference(&self, request: &DifferenceRequest) -> ApiResult<ManipulationResult> {
        let url = self.endpoint(&["api", "manipulate", "difference"])?;
        success_data(self.post(url, Some(request)).await?).await
    }

    async fn rgb_composite(&self, request: &RgbRequest) -> ApiResult<Vec<u8>> {
        let url = self.endpoint(&["api", "visualize", "rgb"])?;
        image_bytes(self.post(url, Some(request)).await?).await
    }

    async fn fetch_image(&self, path: &str) -> ApiResult<Vec<u8>> {
        image_bytes(self.get(path).await?).await
    }

    async fn statistics(&self, band: &BandId) -> ApiResult<BandStatistics> {
        let url = self.endpoint(&["api", "statistics", band.as_str()])?;
        data(self.get_url(url).await?).await
    }
}
