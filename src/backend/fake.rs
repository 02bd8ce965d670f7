//! Scripted in-process backend for panel tests.
//!
//! Records every call in issue order. Individual endpoints can be made to
//! fail or to respond after a delay (use a paused tokio clock to control
//! arrival order).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::Backend;
use crate::error::{ApiError, ApiResult};
use crate::protocol::{
    BandCatalog, BandDescriptor, BandId, BandStatistics, ConvertReceipt, DifferenceRequest,
    ManipulationResult, RatioRequest, RgbRequest,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ListBands,
    Convert(BandId),
    Ratio(RatioRequest),
    Difference(DifferenceRequest),
    Rgb(RgbRequest),
    FetchImage(String),
    Statistics(BandId),
}

impl Call {
    /// Key used to script failures and delays, e.g. `convert:IMG_VIS`.
    fn key(&self) -> String {
        match self {
            Call::ListBands => "bands".to_string(),
            Call::Convert(band) => format!("convert:{band}"),
            Call::Ratio(_) => "ratio".to_string(),
            Call::Difference(_) => "difference".to_string(),
            Call::Rgb(_) => "rgb".to_string(),
            Call::FetchImage(path) => format!("image:{path}"),
            Call::Statistics(band) => format!("statistics:{band}"),
        }
    }
}

#[derive(Default)]
pub struct FakeBackend {
    catalog: BandCatalog,
    statistics: HashMap<BandId, BandStatistics>,
    manipulation_path: Option<String>,
    failures: Mutex<HashMap<String, ApiError>>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<Call>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_band(mut self, id: &str, description: &str) -> Self {
        self.catalog.insert(
            id.into(),
            BandDescriptor {
                description: description.to_string(),
                wavelength: "10.3-11.3 µm".to_string(),
                dimensions: "1616×1737".to_string(),
            },
        );
        self
    }

    pub fn with_statistics(mut self, id: &str, mean: f64) -> Self {
        self.statistics.insert(
            id.into(),
            BandStatistics {
                minimum: mean - 10.0,
                maximum: mean + 10.0,
                mean,
                std: 2.5,
            },
        );
        self
    }

    /// Make ratio/difference succeed with this visualization path.
    pub fn with_manipulation(mut self, path: &str) -> Self {
        self.manipulation_path = Some(path.to_string());
        self
    }

    pub fn with_delay(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_string(), delay);
        self
    }

    pub fn failing(self, key: &str, err: ApiError) -> Self {
        self.fail(key, err);
        self
    }

    pub fn fail(&self, key: &str, err: ApiError) {
        self.failures.lock().unwrap().insert(key.to_string(), err);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    async fn record(&self, call: Call) -> ApiResult<()> {
        let key = call.key();
        self.calls.lock().unwrap().push(call);
        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        match self.failures.lock().unwrap().get(&key) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn manipulation(&self) -> ApiResult<ManipulationResult> {
        match &self.manipulation_path {
            Some(path) => Ok(ManipulationResult {
                visualization: path.clone(),
                message: None,
            }),
            None => Err(ApiError::Backend {
                status: 404,
                detail: Some("Result not found".to_string()),
            }),
        }
    }
}

/// Image bytes the fake serves for `path`: a PNG header followed by the path.
pub fn image_for(path: &str) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G'];
    bytes.extend_from_slice(path.as_bytes());
    bytes
}

impl Backend for FakeBackend {
    async fn list_bands(&self) -> ApiResult<BandCatalog> {
        self.record(Call::ListBands).await?;
        Ok(self.catalog.clone())
    }

    async fn convert_band(&self, band: &BandId) -> ApiResult<ConvertReceipt> {
        self.record(Call::Convert(band.clone())).await?;
        Ok(ConvertReceipt {
            file_path: Some(format!("output/converted_cogs/{band}_cog.tif")),
            message: None,
        })
    }

    async fn ratio(&self, request: &RatioRequest) -> ApiResult<ManipulationResult> {
        self.record(Call::Ratio(request.clone())).await?;
        self.manipulation()
    }

    async fn difference(&self, request: &DifferenceRequest) -> ApiResult<ManipulationResult> {
        self.record(Call::Difference(request.clone())).await?;
        self.manipulation()
    }

    async fn rgb_composite(&self, request: &RgbRequest) -> ApiResult<Vec<u8>> {
        self.record(Call::Rgb(request.clone())).await?;
        Ok(image_for(&format!(
            "rgb:{}:{}:{}",
            request.red, request.green, request.blue
        )))
    }

    async fn fetch_image(&self, path: &str) -> ApiResult<Vec<u8>> {
        self.record(Call::FetchImage(path.to_string())).await?;
        Ok(image_for(path))
    }

    async fn statistics(&self, band: &BandId) -> ApiResult<BandStatistics> {
        self.record(Call::Statistics(band.clone())).await?;
        self.statistics
            .get(band)
            .copied()
            .ok_or_else(|| ApiError::Backend {
                status: 404,
                detail: Some("Band data not found".to_string()),
            })
    }
}
