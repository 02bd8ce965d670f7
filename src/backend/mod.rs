//! Client side of the band-processing backend.
//!
//! Panels talk to the backend only through the [`Backend`] trait so they can
//! be driven by the HTTP client in production and by a scripted fake in
//! tests.

use std::future::Future;

use crate::error::ApiResult;
use crate::protocol::{
    BandCatalog, BandId, BandStatistics, ConvertReceipt, DifferenceRequest, ManipulationResult,
    RatioRequest, RgbRequest,
};

mod http;

#[cfg(test)]
pub(crate) mod fake;

pub use http::HttpBackend;

/// One method per backend endpoint the explorer uses.
pub trait Backend: Send + Sync + 'static {
    /// `GET /api/bands`
    fn list_bands(&self) -> impl Future<Output = ApiResult<BandCatalog>> + Send;

    /// `POST /api/convert/{band}`
    fn convert_band(&self, band: &BandId) -> impl Future<Output = ApiResult<ConvertReceipt>> + Send;

    /// `POST /api/manipulate/ratio`
    fn ratio(
        &self,
        request: &RatioRequest,
    ) -> impl Future<Output = ApiResult<ManipulationResult>> + Send;

    /// `POST /api/manipulate/difference`
    fn difference(
        &self,
        request: &DifferenceRequest,
    ) -> impl Future<Output = ApiResult<ManipulationResult>> + Send;

    /// `POST /api/visualize/rgb`, returns the composite image bytes.
    fn rgb_composite(&self, request: &RgbRequest) -> impl Future<Output = ApiResult<Vec<u8>>> + Send;

    /// `GET {path}` for a backend-relative image path.
    fn fetch_image(&self, path: &str) -> impl Future<Output = ApiResult<Vec<u8>>> + Send;

    /// `GET /api/statistics/{band}`
    fn statistics(&self, band: &BandId) -> impl Future<Output = ApiResult<BandStatistics>> + Send;
}
