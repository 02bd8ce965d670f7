//! Band-processing backend protocol types.
//!
//! Defines the JSON structures exchanged with the backend's `/api/*`
//! endpoints. Responses are wrapped in an [`Envelope`]; requests are plain
//! objects. Fields the client never reads are kept for protocol completeness.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

/// Opaque key naming one spectral band (e.g. `IMG_TIR1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BandId(String);

impl BandId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BandId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Static description of a band, fetched once from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandDescriptor {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub wavelength: String,
    #[serde(default)]
    pub dimensions: String,
}

/// The band catalog, keyed and ordered by band id.
pub type BandCatalog = BTreeMap<BandId, BandDescriptor>;

/// Top-level response wrapper used by every JSON endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct Envelope<T> {
    pub status: Option<String>,
    pub data: Option<T>,
    /// Failure explanation some endpoints send next to a non-success status.
    pub detail: Option<serde_json::Value>,
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    /// Accept the envelope only if it reports success (or reports nothing)
    /// and carries a payload.
    pub fn into_data(self, http_status: u16) -> ApiResult<T> {
        self.check_status(http_status)?;
        self.data
            .ok_or_else(|| ApiError::Payload("response has no `data` field".to_string()))
    }

    /// Like [`Envelope::into_data`] but the `status` field must be present
    /// and equal to `"success"`.
    pub fn into_success_data(self, http_status: u16) -> ApiResult<T> {
        if self.status.is_none() {
            return Err(ApiError::Payload("response has no `status` field".to_string()));
        }
        self.into_data(http_status)
    }

    /// Like [`Envelope::into_data`] but tolerates a missing payload.
    pub fn into_optional_data(self, http_status: u16) -> ApiResult<Option<T>> {
        self.check_status(http_status)?;
        Ok(self.data)
    }

    fn check_status(&self, http_status: u16) -> ApiResult<()> {
        match self.status.as_deref() {
            None | Some("success") => Ok(()),
            Some(other) => Err(ApiError::Backend {
                status: http_status,
                detail: Some(self.failure_text().unwrap_or_else(|| {
                    format!("backend reported status `{other}`")
                })),
            }),
        }
    }

    fn failure_text(&self) -> Option<String> {
        let detail = ErrorBody {
            detail: self.detail.clone(),
        };
        detail
            .detail_text()
            .or_else(|| self.message.clone())
            .filter(|text| !text.trim().is_empty())
    }
}

/// Success marker returned by `POST /api/convert/{band}`.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct ConvertReceipt {
    pub file_path: Option<String>,
    pub message: Option<String>,
}

/// Payload of a successful ratio or difference computation.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ManipulationResult {
    /// Backend-relative path of the rendered result image.
    pub visualization: String,
    pub message: Option<String>,
}

/// Summary statistics for one band.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct BandStatistics {
    pub minimum: f64,
    pub maximum: f64,
    pub mean: f64,
    pub std: f64,
}

/// Error body the backend sends with non-2xx responses.
#[derive(Debug, Deserialize, Clone)]
pub struct ErrorBody {
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    /// Flatten `detail` to a string; validation errors arrive as arrays.
    pub fn detail_text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RatioRequest {
    pub numerator: BandId,
    pub denominator: BandId,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DifferenceRequest {
    pub band1: BandId,
    pub band2: BandId,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RgbRequest {
    pub red: BandId,
    pub green: BandId,
    pub blue: BandId,
}

/// Path the backend serves a band's rendered image from.
pub fn band_visualization_path(band: &BandId) -> String {
    format!("/api/visualize/{}", urlencoding::encode(band.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_envelope_parses() {
        let json = r#"{
            "status": "success",
            "data": {
                "IMG_WV": {"description": "Water Vapor", "wavelength": "6.5-7.1 µm", "dimensions": "1616×1737"},
                "IMG_MIR": {"description": "Middle Infrared", "wavelength": "3.8-4.0 µm", "dimensions": "1616×1737"}
            }
        }"#;
        let env: Envelope<BandCatalog> = serde_json::from_str(json).unwrap();
        let catalog = env.into_data(200).unwrap();
        let ids: Vec<_> = catalog.keys().map(BandId::as_str).collect();
        assert_eq!(ids, ["IMG_MIR", "IMG_WV"]);
        assert_eq!(catalog[&BandId::from("IMG_WV")].description, "Water Vapor");
    }

    #[test]
    fn non_success_status_is_backend_failure() {
        let env: Envelope<ManipulationResult> =
            serde_json::from_str(r#"{"status": "error", "data": null}"#).unwrap();
        match env.into_data(200) {
            Err(ApiError::Backend { status, detail }) => {
                assert_eq!(status, 200);
                assert!(detail.unwrap().contains("error"));
            }
            other => panic!("expected backend failure, got {other:?}"),
        }
    }

    #[test]
    fn non_success_status_keeps_backend_explanation() {
        let env: Envelope<ManipulationResult> = serde_json::from_str(
            r#"{"status": "error", "detail": "Bands have different shapes"}"#,
        )
        .unwrap();
        let err = env.into_data(200).unwrap_err();
        assert_eq!(err.detail(), "Bands have different shapes");

        let env: Envelope<ManipulationResult> =
            serde_json::from_str(r#"{"status": "failed", "message": "shape mismatch"}"#).unwrap();
        assert_eq!(env.into_data(200).unwrap_err().detail(), "shape mismatch");
    }

    #[test]
    fn strict_envelope_requires_status() {
        let json = r#"{"data": {"visualization": "/x.png"}}"#;
        let env: Envelope<ManipulationResult> = serde_json::from_str(json).unwrap();
        assert!(matches!(env.into_success_data(200), Err(ApiError::Payload(_))));

        let env: Envelope<ManipulationResult> = serde_json::from_str(json).unwrap();
        assert_eq!(env.into_data(200).unwrap().visualization, "/x.png");
    }

    #[test]
    fn visualization_path_encodes_band_id() {
        assert_eq!(band_visualization_path(&"IMG_VIS".into()), "/api/visualize/IMG_VIS");
        assert_eq!(
            band_visualization_path(&"a/b?c#d".into()),
            "/api/visualize/a%2Fb%3Fc%23d"
        );
    }

    #[test]
    fn missing_data_is_payload_failure() {
        let env: Envelope<BandStatistics> =
            serde_json::from_str(r#"{"status": "success"}"#).unwrap();
        assert!(matches!(env.into_data(200), Err(ApiError::Payload(_))));
    }

    #[test]
    fn ratio_request_uses_wire_field_names() {
        let req = RatioRequest {
            numerator: "A".into(),
            denominator: "B".into(),
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            serde_json::json!({"numerator": "A", "denominator": "B"})
        );
    }

    #[test]
    fn error_body_detail_flattens_arrays() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"detail": [{"msg": "field required"}]}"#).unwrap();
        assert!(body.detail_text().unwrap().contains("field required"));

        let body: ErrorBody = serde_json::from_str(r#"{"detail": "File not found"}"#).unwrap();
        assert_eq!(body.detail_text().as_deref(), Some("File not found"));
    }
}
