//! cog-explorer: browse, combine and inspect satellite imagery bands served
//! by a Cloud-Optimized GeoTIFF processing backend.

pub mod backend;
pub mod config;
pub mod error;
pub mod explorer;
pub mod image;
pub mod logging;
pub mod notifications;
pub mod panels;
pub mod protocol;
pub mod session;
pub mod shell;
pub mod state_machine;

pub use backend::{Backend, HttpBackend};
pub use config::Settings;
pub use error::{ApiError, ApiResult};
pub use explorer::Explorer;
pub use shell::{Flow, OutputKind, Shell};
