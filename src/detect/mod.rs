mod backend;
pub mod backends;
pub mod filter;
pub mod nms;
mod result;

use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::config::DetectorSettings;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use filter::CandidateFilter;
pub use nms::NonMaxSuppressor;
pub use result::{BoundingBox, Candidate, PredictionGrid};

/// Construct the backend named in the detector settings.
pub fn load_backend(settings: &DetectorSettings) -> Result<Arc<dyn DetectorBackend>> {
    match settings.backend.as_str() {
        "stub" => Ok(Arc::new(StubBackend::hallway_scene()?)),
        #[cfg(feature = "backend-tract")]
        "tract" => Ok(Arc::new(TractBackend::new(
            &settings.model_path,
            settings.input_size,
        )?)),
        #[cfg(not(feature = "backend-tract"))]
        "tract" => Err(anyhow!(
            "detector backend 'tract' requires the backend-tract feature"
        )),
        other => Err(anyhow!("unknown detector backend '{}'", other)),
    }
}
