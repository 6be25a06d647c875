use anyhow::Result;

use super::result::PredictionGrid;
use crate::frame::Frame;

/// Object-detection network seam.
///
/// Implementations are loaded once and shared read-only between callers, so
/// inference takes `&self` and the trait requires `Send + Sync`. A backend
/// returns the raw per-cell predictions for every output layer; filtering
/// and suppression happen downstream.
pub trait DetectorBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run the network on a frame.
    ///
    /// Coordinates in the returned rows are fractions of the frame size.
    fn infer(&self, frame: &Frame) -> Result<Vec<PredictionGrid>>;

    /// Optional warm-up hook.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}
