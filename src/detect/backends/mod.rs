pub mod canned;
pub mod simulated;

#[cfg(feature = "predict-api")]
pub mod predict_api;

pub use canned::CannedSource;
pub use simulated::SimulatedSource;

#[cfg(feature = "predict-api")]
pub use predict_api::{PredictApiConfig, PredictApiSource};
