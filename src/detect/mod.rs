pub mod backends;
pub mod prediction;
mod registry;
mod result;
mod source;

pub use registry::{shared, SharedSource, SourceRegistry};
pub use result::{
    Analysis, Finding, Point, RiskLevel, Severity, Shape, ShapeKind, MIN_POLYGON_POINTS,
};
pub use source::{
    DetectionContext, DetectionSource, PreviewSize, SourceCapability, DEFAULT_PREVIEW_EDGE,
};
