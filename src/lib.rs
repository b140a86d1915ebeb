//! RoadVision
//!
//! Headless core of a road-hazard detection dashboard.
//!
//! # Architecture
//!
//! Findings flow one way:
//!
//! 1. **Sources** produce findings: a randomized live generator, a canned
//!    offline analysis, or an HTTP prediction endpoint.
//! 2. **Emission** counts each finding, lists it and draws it as a transient
//!    overlay that expires after a fixed dwell.
//! 3. **Alerting** plays a tone and speaks for high-severity findings.
//! 4. **Presentation** projects the dashboard into a serializable snapshot.
//!
//! Live and upload mode are mutually exclusive; entering one tears down the
//! other's transient state. All deferred work runs on one cooperative timer
//! queue driven by an explicit session clock.
//!
//! # Module Structure
//!
//! - `detect`: detection sources, finding types, registry
//! - `ingest`: camera devices and uploaded images
//! - `dashboard`: the state machine tying everything together
//! - `overlay`, `results`, `timer`, `alert`: dashboard building blocks
//! - `view`: snapshots and text rendering
//! - `config`: file + environment configuration

pub mod alert;
pub mod config;
pub mod dashboard;
pub mod detect;
pub mod ingest;
pub mod overlay;
pub mod results;
pub mod timer;
pub mod view;

pub use alert::{Alerter, AlertOutput, LogOutput, MemoryOutput, NullOutput, SpeechSettings};
pub use config::RoadVisionConfig;
pub use dashboard::{
    Dashboard, DashboardSettings, Preview, SimulationHandle, Tab, Theme, View,
};
pub use detect::backends::{CannedSource, SimulatedSource};
#[cfg(feature = "predict-api")]
pub use detect::backends::{PredictApiConfig, PredictApiSource};
pub use detect::{
    shared, Analysis, DetectionContext, DetectionSource, Finding, PreviewSize, Severity, Shape,
    SharedSource, SourceCapability, SourceRegistry,
};
pub use ingest::{CameraDevice, CameraError, CaptureConstraints, StubCamera, UploadedImage};
pub use overlay::{Overlay, OverlayId, OverlayStore, OVERLAY_DWELL};
pub use results::{Detection, DetectionStats, RecentDetections};
pub use view::DashboardSnapshot;
