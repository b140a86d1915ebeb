use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use crate::detect::result::Analysis;
use crate::ingest::UploadedImage;

/// Preview size used when the surface has not been measured yet.
pub const DEFAULT_PREVIEW_EDGE: u32 = 512;

/// What a detection source can be used for.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceCapability {
    /// Periodic findings over the live camera preview.
    LiveFeed,
    /// Findings for a single uploaded image.
    ImageAnalysis,
}

/// Measured pixel size of the live preview surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PreviewSize {
    pub width: u32,
    pub height: u32,
}

impl PreviewSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Unmeasured (zero) extents fall back to 512px.
    pub fn or_default(self) -> Self {
        Self {
            width: if self.width == 0 {
                DEFAULT_PREVIEW_EDGE
            } else {
                self.width
            },
            height: if self.height == 0 {
                DEFAULT_PREVIEW_EDGE
            } else {
                self.height
            },
        }
    }
}

impl Default for PreviewSize {
    fn default() -> Self {
        Self::new(DEFAULT_PREVIEW_EDGE, DEFAULT_PREVIEW_EDGE)
    }
}

/// Inputs available to a source for one request.
#[derive(Clone, Copy, Debug)]
pub struct DetectionContext<'a> {
    pub preview: PreviewSize,
    pub image: Option<&'a UploadedImage>,
}

impl<'a> DetectionContext<'a> {
    pub fn live(preview: PreviewSize) -> Self {
        Self {
            preview,
            image: None,
        }
    }

    pub fn upload(preview: PreviewSize, image: &'a UploadedImage) -> Self {
        Self {
            preview,
            image: Some(image),
        }
    }
}

/// A pluggable producer of findings.
///
/// The dashboard only talks to this trait, so the randomized generator, the
/// canned offline analysis and the HTTP prediction client are interchangeable,
/// and a real inference backend can be dropped in without touching overlay or
/// alerting logic.
pub trait DetectionSource: Send {
    /// Source identifier, used as the registry key.
    fn name(&self) -> &'static str;

    /// Returns true when the source supports a capability.
    fn supports(&self, capability: SourceCapability) -> bool;

    /// Produce findings for the given context.
    fn produce(&mut self, ctx: &DetectionContext<'_>) -> Result<Analysis>;

    /// How long the caller should wait before delivering the result of `produce`.
    fn latency(&self) -> Duration {
        Duration::ZERO
    }

    /// Delay until the next live request. Only meaningful for `LiveFeed` sources.
    fn next_interval(&mut self) -> Option<Duration> {
        None
    }
}
