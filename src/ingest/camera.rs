//! Camera capture.
//!
//! This module provides the `CameraDevice` abstraction the live view opens a
//! stream from, and `StubCamera`, a synthetic device addressed by `stub://`
//! URLs.
//!
//! The live view is responsible for:
//! - Owning the returned `MediaStream` exclusively
//! - Calling `MediaStream::stop` on every exit path (stop, view switch, upload, drop)
//!
//! Stub URLs:
//! - `stub://<name>`: always grants access
//! - `stub://denied`: fails with `CameraError::PermissionDenied`
//! - `stub://unsupported`: fails with `CameraError::Unsupported`

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Rear-facing.
    #[default]
    Environment,
    User,
}

/// Requested capture settings. Devices treat width/height as ideals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub facing: FacingMode,
}

impl CaptureConstraints {
    /// 1280×720, used by the standalone dashboard.
    pub fn hd() -> Self {
        Self {
            ideal_width: 1280,
            ideal_height: 720,
            facing: FacingMode::Environment,
        }
    }
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            ideal_width: 512,
            ideal_height: 512,
            facing: FacingMode::Environment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    PermissionDenied,
    Unsupported,
    Device(String),
}

impl CameraError {
    /// Blocking notice shown to the user.
    pub fn notice(&self) -> &'static str {
        match self {
            CameraError::Unsupported => "이 브라우저에서는 카메라 기능을 지원하지 않습니다.",
            CameraError::PermissionDenied | CameraError::Device(_) => {
                "카메라에 접근할 수 없습니다. 권한을 확인해주세요."
            }
        }
    }
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::PermissionDenied => f.write_str("camera permission denied"),
            CameraError::Unsupported => f.write_str("camera capture not supported"),
            CameraError::Device(msg) => write!(f, "camera device error: {}", msg),
        }
    }
}

impl std::error::Error for CameraError {}

/// An open capture stream.
pub trait MediaStream: Send {
    fn label(&self) -> &str;

    /// Negotiated resolution.
    fn resolution(&self) -> (u32, u32);

    fn is_live(&self) -> bool;

    /// Stop all tracks. Idempotent.
    fn stop(&mut self);
}

pub trait CameraDevice {
    fn open(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> std::result::Result<Box<dyn MediaStream>, CameraError>;
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://)
// ----------------------------------------------------------------------------

/// Synthetic camera. Grants the requested resolution and tracks how many of
/// its streams still have live tracks.
pub struct StubCamera {
    url: String,
    live_streams: Arc<AtomicUsize>,
    opened: u64,
}

impl StubCamera {
    pub fn new(url: &str) -> Result<Self> {
        if !url.starts_with("stub://") {
            return Err(anyhow!(
                "camera url '{}' not supported; only stub:// devices are available",
                url
            ));
        }
        Ok(Self {
            url: url.to_string(),
            live_streams: Arc::new(AtomicUsize::new(0)),
            opened: 0,
        })
    }

    /// Streams opened and not yet stopped.
    pub fn live_streams(&self) -> usize {
        self.live_streams.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> u64 {
        self.opened
    }
}

impl CameraDevice for StubCamera {
    fn open(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> std::result::Result<Box<dyn MediaStream>, CameraError> {
        match self.url.trim_start_matches("stub://") {
            "denied" => return Err(CameraError::PermissionDenied),
            "unsupported" => return Err(CameraError::Unsupported),
            _ => {}
        }
        self.opened += 1;
        self.live_streams.fetch_add(1, Ordering::SeqCst);
        log::info!(
            "StubCamera: opened {} at {}x{} ({:?})",
            self.url,
            constraints.ideal_width,
            constraints.ideal_height,
            constraints.facing
        );
        Ok(Box::new(StubStream {
            label: format!("{}#{}", self.url, self.opened),
            resolution: (constraints.ideal_width, constraints.ideal_height),
            live: true,
            live_streams: self.live_streams.clone(),
        }))
    }
}

struct StubStream {
    label: String,
    resolution: (u32, u32),
    live: bool,
    live_streams: Arc<AtomicUsize>,
}

impl MediaStream for StubStream {
    fn label(&self) -> &str {
        &self.label
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            self.live_streams.fetch_sub(1, Ordering::SeqCst);
            log::debug!("StubCamera: stopped tracks of {}", self.label);
        }
    }
}

impl Drop for StubStream {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_camera_grants_requested_resolution() -> Result<()> {
        let mut camera = StubCamera::new("stub://front")?;
        let mut stream = camera
            .open(&CaptureConstraints::hd())
            .map_err(anyhow::Error::new)?;
        assert_eq!(stream.resolution(), (1280, 720));
        assert_eq!(camera.live_streams(), 1);

        stream.stop();
        stream.stop();
        assert!(!stream.is_live());
        assert_eq!(camera.live_streams(), 0);
        Ok(())
    }

    #[test]
    fn denied_and_unsupported_devices_fail() -> Result<()> {
        let mut denied = StubCamera::new("stub://denied")?;
        let err = denied.open(&CaptureConstraints::default()).err().unwrap();
        assert_eq!(err, CameraError::PermissionDenied);
        assert!(err.notice().contains("권한"));

        let mut unsupported = StubCamera::new("stub://unsupported")?;
        let err = unsupported
            .open(&CaptureConstraints::default())
            .err()
            .unwrap();
        assert_eq!(err, CameraError::Unsupported);
        assert_eq!(denied.live_streams() + unsupported.live_streams(), 0);
        Ok(())
    }

    #[test]
    fn non_stub_urls_are_rejected() {
        assert!(StubCamera::new("rtsp://camera-1").is_err());
    }

    #[test]
    fn dropping_a_stream_releases_it() -> Result<()> {
        let mut camera = StubCamera::new("stub://front")?;
        let stream = camera
            .open(&CaptureConstraints::default())
            .map_err(anyhow::Error::new)?;
        drop(stream);
        assert_eq!(camera.live_streams(), 0);
        Ok(())
    }
}
