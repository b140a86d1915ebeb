//! Input surfaces.
//!
//! - `camera`: live capture devices (`stub://` synthetic device)
//! - `upload`: user-selected image files
//!
//! Neither surface persists anything: streams and uploaded bytes live only as
//! long as the dashboard holds them.

pub mod camera;
pub mod upload;

pub use camera::{
    CameraDevice, CameraError, CaptureConstraints, FacingMode, MediaStream, StubCamera,
};
pub use upload::UploadedImage;
