use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::detect::result::{Analysis, Finding, Point, Severity, Shape};
use crate::detect::source::{DetectionContext, DetectionSource, SourceCapability};

/// Delay before the canned findings are delivered.
pub const CANNED_LATENCY: Duration = Duration::from_millis(3_000);

/// Offline image analysis. Returns the same three findings for any image
/// after a fixed delay, so the upload flow can be exercised without a server.
pub struct CannedSource {
    latency: Duration,
}

impl CannedSource {
    pub fn new() -> Self {
        Self {
            latency: CANNED_LATENCY,
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for CannedSource {
    fn default() -> Self {
        Self::new()
    }
}

fn canned_finding(name: &str, severity: Severity, confidence: f32, shape: Shape) -> Finding {
    Finding {
        name: name.to_string(),
        details: format!("신뢰도: {:.0}%", confidence * 100.0),
        severity,
        confidence,
        shape: Some(shape),
    }
}

impl DetectionSource for CannedSource {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn supports(&self, capability: SourceCapability) -> bool {
        matches!(capability, SourceCapability::ImageAnalysis)
    }

    fn produce(&mut self, ctx: &DetectionContext<'_>) -> Result<Analysis> {
        let image = ctx
            .image
            .ok_or_else(|| anyhow!("canned analysis requires an uploaded image"))?;
        log::debug!(
            "CannedSource: returning fixed findings for {} ({} bytes)",
            image.file_name(),
            image.len()
        );

        Ok(Analysis::from_findings(vec![
            canned_finding(
                "균열 감지",
                Severity::Medium,
                0.88,
                Shape::polygon(vec![
                    Point::new(50.0, 60.0),
                    Point::new(150.0, 70.0),
                    Point::new(130.0, 180.0),
                    Point::new(40.0, 150.0),
                ]),
            ),
            canned_finding(
                "포트홀 의심",
                Severity::High,
                0.92,
                Shape::bbox(200.0, 220.0, 100.0, 80.0),
            ),
            canned_finding(
                "표지판",
                Severity::Low,
                0.95,
                Shape::bbox(300.0, 50.0, 70.0, 100.0),
            ),
        ]))
    }

    fn latency(&self) -> Duration {
        self.latency
    }
}
