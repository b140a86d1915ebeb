//! Randomized live hazard generator.
//!
//! Stands in for a real inference pipeline on the live preview. Each request
//! picks one hazard from a small catalog and fabricates geometry inside the
//! measured preview. The geometry is cosmetic, not a real detection.

use std::f32::consts::PI;
use std::time::Duration;

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::detect::result::{Analysis, Finding, Point, Severity, Shape};
use crate::detect::source::{DetectionContext, DetectionSource, SourceCapability};

pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(2_000);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(6_000);

/// Smallest generated box/polygon extent, in pixels.
const MIN_EXTENT_PX: f32 = 50.0;
/// Per-vertex jitter applied to polygon points, in pixels.
const VERTEX_JITTER_PX: f32 = 10.0;

/// One catalog entry.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Hazard {
    pub name: String,
    pub severity: Severity,
    /// Percent, 0..=100.
    pub confidence: u8,
}

impl Hazard {
    pub fn new(name: &str, severity: Severity, confidence: u8) -> Self {
        Self {
            name: name.to_string(),
            severity,
            confidence,
        }
    }
}

/// Built-in hazard catalogs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Catalog {
    #[default]
    Standard,
    Extended,
}

impl Catalog {
    pub fn hazards(self) -> Vec<Hazard> {
        let mut hazards = vec![
            Hazard::new("낙하물", Severity::High, 95),
            Hazard::new("포트홀", Severity::Medium, 87),
            Hazard::new("차선 이탈", Severity::Medium, 92),
        ];
        if self == Catalog::Extended {
            hazards.extend([
                Hazard::new("급정거 차량", Severity::High, 89),
                Hazard::new("공사 구간", Severity::Low, 78),
                Hazard::new("시야 방해 요소", Severity::Medium, 83),
            ]);
        }
        hazards
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Catalog::Standard),
            "extended" => Ok(Catalog::Extended),
            other => Err(anyhow!(
                "unknown hazard catalog '{}'; expected standard or extended",
                other
            )),
        }
    }
}

/// Which overlay shapes the generator emits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeMode {
    /// Boxes and polygons, 50/50.
    #[default]
    Mixed,
    /// Boxes only.
    Boxes,
}

impl ShapeMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mixed" => Ok(ShapeMode::Mixed),
            "boxes" => Ok(ShapeMode::Boxes),
            other => Err(anyhow!(
                "unknown simulation shape mode '{}'; expected mixed or boxes",
                other
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SimulationSettings {
    pub hazards: Vec<Hazard>,
    pub shapes: ShapeMode,
    /// Inclusive lower bound of the reschedule delay.
    pub min_delay: Duration,
    /// Exclusive upper bound of the reschedule delay.
    pub max_delay: Duration,
    pub seed: Option<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            hazards: Catalog::Standard.hazards(),
            shapes: ShapeMode::Mixed,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            seed: None,
        }
    }
}

pub struct SimulatedSource {
    settings: SimulationSettings,
    rng: StdRng,
    produced: u64,
}

impl SimulatedSource {
    pub fn new(settings: SimulationSettings) -> Result<Self> {
        if settings.hazards.is_empty() {
            return Err(anyhow!("simulation hazard catalog is empty"));
        }
        if settings.max_delay <= settings.min_delay {
            return Err(anyhow!(
                "simulation max delay ({:?}) must exceed min delay ({:?})",
                settings.max_delay,
                settings.min_delay
            ));
        }
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            settings,
            rng,
            produced: 0,
        })
    }

    /// Default settings with a fixed seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            settings: SimulationSettings {
                seed: Some(seed),
                ..SimulationSettings::default()
            },
            rng: StdRng::seed_from_u64(seed),
            produced: 0,
        }
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }

    fn random_box(&mut self, width: f32, height: f32) -> Shape {
        let x = self.rng.gen::<f32>() * (width * 0.7) + width * 0.05;
        let y = self.rng.gen::<f32>() * (height * 0.7) + height * 0.05;
        let w = self.rng.gen::<f32>() * (width * 0.2) + MIN_EXTENT_PX;
        let h = self.rng.gen::<f32>() * (height * 0.2) + MIN_EXTENT_PX;
        Shape::bbox(x, y, w.min(width - x), h.min(height - y))
    }

    fn random_polygon(&mut self, width: f32, height: f32) -> Shape {
        let left = self.rng.gen::<f32>() * (width * 0.5) + width * 0.1;
        let top = self.rng.gen::<f32>() * (height * 0.5) + height * 0.1;
        let span_x = self.rng.gen::<f32>() * (width * 0.3) + MIN_EXTENT_PX;
        let span_y = self.rng.gen::<f32>() * (height * 0.3) + MIN_EXTENT_PX;
        let (cx, cy) = (left + span_x / 2.0, top + span_y / 2.0);

        let vertices = self.rng.gen_range(3..=7);
        let points = (0..vertices)
            .map(|i| {
                let angle = (i as f32 / vertices as f32) * 2.0 * PI;
                let radius = self.rng.gen::<f32>() * 0.4 + 0.8;
                let jitter_x = self.rng.gen::<f32>() * 2.0 * VERTEX_JITTER_PX - VERTEX_JITTER_PX;
                let jitter_y = self.rng.gen::<f32>() * 2.0 * VERTEX_JITTER_PX - VERTEX_JITTER_PX;
                let x = cx + span_x / 2.0 * radius * angle.cos() + jitter_x;
                let y = cy + span_y / 2.0 * radius * angle.sin() + jitter_y;
                Point::new(x.clamp(0.0, width), y.clamp(0.0, height))
            })
            .collect();
        Shape::polygon(points)
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self {
            settings: SimulationSettings::default(),
            rng: StdRng::from_entropy(),
            produced: 0,
        }
    }
}

impl DetectionSource for SimulatedSource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn supports(&self, capability: SourceCapability) -> bool {
        matches!(capability, SourceCapability::LiveFeed)
    }

    fn produce(&mut self, ctx: &DetectionContext<'_>) -> Result<Analysis> {
        let preview = ctx.preview.or_default();
        let (width, height) = (preview.width as f32, preview.height as f32);

        let index = self.rng.gen_range(0..self.settings.hazards.len());
        let hazard = self.settings.hazards[index].clone();

        let polygon = match self.settings.shapes {
            ShapeMode::Mixed => self.rng.gen_bool(0.5),
            ShapeMode::Boxes => false,
        };
        let shape = if polygon {
            self.random_polygon(width, height)
        } else {
            self.random_box(width, height)
        };

        self.produced += 1;
        Ok(Analysis::from_findings(vec![Finding {
            details: format!("신뢰도: {}%", hazard.confidence),
            name: hazard.name,
            severity: hazard.severity,
            confidence: f32::from(hazard.confidence) / 100.0,
            shape: Some(shape),
        }]))
    }

    fn next_interval(&mut self) -> Option<Duration> {
        let min = self.settings.min_delay.as_millis() as u64;
        let max = self.settings.max_delay.as_millis() as u64;
        Some(Duration::from_millis(self.rng.gen_range(min..max)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preview() -> DetectionContext<'static> {
        DetectionContext::live(crate::detect::PreviewSize::new(640, 480))
    }

    #[test]
    fn produces_one_finding_inside_preview() -> Result<()> {
        let mut source = SimulatedSource::with_seed(42);
        for _ in 0..200 {
            let analysis = source.produce(&preview())?;
            assert_eq!(analysis.findings.len(), 1);
            let finding = &analysis.findings[0];
            assert!(finding.details.starts_with("신뢰도: "));
            match finding.shape.as_ref().expect("geometry") {
                Shape::BBox {
                    x,
                    y,
                    width,
                    height,
                } => {
                    assert!(*x >= 0.0 && *y >= 0.0);
                    assert!(x + width <= 640.0 + f32::EPSILON);
                    assert!(y + height <= 480.0 + f32::EPSILON);
                }
                Shape::Polygon { points } => {
                    assert!((3..=7).contains(&points.len()));
                    for p in points {
                        assert!((0.0..=640.0).contains(&p.x));
                        assert!((0.0..=480.0).contains(&p.y));
                    }
                }
            }
        }
        assert_eq!(source.produced(), 200);
        Ok(())
    }

    #[test]
    fn box_mode_never_emits_polygons() -> Result<()> {
        let mut source = SimulatedSource::new(SimulationSettings {
            shapes: ShapeMode::Boxes,
            seed: Some(3),
            ..SimulationSettings::default()
        })?;
        for _ in 0..50 {
            let analysis = source.produce(&preview())?;
            assert!(matches!(
                analysis.findings[0].shape,
                Some(Shape::BBox { .. })
            ));
        }
        Ok(())
    }

    #[test]
    fn intervals_stay_within_bounds() {
        let mut source = SimulatedSource::with_seed(9);
        for _ in 0..500 {
            let delay = source.next_interval().unwrap();
            assert!(delay >= DEFAULT_MIN_DELAY);
            assert!(delay < DEFAULT_MAX_DELAY);
        }
    }

    #[test]
    fn default_source_uses_standard_settings() -> Result<()> {
        let mut source = SimulatedSource::default();
        assert_eq!(source.produce(&preview())?.findings.len(), 1);
        let delay = source.next_interval().expect("interval");
        assert!(delay >= DEFAULT_MIN_DELAY && delay < DEFAULT_MAX_DELAY);
        assert_eq!(source.produced(), 1);
        Ok(())
    }

    #[test]
    fn same_seed_replays_same_stream() -> Result<()> {
        let mut a = SimulatedSource::with_seed(11);
        let mut b = SimulatedSource::with_seed(11);
        for _ in 0..10 {
            assert_eq!(a.produce(&preview())?, b.produce(&preview())?);
        }
        Ok(())
    }

    #[test]
    fn rejects_inverted_delay_bounds() {
        let result = SimulatedSource::new(SimulationSettings {
            min_delay: Duration::from_millis(5_000),
            max_delay: Duration::from_millis(1_000),
            ..SimulationSettings::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn extended_catalog_adds_three_hazards() {
        assert_eq!(Catalog::Standard.hazards().len(), 3);
        let extended = Catalog::Extended.hazards();
        assert_eq!(extended.len(), 6);
        assert!(extended.iter().any(|h| h.severity == Severity::Low));
    }
}
