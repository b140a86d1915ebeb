use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Hazard severity. Drives colour coding and whether audio/speech alerting fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    /// Badge text shown next to a detection.
    pub fn badge(self) -> &'static str {
        match self {
            Severity::High => "높음",
            Severity::Medium => "중간",
            Severity::Low => "낮음",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            other => Err(anyhow!("unknown severity '{}'", other)),
        }
    }
}

/// Risk grade reported by the prediction endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    A,
    B,
    C,
    /// `-` or anything the endpoint did not grade.
    Unrated,
}

impl RiskLevel {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "A" | "a" => RiskLevel::A,
            "B" | "b" => RiskLevel::B,
            "C" | "c" => RiskLevel::C,
            _ => RiskLevel::Unrated,
        }
    }

    /// A → high, B → medium, C → low. Ungraded findings are shown as low.
    pub fn severity(self) -> Severity {
        match self {
            RiskLevel::A => Severity::High,
            RiskLevel::B => Severity::Medium,
            RiskLevel::C | RiskLevel::Unrated => Severity::Low,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Geometry of a finding, in preview pixel coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shape {
    #[serde(rename = "bbox")]
    BBox {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    Polygon { points: Vec<Point> },
}

/// Minimum vertex count for a polygon to be drawable.
pub const MIN_POLYGON_POINTS: usize = 3;

impl Shape {
    pub fn bbox(x: f32, y: f32, width: f32, height: f32) -> Self {
        Shape::BBox {
            x,
            y,
            width,
            height,
        }
    }

    pub fn polygon(points: Vec<Point>) -> Self {
        Shape::Polygon { points }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::BBox { .. } => ShapeKind::BBox,
            Shape::Polygon { .. } => ShapeKind::Polygon,
        }
    }

    pub fn is_drawable(&self) -> bool {
        match self {
            Shape::BBox { width, height, .. } => *width >= 0.0 && *height >= 0.0,
            Shape::Polygon { points } => points.len() >= MIN_POLYGON_POINTS,
        }
    }

    /// Where the label sits: 25px above the box origin or the first vertex,
    /// never above the top edge.
    pub fn label_anchor(&self) -> Point {
        let origin = match self {
            Shape::BBox { x, y, .. } => Point::new(*x, *y),
            Shape::Polygon { points } => points.first().copied().unwrap_or(Point::new(0.0, 0.0)),
        };
        Point::new(origin.x, (origin.y - 25.0).max(0.0))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    #[serde(rename = "bbox")]
    BBox,
    Polygon,
}

impl ShapeKind {
    pub fn label(self) -> &'static str {
        match self {
            ShapeKind::BBox => "바운딩 박스",
            ShapeKind::Polygon => "폴리곤",
        }
    }
}

/// A single hazard reported by a detection source.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Finding {
    pub name: String,
    pub details: String,
    pub severity: Severity,
    /// 0..1
    pub confidence: f32,
    pub shape: Option<Shape>,
}

/// Everything a detection source produced for one request.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Analysis {
    pub findings: Vec<Finding>,
    /// Server-rendered image with the findings burned in, when the source provides one.
    pub annotated_image_url: Option<String>,
    pub day_or_night: Option<String>,
    pub overall_risk: Option<RiskLevel>,
}

impl Analysis {
    pub fn from_findings(findings: Vec<Finding>) -> Self {
        Self {
            findings,
            ..Self::default()
        }
    }

    pub fn has_high_severity(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::High)
    }
}
