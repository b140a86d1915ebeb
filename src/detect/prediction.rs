//! Response schema of the external `/predict` endpoint and its mapping onto findings.
//!
//! Every field is optional on the wire and `null` counts as absent. A missing or empty `predictions`
//! array is a successful analysis with zero findings.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};

use crate::detect::result::{Analysis, Finding, RiskLevel, Shape};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PredictResponse {
    pub predictions: Option<Vec<Prediction>>,
    pub day_or_night: Option<String>,
    pub overall_risk: Option<String>,
    pub original_image_url: Option<String>,
    pub result_image_url: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Prediction {
    #[serde(deserialize_with = "null_as_default")]
    pub class_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    /// 0..1
    #[serde(deserialize_with = "null_as_default")]
    pub confidence: f32,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(deserialize_with = "null_as_default")]
    pub x: f32,
    #[serde(deserialize_with = "null_as_default")]
    pub y: f32,
    #[serde(deserialize_with = "null_as_default")]
    pub width: f32,
    #[serde(deserialize_with = "null_as_default")]
    pub height: f32,
    #[serde(deserialize_with = "null_as_default")]
    pub width_cm: f32,
    #[serde(deserialize_with = "null_as_default")]
    pub length_cm: f32,
    #[serde(deserialize_with = "null_as_default")]
    pub area_m2: f32,
    #[serde(deserialize_with = "null_as_default")]
    pub risk_level: String,
}

/// Explicit `null` reads the same as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Prediction {
    fn display_name(&self) -> String {
        if !self.name.trim().is_empty() {
            self.name.clone()
        } else if !self.kind.trim().is_empty() {
            self.kind.clone()
        } else {
            format!("class {}", self.class_id)
        }
    }

    fn details(&self) -> String {
        let mut details = format!("신뢰도: {:.0}%", self.confidence * 100.0);
        if self.width_cm > 0.0 || self.length_cm > 0.0 {
            details.push_str(&format!(
                " • 크기: {:.1}×{:.1} cm",
                self.width_cm, self.length_cm
            ));
        }
        if self.area_m2 > 0.0 {
            details.push_str(&format!(" • 면적: {:.2} m²", self.area_m2));
        }
        details
    }

    /// Box geometry in source image pixels (top-left origin). Degenerate boxes are dropped.
    fn shape(&self) -> Option<Shape> {
        (self.width > 0.0 && self.height > 0.0)
            .then(|| Shape::bbox(self.x, self.y, self.width, self.height))
    }

    pub fn into_finding(self) -> Finding {
        Finding {
            name: self.display_name(),
            details: self.details(),
            severity: RiskLevel::parse(&self.risk_level).severity(),
            confidence: self.confidence.clamp(0.0, 1.0),
            shape: self.shape(),
        }
    }
}

impl PredictResponse {
    pub fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body).context("decode prediction response")
    }

    pub fn into_analysis(self) -> Analysis {
        let findings = self
            .predictions
            .unwrap_or_default()
            .into_iter()
            .map(Prediction::into_finding)
            .collect();
        Analysis {
            findings,
            annotated_image_url: self.result_image_url.filter(|url| !url.trim().is_empty()),
            day_or_night: self.day_or_night,
            overall_risk: self.overall_risk.as_deref().map(RiskLevel::parse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::Severity;

    const SAMPLE: &str = r#"{
        "predictions": [
            {
                "class_id": 0,
                "name": "포트홀",
                "confidence": 0.91,
                "type": "pothole",
                "x": 120, "y": 80, "width": 60, "height": 40,
                "width_cm": 35.5, "length_cm": 42.0, "area_m2": 0.15,
                "risk_level": "A"
            },
            {
                "class_id": 3,
                "name": "",
                "confidence": 0.4,
                "type": "crack",
                "x": 10, "y": 10, "width": 0, "height": 0,
                "risk_level": "-"
            }
        ],
        "day_or_night": "day",
        "overall_risk": "A",
        "original_image_url": "http://api.local/static/in.jpg",
        "result_image_url": "http://api.local/static/out.jpg"
    }"#;

    #[test]
    fn maps_predictions_onto_findings() -> Result<()> {
        let analysis = PredictResponse::parse(SAMPLE)?.into_analysis();
        assert_eq!(analysis.findings.len(), 2);

        let pothole = &analysis.findings[0];
        assert_eq!(pothole.name, "포트홀");
        assert_eq!(pothole.severity, Severity::High);
        assert_eq!(
            pothole.details,
            "신뢰도: 91% • 크기: 35.5×42.0 cm • 면적: 0.15 m²"
        );
        assert_eq!(pothole.shape, Some(Shape::bbox(120.0, 80.0, 60.0, 40.0)));

        let crack = &analysis.findings[1];
        assert_eq!(crack.name, "crack");
        assert_eq!(crack.severity, Severity::Low);
        assert!(crack.shape.is_none());

        assert_eq!(analysis.overall_risk, Some(RiskLevel::A));
        assert_eq!(analysis.day_or_night.as_deref(), Some("day"));
        assert_eq!(
            analysis.annotated_image_url.as_deref(),
            Some("http://api.local/static/out.jpg")
        );
        Ok(())
    }

    #[test]
    fn missing_predictions_is_zero_findings() -> Result<()> {
        let analysis = PredictResponse::parse(r#"{"day_or_night": "night"}"#)?.into_analysis();
        assert!(analysis.findings.is_empty());
        assert!(analysis.annotated_image_url.is_none());

        let analysis = PredictResponse::parse(r#"{"predictions": []}"#)?.into_analysis();
        assert!(analysis.findings.is_empty());
        Ok(())
    }

    #[test]
    fn null_fields_fall_back_to_defaults() -> Result<()> {
        let body = r#"{
            "predictions": [
                {"class_id": null, "name": null, "confidence": 0.75, "type": "pothole",
                 "x": 5, "y": 5, "width": 20, "height": null,
                 "width_cm": null, "length_cm": null, "area_m2": null, "risk_level": null}
            ],
            "day_or_night": null,
            "result_image_url": null
        }"#;
        let analysis = PredictResponse::parse(body)?.into_analysis();
        assert_eq!(analysis.findings.len(), 1);

        let finding = &analysis.findings[0];
        assert_eq!(finding.name, "pothole");
        assert_eq!(finding.details, "신뢰도: 75%");
        assert_eq!(finding.severity, Severity::Low);
        assert!(finding.shape.is_none());
        assert!(analysis.day_or_night.is_none());
        assert!(analysis.annotated_image_url.is_none());
        Ok(())
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(PredictResponse::parse("<html>bad gateway</html>").is_err());
    }
}
