use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::alert::SpeechSettings;
use crate::dashboard::DashboardSettings;
use crate::detect::backends::canned::CANNED_LATENCY;
use crate::detect::backends::simulated::{
    Catalog, Hazard, ShapeMode, SimulationSettings, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY,
};
use crate::ingest::{CaptureConstraints, FacingMode};
use crate::overlay::OVERLAY_DWELL;
use crate::results::{MAX_HISTORY_DETECTIONS, MAX_LIVE_DETECTIONS};

const DEFAULT_UPLOAD_SOURCE: &str = "mock";
const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_API_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CAMERA_URL: &str = "stub://front_camera";

/// Upload sources the binary knows how to build.
pub const UPLOAD_SOURCES: &[&str] = &["mock", "api"];

#[derive(Debug, Deserialize, Default)]
struct RoadVisionConfigFile {
    simulation: Option<SimulationConfigFile>,
    overlay: Option<OverlayConfigFile>,
    live: Option<LiveConfigFile>,
    upload: Option<UploadConfigFile>,
    camera: Option<CameraConfigFile>,
    speech: Option<SpeechConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SimulationConfigFile {
    catalog: Option<String>,
    hazards: Option<Vec<Hazard>>,
    shapes: Option<String>,
    min_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    dwell_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct LiveConfigFile {
    max_results: Option<usize>,
    max_history: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct UploadConfigFile {
    source: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    mock_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    /// `square` (512x512) or `hd` (1280x720); width/height override it.
    preset: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    facing: Option<FacingMode>,
}

#[derive(Debug, Deserialize, Default)]
struct SpeechConfigFile {
    lang: Option<String>,
    rate: Option<f32>,
    pitch: Option<f32>,
    volume: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct RoadVisionConfig {
    pub simulation: SimulationConfig,
    pub overlay_dwell: Duration,
    pub max_live_results: usize,
    pub max_history: usize,
    pub upload: UploadSettings,
    pub camera: CameraSettings,
    pub speech: SpeechSettings,
}

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub catalog: Catalog,
    /// Replaces the built-in catalog when set.
    pub hazards: Option<Vec<Hazard>>,
    pub shapes: ShapeMode,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub source: String,
    pub base_url: String,
    pub timeout: Duration,
    /// Delay before the offline analysis delivers its canned findings.
    pub mock_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub facing: FacingMode,
}

impl RoadVisionConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ROADVISION_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RoadVisionConfigFile) -> Result<Self> {
        let sim = file.simulation.unwrap_or_default();
        let simulation = SimulationConfig {
            catalog: match sim.catalog.as_deref() {
                Some(raw) => Catalog::parse(raw)?,
                None => Catalog::default(),
            },
            hazards: sim.hazards,
            shapes: match sim.shapes.as_deref() {
                Some(raw) => ShapeMode::parse(raw)?,
                None => ShapeMode::default(),
            },
            min_delay: sim
                .min_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_MIN_DELAY),
            max_delay: sim
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_MAX_DELAY),
            seed: sim.seed,
        };
        let overlay_dwell = file
            .overlay
            .and_then(|overlay| overlay.dwell_ms)
            .map(Duration::from_millis)
            .unwrap_or(OVERLAY_DWELL);
        let live = file.live.unwrap_or_default();
        let upload = file.upload.unwrap_or_default();
        let upload = UploadSettings {
            source: upload
                .source
                .unwrap_or_else(|| DEFAULT_UPLOAD_SOURCE.to_string()),
            base_url: upload
                .base_url
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            timeout: Duration::from_secs(upload.timeout_secs.unwrap_or(DEFAULT_API_TIMEOUT_SECS)),
            mock_delay: upload
                .mock_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(CANNED_LATENCY),
        };
        let camera = file.camera.unwrap_or_default();
        let preset = match camera.preset.as_deref().map(str::trim) {
            None | Some("square") => CaptureConstraints::default(),
            Some("hd") => CaptureConstraints::hd(),
            Some(other) => {
                return Err(anyhow!(
                    "unknown camera preset '{}'; expected square or hd",
                    other
                ))
            }
        };
        let camera = CameraSettings {
            url: camera
                .url
                .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
            width: camera.width.unwrap_or(preset.ideal_width),
            height: camera.height.unwrap_or(preset.ideal_height),
            facing: camera.facing.unwrap_or(preset.facing),
        };
        let defaults = SpeechSettings::default();
        let speech = file.speech.unwrap_or_default();
        let speech = SpeechSettings {
            lang: speech.lang.unwrap_or(defaults.lang),
            rate: speech.rate.unwrap_or(defaults.rate),
            pitch: speech.pitch.unwrap_or(defaults.pitch),
            volume: speech.volume.unwrap_or(defaults.volume),
        };
        Ok(Self {
            simulation,
            overlay_dwell,
            max_live_results: live.max_results.unwrap_or(MAX_LIVE_DETECTIONS),
            max_history: live.max_history.unwrap_or(MAX_HISTORY_DETECTIONS),
            upload,
            camera,
            speech,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("ROADVISION_API_BASE_URL") {
            if !url.trim().is_empty() {
                self.upload.base_url = url.trim().to_string();
            }
        }
        if let Ok(source) = std::env::var("ROADVISION_UPLOAD_SOURCE") {
            if !source.trim().is_empty() {
                self.upload.source = source.trim().to_ascii_lowercase();
            }
        }
        if let Ok(url) = std::env::var("ROADVISION_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(seed) = std::env::var("ROADVISION_SEED") {
            let seed: u64 = seed
                .trim()
                .parse()
                .map_err(|_| anyhow!("ROADVISION_SEED must be an unsigned integer"))?;
            self.simulation.seed = Some(seed);
        }
        if let Ok(shapes) = std::env::var("ROADVISION_SIMULATION_SHAPES") {
            if !shapes.trim().is_empty() {
                self.simulation.shapes = ShapeMode::parse(&shapes)?;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.simulation.max_delay <= self.simulation.min_delay {
            return Err(anyhow!(
                "simulation max_delay_ms ({}) must exceed min_delay_ms ({})",
                self.simulation.max_delay.as_millis(),
                self.simulation.min_delay.as_millis()
            ));
        }
        if self
            .simulation
            .hazards
            .as_ref()
            .is_some_and(|hazards| hazards.is_empty())
        {
            return Err(anyhow!("simulation hazards must not be empty"));
        }
        if self.overlay_dwell.is_zero() {
            return Err(anyhow!("overlay dwell must be greater than zero"));
        }
        if self.max_live_results == 0 || self.max_history == 0 {
            return Err(anyhow!("live result and history caps must be greater than zero"));
        }
        if !UPLOAD_SOURCES.contains(&self.upload.source.as_str()) {
            return Err(anyhow!(
                "unknown upload source '{}' (expected one of: {})",
                self.upload.source,
                UPLOAD_SOURCES.join(", ")
            ));
        }
        if self.upload.base_url.trim().is_empty() {
            return Err(anyhow!("upload base_url must not be empty"));
        }
        self.upload.base_url = self.upload.base_url.trim_end_matches('/').to_string();
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.speech.rate <= 0.0 {
            return Err(anyhow!("speech rate must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.speech.volume) {
            return Err(anyhow!("speech volume must be within 0.0..=1.0"));
        }
        Ok(())
    }

    pub fn simulation_settings(&self) -> SimulationSettings {
        SimulationSettings {
            hazards: self
                .simulation
                .hazards
                .clone()
                .unwrap_or_else(|| self.simulation.catalog.hazards()),
            shapes: self.simulation.shapes,
            min_delay: self.simulation.min_delay,
            max_delay: self.simulation.max_delay,
            seed: self.simulation.seed,
        }
    }

    pub fn capture_constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            ideal_width: self.camera.width,
            ideal_height: self.camera.height,
            facing: self.camera.facing,
        }
    }

    pub fn dashboard_settings(&self) -> DashboardSettings {
        DashboardSettings {
            live_capacity: self.max_live_results,
            history_capacity: self.max_history,
            overlay_dwell: self.overlay_dwell,
            capture: self.capture_constraints(),
        }
    }

    #[cfg(feature = "predict-api")]
    pub fn predict_api_config(&self) -> crate::detect::backends::PredictApiConfig {
        crate::detect::backends::PredictApiConfig {
            base_url: self.upload.base_url.clone(),
            timeout: self.upload.timeout,
        }
    }
}

/// `.toml` files are read as TOML; anything else as JSON.
fn read_config_file(path: &Path) -> Result<RoadVisionConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() -> Result<()> {
        let mut cfg = RoadVisionConfig::from_file(RoadVisionConfigFile::default())?;
        cfg.validate()?;
        assert_eq!(cfg.upload.source, "mock");
        assert_eq!(cfg.camera.url, "stub://front_camera");
        assert_eq!(cfg.overlay_dwell, Duration::from_millis(3_000));
        assert_eq!(cfg.max_live_results, 10);
        assert_eq!(cfg.simulation_settings().hazards.len(), 3);
        assert_eq!(cfg.capture_constraints(), CaptureConstraints::default());
        Ok(())
    }

    #[test]
    fn extended_catalog_and_custom_hazards() -> Result<()> {
        let file: RoadVisionConfigFile = toml::from_str(
            r#"
            [simulation]
            catalog = "extended"
            "#,
        )?;
        let cfg = RoadVisionConfig::from_file(file)?;
        assert_eq!(cfg.simulation_settings().hazards.len(), 6);

        let file: RoadVisionConfigFile = serde_json::from_str(
            r#"{"simulation": {"hazards": [{"name": "결빙", "severity": "high", "confidence": 70}]}}"#,
        )?;
        let cfg = RoadVisionConfig::from_file(file)?;
        let hazards = cfg.simulation_settings().hazards;
        assert_eq!(hazards, vec![Hazard::new("결빙", crate::detect::Severity::High, 70)]);
        Ok(())
    }

    #[test]
    fn hd_camera_preset() -> Result<()> {
        let file: RoadVisionConfigFile = toml::from_str(
            r#"
            [camera]
            preset = "hd"
            height = 640
            "#,
        )?;
        let cfg = RoadVisionConfig::from_file(file)?;
        assert_eq!(cfg.camera.width, 1280);
        assert_eq!(cfg.camera.height, 640);
        Ok(())
    }

    #[test]
    fn inverted_delay_bounds_are_rejected() -> Result<()> {
        let file: RoadVisionConfigFile = serde_json::from_str(
            r#"{"simulation": {"min_delay_ms": 5000, "max_delay_ms": 1000}}"#,
        )?;
        let mut cfg = RoadVisionConfig::from_file(file)?;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("must exceed"));
        Ok(())
    }

    #[test]
    fn unknown_upload_source_is_rejected() -> Result<()> {
        let file: RoadVisionConfigFile =
            serde_json::from_str(r#"{"upload": {"source": "onnx"}}"#)?;
        let mut cfg = RoadVisionConfig::from_file(file)?;
        assert!(cfg.validate().is_err());
        Ok(())
    }
}
