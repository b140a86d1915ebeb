//! Presentation of dashboard state.
//!
//! A snapshot is a pure projection: colours, badges and labels are derived
//! here, never stored on the dashboard.

use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::dashboard::{Dashboard, Preview, Tab, Theme, View};
use crate::detect::{Finding, Point, PreviewSize, RiskLevel, Severity, Shape};
use crate::overlay::{Overlay, OverlayId};
use crate::results::{Detection, DetectionId, DetectionStats};

const LIVE_FILL_ALPHA: f32 = 0.1;
const UPLOAD_FILL_ALPHA: f32 = 0.2;

/// Stroke colour for a severity.
pub fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::High => "#ff3366",
        Severity::Medium => "#ff8800",
        Severity::Low => "#ffdd00",
    }
}

fn severity_rgb(severity: Severity) -> (u8, u8, u8) {
    match severity {
        Severity::High => (0xff, 0x33, 0x66),
        Severity::Medium => (0xff, 0x88, 0x00),
        Severity::Low => (0xff, 0xdd, 0x00),
    }
}

/// Label text must stay readable on the yellow low-severity tag.
pub fn label_text_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "#000000",
        Severity::High | Severity::Medium => "#ffffff",
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShapeStyle {
    pub stroke: &'static str,
    pub fill: String,
    pub label_background: &'static str,
    pub label_text: &'static str,
    pub label_anchor: Point,
}

impl ShapeStyle {
    fn new(severity: Severity, shape: &Shape, fill_alpha: f32) -> Self {
        let (r, g, b) = severity_rgb(severity);
        Self {
            stroke: severity_color(severity),
            fill: format!("rgba({}, {}, {}, {})", r, g, b, fill_alpha),
            label_background: severity_color(severity),
            label_text: label_text_color(severity),
            label_anchor: shape.label_anchor(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OverlayView {
    pub id: OverlayId,
    pub name: String,
    pub severity: Severity,
    pub shape: Shape,
    pub style: ShapeStyle,
}

impl OverlayView {
    fn from_overlay(overlay: &Overlay) -> Self {
        Self {
            id: overlay.id,
            name: overlay.name.clone(),
            severity: overlay.severity,
            shape: overlay.shape.clone(),
            style: ShapeStyle::new(overlay.severity, &overlay.shape, LIVE_FILL_ALPHA),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionEntry {
    pub id: DetectionId,
    pub name: String,
    pub details: String,
    pub severity: Severity,
    pub badge: &'static str,
    pub shape: Option<&'static str>,
    pub time: String,
}

impl DetectionEntry {
    fn from_detection(detection: &Detection, now_ms: u64) -> Self {
        Self {
            id: detection.id,
            name: detection.name.clone(),
            details: detection.details.clone(),
            severity: detection.severity,
            badge: detection.severity.badge(),
            shape: detection.shape_kind.map(|kind| kind.label()),
            time: time_label(detection.created_at_ms, now_ms),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FindingEntry {
    pub name: String,
    pub details: String,
    pub severity: Severity,
    pub badge: &'static str,
    pub shape: Option<Shape>,
    pub style: Option<ShapeStyle>,
}

impl FindingEntry {
    fn from_finding(finding: &Finding) -> Self {
        Self {
            name: finding.name.clone(),
            details: finding.details.clone(),
            severity: finding.severity,
            badge: finding.severity.badge(),
            shape: finding.shape.clone(),
            style: finding
                .shape
                .as_ref()
                .map(|shape| ShapeStyle::new(finding.severity, shape, UPLOAD_FILL_ALPHA)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisView {
    pub analyzing: bool,
    pub findings: Vec<FindingEntry>,
    pub annotated_image_url: Option<String>,
    pub day_or_night: Option<String>,
    pub overall_risk: Option<RiskLevel>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub view: View,
    pub tab: Tab,
    pub theme: Theme,
    pub preview: Preview,
    pub preview_size: PreviewSize,
    pub processing: bool,
    pub camera_attached: bool,
    pub connection_status: String,
    pub processing_status: String,
    pub alert_count: u64,
    pub overlays: Vec<OverlayView>,
    pub live: Vec<DetectionEntry>,
    pub history: Vec<DetectionEntry>,
    pub stats: DetectionStats,
    pub analysis: AnalysisView,
}

impl DashboardSnapshot {
    pub fn capture(dashboard: &Dashboard) -> Self {
        let now_ms = wall_clock_ms();
        let analysis = dashboard.analysis();
        Self {
            view: dashboard.view(),
            tab: dashboard.tab(),
            theme: dashboard.theme(),
            preview: dashboard.preview().clone(),
            preview_size: dashboard.preview_size(),
            processing: dashboard.is_processing(),
            camera_attached: dashboard.camera_attached(),
            connection_status: dashboard.connection_status().to_string(),
            processing_status: dashboard.processing_status().to_string(),
            alert_count: dashboard.alert_count(),
            overlays: dashboard.overlays().map(OverlayView::from_overlay).collect(),
            live: dashboard
                .live_results()
                .iter()
                .map(|d| DetectionEntry::from_detection(d, now_ms))
                .collect(),
            history: dashboard
                .history()
                .iter()
                .map(|d| DetectionEntry::from_detection(d, now_ms))
                .collect(),
            stats: dashboard.stats(),
            analysis: AnalysisView {
                analyzing: dashboard.is_analyzing(),
                findings: analysis
                    .map(|a| a.findings.iter().map(FindingEntry::from_finding).collect())
                    .unwrap_or_default(),
                annotated_image_url: analysis.and_then(|a| a.annotated_image_url.clone()),
                day_or_night: analysis.and_then(|a| a.day_or_night.clone()),
                overall_risk: analysis.and_then(|a| a.overall_risk),
            },
        }
    }

    /// Plain-text rendering of the active view and tab.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "[{}] {} | {} | 알림 {}",
            match self.view {
                View::Live => "실시간",
                View::Upload => "이미지",
            },
            self.connection_status,
            self.processing_status,
            self.alert_count
        );

        match self.view {
            View::Live => self.render_live(&mut out),
            View::Upload => self.render_upload(&mut out),
        }
        out
    }

    fn render_live(&self, out: &mut String) {
        if !self.overlays.is_empty() {
            let _ = writeln!(out, "표시 중: {}개", self.overlays.len());
        }
        match self.tab {
            Tab::Live => render_entries(out, "실시간 감지", &self.live),
            Tab::History => render_entries(out, "감지 기록", &self.history),
            Tab::Stats => {
                let _ = writeln!(out, "-- 통계 --");
                let _ = writeln!(
                    out,
                    "전체 {} | 높음 {} | 중간 {} | 낮음 {}",
                    self.stats.total, self.stats.high, self.stats.medium, self.stats.low
                );
            }
        }
    }

    fn render_upload(&self, out: &mut String) {
        if let Preview::Remote { url } = &self.preview {
            let _ = writeln!(out, "결과 이미지: {}", url);
        }
        if let Some(risk) = self.analysis.overall_risk {
            let _ = writeln!(
                out,
                "종합 위험도: {:?} | {}",
                risk,
                self.analysis.day_or_night.as_deref().unwrap_or("-")
            );
        }
        if self.analysis.analyzing {
            return;
        }
        let _ = writeln!(out, "-- 분석 결과 --");
        if self.analysis.findings.is_empty() {
            let _ = writeln!(out, "  (없음)");
        }
        for finding in &self.analysis.findings {
            let _ = writeln!(
                out,
                "  [{}] {} - {}",
                finding.badge, finding.name, finding.details
            );
        }
    }
}

fn render_entries(out: &mut String, title: &str, entries: &[DetectionEntry]) {
    let _ = writeln!(out, "-- {} --", title);
    if entries.is_empty() {
        let _ = writeln!(out, "  (없음)");
    }
    for entry in entries {
        let shape = entry
            .shape
            .map(|label| format!(" ({})", label))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  [{}] {}{} - {} · {}",
            entry.badge, entry.name, shape, entry.details, entry.time
        );
    }
}

/// 방금 under a minute, then minutes, then hours.
pub fn time_label(created_at_ms: u64, now_ms: u64) -> String {
    let minutes = now_ms.saturating_sub(created_at_ms) / 60_000;
    match minutes {
        0 => "방금".to_string(),
        1..=59 => format!("{}분 전", minutes),
        _ => format!("{}시간 전", minutes / 60),
    }
}

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
