//! Dashboard state machine.
//!
//! The dashboard is responsible for:
//! - Owning the camera stream, the simulation chain and every pending timer
//! - Funnelling findings from any source through one emission path
//! - Keeping live/upload mode mutually exclusive
//!
//! The dashboard MUST NOT:
//! - Run anything concurrently (time only moves in `advance_to`)
//! - Keep a camera stream alive outside the live session
//! - Hold more than one uploaded image (a new upload replaces the preview)

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::alert::Alerter;
use crate::detect::{Analysis, DetectionContext, PreviewSize, Severity, Shape, SharedSource};
use crate::ingest::{CameraDevice, CaptureConstraints, MediaStream, UploadedImage};
use crate::overlay::{Overlay, OverlayId, OverlayStore, OVERLAY_DWELL};
use crate::results::{
    Detection, DetectionStats, RecentDetections, MAX_HISTORY_DETECTIONS, MAX_LIVE_DETECTIONS,
};
use crate::timer::{TimerId, TimerQueue};
use crate::view::DashboardSnapshot;

pub const STATUS_DISCONNECTED: &str = "대기 중";
pub const STATUS_CONNECTED: &str = "연결됨";
pub const STATUS_READY: &str = "준비됨";
pub const STATUS_LIVE: &str = "실시간 분석 중";
pub const STATUS_ANALYZING: &str = "이미지 분석 중...";

const SPEECH_HIGH_RISK_IMAGE: &str = "이미지에서 고위험 요소가 발견되었습니다.";
const SPEECH_NOTHING_FOUND: &str = "이미지 분석 결과, 특이사항이 발견되지 않았습니다.";
const SPEECH_ANALYSIS_FAILED: &str = "이미지 분석에 실패했습니다.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Live,
    Upload,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    Live,
    History,
    Stats,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// What the preview surface shows.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Preview {
    Placeholder,
    Video { label: String },
    Image { data_url: String },
    Remote { url: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerEvent {
    SimulationTick { session: u64 },
    OverlayExpired(OverlayId),
    AnalysisDue { upload: u64 },
}

/// Cancellable handle to a running simulation chain.
#[derive(Clone, Debug)]
pub struct SimulationHandle {
    session: u64,
    cancelled: Arc<AtomicBool>,
}

impl SimulationHandle {
    fn new(session: u64) -> Self {
        Self {
            session,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Stop the chain. Idempotent; a tick already queued is discarded.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub struct DashboardSettings {
    pub live_capacity: usize,
    pub history_capacity: usize,
    pub overlay_dwell: Duration,
    pub capture: CaptureConstraints,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            live_capacity: MAX_LIVE_DETECTIONS,
            history_capacity: MAX_HISTORY_DETECTIONS,
            overlay_dwell: OVERLAY_DWELL,
            capture: CaptureConstraints::default(),
        }
    }
}

/// How an emission is surfaced beyond counting.
#[derive(Clone, Copy, Debug)]
struct Emit {
    overlay: bool,
    alert: bool,
}

struct ActiveSimulation {
    handle: SimulationHandle,
    timer: Option<TimerId>,
}

struct PendingAnalysis {
    upload: u64,
    timer: TimerId,
    result: Result<Analysis>,
}

pub struct Dashboard {
    settings: DashboardSettings,
    live_source: SharedSource,
    upload_source: SharedSource,
    alerter: Alerter,

    timers: TimerQueue<TimerEvent>,
    now: Duration,

    view: View,
    tab: Tab,
    theme: Theme,
    preview: Preview,
    preview_size: PreviewSize,
    notice: Option<String>,

    stream: Option<Box<dyn MediaStream>>,
    processing: bool,
    connection_status: String,
    processing_status: String,
    simulation: Option<ActiveSimulation>,
    next_session: u64,

    overlays: OverlayStore,
    overlay_timers: HashMap<OverlayId, TimerId>,
    live: RecentDetections,
    history: RecentDetections,
    alert_count: u64,

    analyzing: bool,
    analysis: Option<Analysis>,
    pending: Option<PendingAnalysis>,
    upload_seq: u64,
}

impl Dashboard {
    pub fn new(
        settings: DashboardSettings,
        live_source: SharedSource,
        upload_source: SharedSource,
        alerter: Alerter,
    ) -> Self {
        let live = RecentDetections::new(settings.live_capacity);
        let history = RecentDetections::new(settings.history_capacity);
        Self {
            settings,
            live_source,
            upload_source,
            alerter,
            timers: TimerQueue::new(),
            now: Duration::ZERO,
            view: View::Live,
            tab: Tab::Live,
            theme: Theme::default(),
            preview: Preview::Placeholder,
            preview_size: PreviewSize::default(),
            notice: None,
            stream: None,
            processing: false,
            connection_status: STATUS_DISCONNECTED.to_string(),
            processing_status: STATUS_READY.to_string(),
            simulation: None,
            next_session: 0,
            overlays: OverlayStore::new(),
            overlay_timers: HashMap::new(),
            live,
            history,
            alert_count: 0,
            analyzing: false,
            analysis: None,
            pending: None,
            upload_seq: 0,
        }
    }

    // ------------------------------------------------------------------------
    // Time
    // ------------------------------------------------------------------------

    /// Session time.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    /// Fire every timer due at or before `target`, in deadline order. Each
    /// handler runs with the clock set to its own deadline. Time never moves
    /// backwards.
    pub fn advance_to(&mut self, target: Duration) {
        self.reap_cancelled_simulation();
        while let Some(deadline) = self.timers.next_deadline() {
            if deadline > target {
                break;
            }
            self.now = self.now.max(deadline);
            let Some((_, event)) = self.timers.pop_due(deadline) else {
                break;
            };
            self.handle(event);
        }
        self.now = self.now.max(target);
    }

    pub fn advance_by(&mut self, delta: Duration) {
        self.advance_to(self.now + delta);
    }

    fn handle(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::SimulationTick { session } => self.on_simulation_tick(session),
            TimerEvent::OverlayExpired(id) => {
                self.overlay_timers.remove(&id);
                if self.overlays.remove(id) {
                    log::debug!("overlay {} expired", id.as_u64());
                }
            }
            TimerEvent::AnalysisDue { upload } => self.on_analysis_due(upload),
        }
    }

    // ------------------------------------------------------------------------
    // User intents
    // ------------------------------------------------------------------------

    /// Open the camera and start the live session. Only valid in the live view.
    pub fn start_camera(&mut self, camera: &mut dyn CameraDevice) -> Result<()> {
        if self.view != View::Live {
            return Err(anyhow!("camera can only be started from the live view"));
        }
        self.reap_cancelled_simulation();
        if self.stream.is_some() {
            if self.simulation_running() {
                log::debug!("camera already running");
                return Ok(());
            }
            log::info!("live session ended; reopening camera");
            self.stop_camera();
        }
        self.alerter.init_audio();

        let stream = match camera.open(&self.settings.capture) {
            Ok(stream) => stream,
            Err(err) => {
                log::warn!("camera start failed: {}", err);
                self.notice = Some(err.notice().to_string());
                return Err(err.into());
            }
        };
        let (width, height) = stream.resolution();
        log::info!(
            "camera started: {} ({}x{})",
            stream.label(),
            width,
            height
        );
        self.preview = Preview::Video {
            label: stream.label().to_string(),
        };
        self.stream = Some(stream);
        self.notice = None;
        self.processing = true;
        self.connection_status = STATUS_CONNECTED.to_string();
        self.processing_status = STATUS_LIVE.to_string();
        self.live.clear();
        self.clear_overlays();
        self.start_simulation();
        Ok(())
    }

    /// Stop the camera: tracks stopped, simulation cancelled, live state cleared.
    pub fn stop_camera(&mut self) {
        let was_running = self.stream.is_some() || self.processing;
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
        self.cancel_simulation();
        self.processing = false;
        self.clear_overlays();
        self.live.clear();
        if matches!(self.preview, Preview::Video { .. }) {
            self.preview = Preview::Placeholder;
        }
        self.connection_status = STATUS_DISCONNECTED.to_string();
        self.processing_status = STATUS_READY.to_string();
        if was_running {
            log::info!("camera stopped");
        }
    }

    /// Switch between live and upload mode, tearing down the other mode's state.
    pub fn switch_view(&mut self, view: View) {
        if self.view == view {
            return;
        }
        match view {
            View::Upload => {
                self.stop_camera();
                self.alert_count = 0;
            }
            View::Live => {
                self.cancel_pending_analysis();
                self.analysis = None;
                self.analyzing = false;
                self.preview = Preview::Placeholder;
                self.processing_status = STATUS_READY.to_string();
            }
        }
        log::debug!("view {:?} -> {:?}", self.view, view);
        self.view = view;
    }

    pub fn select_tab(&mut self, tab: Tab) {
        self.tab = tab;
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.theme = self.theme.toggled();
        self.theme
    }

    /// Record the measured size of the live preview surface.
    pub fn set_preview_size(&mut self, size: PreviewSize) {
        self.preview_size = size.or_default();
    }

    /// Blocking notice raised by the last failed camera start, if any.
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    // ------------------------------------------------------------------------
    // Simulation
    // ------------------------------------------------------------------------

    /// Start the simulation chain; the first tick is due immediately.
    /// Any previous chain is cancelled.
    pub fn start_simulation(&mut self) -> SimulationHandle {
        self.cancel_simulation();
        self.next_session += 1;
        let handle = SimulationHandle::new(self.next_session);
        let timer = self.timers.schedule_at(
            self.now,
            TimerEvent::SimulationTick {
                session: handle.session,
            },
        );
        self.simulation = Some(ActiveSimulation {
            handle: handle.clone(),
            timer: Some(timer),
        });
        log::debug!("simulation session {} started", handle.session);
        handle
    }

    pub fn simulation_running(&self) -> bool {
        self.simulation
            .as_ref()
            .is_some_and(|sim| !sim.handle.is_cancelled())
    }

    fn cancel_simulation(&mut self) {
        if let Some(sim) = self.simulation.take() {
            sim.handle.cancel();
            if let Some(timer) = sim.timer {
                self.timers.cancel(timer);
            }
            log::debug!("simulation session {} cancelled", sim.handle.session);
        }
    }

    /// Tear down a chain whose handle was cancelled from outside. The camera
    /// stays attached; the session just stops analysing.
    fn reap_cancelled_simulation(&mut self) {
        if self
            .simulation
            .as_ref()
            .is_some_and(|sim| sim.handle.is_cancelled())
        {
            self.end_simulation();
        }
    }

    fn end_simulation(&mut self) {
        self.cancel_simulation();
        self.processing = false;
        self.processing_status = if self.stream.is_some() {
            STATUS_CONNECTED.to_string()
        } else {
            STATUS_READY.to_string()
        };
    }

    fn on_simulation_tick(&mut self, session: u64) {
        self.reap_cancelled_simulation();
        let active = matches!(
            self.simulation.as_ref(),
            Some(sim) if sim.handle.session == session && !sim.handle.is_cancelled()
        );
        if !active || !self.processing || self.view != View::Live {
            log::debug!("discarding stale simulation tick (session {})", session);
            return;
        }

        match self.produce_live() {
            Ok(analysis) => {
                for finding in analysis.findings {
                    self.emit(
                        &finding.name,
                        &finding.details,
                        finding.severity,
                        finding.shape,
                        Emit {
                            overlay: true,
                            alert: true,
                        },
                    );
                }
            }
            Err(err) => log::warn!("simulation tick failed: {:#}", err),
        }

        let next = match self.produce_interval() {
            Ok(next) => next,
            Err(err) => {
                log::warn!("simulation reschedule failed: {:#}", err);
                None
            }
        };
        let Some(delay) = next else {
            log::info!("simulation session {} ended", session);
            self.end_simulation();
            return;
        };
        let timer = self
            .timers
            .schedule_at(self.now + delay, TimerEvent::SimulationTick { session });
        if let Some(sim) = self.simulation.as_mut() {
            sim.timer = Some(timer);
        }
    }

    fn produce_live(&self) -> Result<Analysis> {
        let mut source = self
            .live_source
            .lock()
            .map_err(|_| anyhow!("live source lock poisoned"))?;
        source.produce(&DetectionContext::live(self.preview_size))
    }

    fn produce_interval(&self) -> Result<Option<Duration>> {
        let mut source = self
            .live_source
            .lock()
            .map_err(|_| anyhow!("live source lock poisoned"))?;
        Ok(source.next_interval())
    }

    // ------------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------------

    /// Report one finding: count it, list it (live view), draw it (live view
    /// with a camera attached) and alert on high severity.
    pub fn add_detection_result(
        &mut self,
        name: &str,
        details: &str,
        severity: Severity,
        shape: Option<Shape>,
    ) {
        let overlay = shape.is_some();
        self.emit(
            name,
            details,
            severity,
            shape,
            Emit {
                overlay,
                alert: true,
            },
        );
    }

    fn emit(
        &mut self,
        name: &str,
        details: &str,
        severity: Severity,
        shape: Option<Shape>,
        emit: Emit,
    ) {
        self.alert_count += 1;

        if self.view == View::Live {
            let detection = Detection::new(name, details, severity, shape.as_ref().map(Shape::kind));
            self.history.push(detection.clone());
            self.live.push(detection);
        }

        if emit.overlay && self.view == View::Live && self.stream.is_some() {
            if let Some(shape) = shape {
                self.add_overlay(shape, name, severity);
            }
        }

        if emit.alert && severity == Severity::High {
            self.alerter.play_alert_sound();
            self.alerter
                .speak(&format!("위험 요소 감지: {}", name), self.now);
        }
        log::info!("detection: {} [{}] {}", name, severity, details);
    }

    /// Draw an overlay and schedule its removal after the dwell time.
    pub fn add_overlay(&mut self, shape: Shape, name: &str, severity: Severity) -> Option<OverlayId> {
        let expires_at = self.now + self.settings.overlay_dwell;
        let Some(id) = self.overlays.add(shape, name, severity, expires_at) else {
            log::debug!("overlay for {} rejected: shape not drawable", name);
            return None;
        };
        let timer = self
            .timers
            .schedule_at(expires_at, TimerEvent::OverlayExpired(id));
        self.overlay_timers.insert(id, timer);
        Some(id)
    }

    /// Remove an overlay early. Idempotent.
    pub fn remove_overlay(&mut self, id: OverlayId) -> bool {
        if let Some(timer) = self.overlay_timers.remove(&id) {
            self.timers.cancel(timer);
        }
        self.overlays.remove(id)
    }

    fn clear_overlays(&mut self) {
        for id in self.overlays.clear() {
            if let Some(timer) = self.overlay_timers.remove(&id) {
                self.timers.cancel(timer);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Upload
    // ------------------------------------------------------------------------

    /// Analyze an uploaded image. Switches to the upload view if needed.
    ///
    /// Sources with zero latency complete before this returns; otherwise the
    /// result is delivered when the analysis timer fires.
    pub fn upload(&mut self, image: UploadedImage) -> Result<()> {
        self.alerter.init_audio();
        self.switch_view(View::Upload);
        self.cancel_pending_analysis();
        self.analysis = None;

        self.upload_seq += 1;
        let upload = self.upload_seq;
        self.analyzing = true;
        self.processing_status = STATUS_ANALYZING.to_string();
        self.preview = Preview::Image {
            data_url: image.data_url(),
        };
        log::info!(
            "analyzing {} ({}, {} bytes)",
            image.file_name(),
            image.mime_type(),
            image.len()
        );

        let (result, latency) = match self.upload_source.lock() {
            Ok(mut source) => {
                let result = source.produce(&DetectionContext::upload(self.preview_size, &image));
                (result, source.latency())
            }
            Err(_) => (Err(anyhow!("upload source lock poisoned")), Duration::ZERO),
        };

        if latency.is_zero() {
            self.settle_analysis(result);
        } else {
            let timer = self
                .timers
                .schedule_at(self.now + latency, TimerEvent::AnalysisDue { upload });
            self.pending = Some(PendingAnalysis {
                upload,
                timer,
                result,
            });
        }
        Ok(())
    }

    fn cancel_pending_analysis(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.timers.cancel(pending.timer);
            log::debug!("pending analysis #{} discarded", pending.upload);
        }
    }

    fn on_analysis_due(&mut self, upload: u64) {
        match self.pending.take() {
            Some(pending) if pending.upload == upload => self.settle_analysis(pending.result),
            other => {
                self.pending = other;
                log::debug!("discarding stale analysis #{}", upload);
            }
        }
    }

    fn settle_analysis(&mut self, result: Result<Analysis>) {
        match result {
            Ok(analysis) => self.apply_analysis(analysis),
            Err(err) => self.fail_analysis(&err),
        }
    }

    fn apply_analysis(&mut self, analysis: Analysis) {
        for finding in &analysis.findings {
            self.emit(
                &finding.name,
                &finding.details,
                finding.severity,
                None,
                Emit {
                    overlay: false,
                    alert: false,
                },
            );
        }

        let count = analysis.findings.len();
        self.analyzing = false;
        self.processing_status = format!("분석 완료: {}개 항목 발견", count);
        if let Some(url) = analysis.annotated_image_url.clone() {
            self.preview = Preview::Remote { url };
        }

        if analysis.has_high_severity() {
            self.alerter.play_alert_sound();
            self.alerter.speak(SPEECH_HIGH_RISK_IMAGE, self.now);
        } else if count > 0 {
            self.alerter.speak(
                &format!("이미지 분석이 완료되어 {}개 항목이 발견되었습니다.", count),
                self.now,
            );
        } else {
            self.alerter.speak(SPEECH_NOTHING_FOUND, self.now);
        }
        log::info!("analysis complete: {} finding(s)", count);
        self.analysis = Some(analysis);
    }

    fn fail_analysis(&mut self, err: &anyhow::Error) {
        log::warn!("analysis failed: {:#}", err);
        self.analyzing = false;
        self.analysis = None;
        self.processing_status = format!("분석 실패: {}", err);
        self.alerter.speak(SPEECH_ANALYSIS_FAILED, self.now);
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn view(&self) -> View {
        self.view
    }

    pub fn tab(&self) -> Tab {
        self.tab
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn preview(&self) -> &Preview {
        &self.preview
    }

    pub fn preview_size(&self) -> PreviewSize {
        self.preview_size
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn camera_attached(&self) -> bool {
        self.stream.is_some()
    }

    pub fn connection_status(&self) -> &str {
        &self.connection_status
    }

    pub fn processing_status(&self) -> &str {
        &self.processing_status
    }

    pub fn alert_count(&self) -> u64 {
        self.alert_count
    }

    pub fn overlays(&self) -> impl Iterator<Item = &Overlay> {
        self.overlays.iter()
    }

    pub fn overlay_count(&self) -> usize {
        self.overlays.len()
    }

    pub fn live_results(&self) -> &RecentDetections {
        &self.live
    }

    pub fn history(&self) -> &RecentDetections {
        &self.history
    }

    pub fn stats(&self) -> DetectionStats {
        DetectionStats::from_detections(self.history.iter())
    }

    pub fn is_analyzing(&self) -> bool {
        self.analyzing
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        self.analysis.as_ref()
    }

    pub fn alerter(&self) -> &Alerter {
        &self.alerter
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot::capture(self)
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
        self.cancel_simulation();
    }
}
