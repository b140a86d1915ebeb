//! roadvision - headless road hazard dashboard
//!
//! Subcommands:
//! 1. `live`: opens the camera, runs the hazard simulation in real time and
//!    prints the dashboard whenever something changes
//! 2. `analyze`: submits one image to the selected upload source and prints
//!    the findings

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use roadvision::{
    Alerter, CannedSource, Dashboard, LogOutput, RoadVisionConfig, SimulatedSource,
    SourceCapability, SourceRegistry, StubCamera, UploadedImage, View,
};

#[path = "../ui.rs"]
mod ui;

/// Upper bound on one idle sleep of the live loop, so Ctrl-C stays responsive.
const MAX_IDLE: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Stage output: auto, plain or pretty.
    #[arg(long, value_enum, default_value_t = ui::UiMode::Auto, global = true)]
    ui: ui::UiMode,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the live camera session until the duration elapses or Ctrl-C.
    Live {
        /// Stop after this many seconds (runs until Ctrl-C when omitted).
        #[arg(long)]
        seconds: Option<u64>,
        /// Print snapshots as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Analyze one image file.
    Analyze {
        image: PathBuf,
        /// Upload source: mock or api.
        #[arg(long)]
        source: Option<String>,
        /// Base URL of the prediction API.
        #[arg(long)]
        base_url: Option<String>,
        /// Print the final snapshot as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = ui::Ui::new(args.ui);

    let mut cfg = {
        let _stage = ui.stage("Load configuration");
        RoadVisionConfig::load()?
    };

    match args.command {
        Command::Live { seconds, json } => run_live(&ui, &cfg, seconds, json),
        Command::Analyze {
            image,
            source,
            base_url,
            json,
        } => {
            if let Some(source) = source {
                cfg.upload.source = source.trim().to_ascii_lowercase();
            }
            if let Some(base_url) = base_url {
                cfg.upload.base_url = base_url.trim_end_matches('/').to_string();
            }
            run_analyze(&ui, &cfg, image, json)
        }
    }
}

fn build_dashboard(cfg: &RoadVisionConfig) -> Result<Dashboard> {
    let mut registry = SourceRegistry::new();
    registry.register(CannedSource::with_latency(cfg.upload.mock_delay));
    registry.register(SimulatedSource::new(cfg.simulation_settings())?);
    #[cfg(feature = "predict-api")]
    {
        match roadvision::PredictApiSource::new(cfg.predict_api_config()) {
            Ok(api) => registry.register(api),
            Err(err) => log::warn!("prediction API source unavailable: {:#}", err),
        }
    }
    registry.set_default(&cfg.upload.source)?;
    let upload_source = registry.source_for_capability(SourceCapability::ImageAnalysis)?;
    let live_source = registry.source_for_capability(SourceCapability::LiveFeed)?;
    log::info!(
        "upload source: {} (available: {})",
        cfg.upload.source,
        registry.list().join(", ")
    );

    let alerter = Alerter::new(Box::new(LogOutput), cfg.speech.clone());
    Ok(Dashboard::new(
        cfg.dashboard_settings(),
        live_source,
        upload_source,
        alerter,
    ))
}

fn run_live(ui: &ui::Ui, cfg: &RoadVisionConfig, seconds: Option<u64>, json: bool) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })
        .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))?;
    }

    let mut dashboard = build_dashboard(cfg)?;
    let mut camera = StubCamera::new(&cfg.camera.url)?;
    {
        let mut stage = ui.stage("Start camera");
        if let Err(err) = dashboard.start_camera(&mut camera) {
            if let Some(notice) = dashboard.take_notice() {
                eprintln!("{}", notice);
            }
            return Err(err);
        }
        stage.set_detail(cfg.camera.url.clone());
    }

    let limit = seconds.map(Duration::from_secs);
    let started = Instant::now();
    let mut last_seen = (u64::MAX, usize::MAX);
    log::info!("live session running (Ctrl-C to stop)");

    while running.load(Ordering::SeqCst) {
        let elapsed = started.elapsed();
        if limit.is_some_and(|limit| elapsed >= limit) {
            break;
        }
        dashboard.advance_to(elapsed);

        let seen = (dashboard.alert_count(), dashboard.overlay_count());
        if seen != last_seen {
            print_snapshot(&dashboard, json)?;
            last_seen = seen;
        }

        let mut wake = dashboard
            .next_deadline()
            .map(|deadline| deadline.saturating_sub(elapsed))
            .unwrap_or(MAX_IDLE)
            .min(MAX_IDLE);
        if let Some(limit) = limit {
            wake = wake.min(limit.saturating_sub(elapsed));
        }
        std::thread::sleep(wake);
    }

    dashboard.stop_camera();
    let stats = dashboard.stats();
    log::info!(
        "live session ended: {} detection(s) ({} high, {} medium, {} low)",
        stats.total,
        stats.high,
        stats.medium,
        stats.low
    );
    Ok(())
}

fn run_analyze(ui: &ui::Ui, cfg: &RoadVisionConfig, path: PathBuf, json: bool) -> Result<()> {
    let mut dashboard = build_dashboard(cfg)?;
    dashboard.switch_view(View::Upload);

    let image = {
        let mut stage = ui.stage("Read image");
        let image = UploadedImage::from_path(&path)?;
        stage.set_detail(format!("{}, {} bytes", image.mime_type(), image.len()));
        image
    };

    {
        let mut stage = ui.stage("Analyze image");
        let started = Instant::now();
        dashboard.upload(image)?;
        while dashboard.is_analyzing() {
            let Some(deadline) = dashboard.next_deadline() else {
                break;
            };
            std::thread::sleep(deadline.saturating_sub(started.elapsed()));
            dashboard.advance_to(deadline);
        }
        stage.set_detail(dashboard.processing_status().to_string());
    }

    print_snapshot(&dashboard, json)?;
    if dashboard.analysis().is_none() {
        return Err(anyhow!("{}", dashboard.processing_status()));
    }
    Ok(())
}

fn print_snapshot(dashboard: &Dashboard, json: bool) -> Result<()> {
    let snapshot = dashboard.snapshot();
    if json {
        println!("{}", serde_json::to_string(&snapshot)?);
    } else {
        print!("{}", snapshot.render_text());
    }
    Ok(())
}
