use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::{CosineMatcher, GrayImage, Matcher};
use rollcall_hw::Camera;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod announcer;
mod config;
mod desk;
mod ledger;
mod overlay;
mod pipeline;
mod roster;
mod session;

use config::Config;
use pipeline::{Embedder, FacePipeline};
use roster::Roster;

#[derive(Parser)]
#[command(name = "rollcall", version, about = "Camera attendance with face recognition and spoken roll call")]
struct Cli {
    /// V4L2 camera device
    #[arg(long, global = true)]
    camera: Option<String>,
    /// Roster TOML file
    #[arg(long, global = true)]
    roster: Option<PathBuf>,
    /// Directory holding det_10g.onnx and w600k_r50.onnx
    #[arg(long, global = true)]
    models: Option<PathBuf>,
    /// Cosine similarity needed for a match, in [-1, 1]
    #[arg(long, global = true, value_parser = parse_threshold)]
    threshold: Option<f32>,
    /// Directory for the daily CSV log
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,
    /// Keep the latest annotated frame at this path
    #[arg(long, global = true)]
    preview: Option<PathBuf>,
    /// Stop after this many frames
    #[arg(long, global = true)]
    max_frames: Option<u64>,
    /// Log announcements instead of speaking them
    #[arg(long, global = true)]
    no_speech: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take attendance from the camera until interrupted
    Run {
        /// Font for labels in the preview
        #[arg(long)]
        font: Option<PathBuf>,
        /// Matching frames needed before marking someone present
        #[arg(long)]
        frames: Option<u32>,
    },
    /// Enroll the roster photos and report what was found
    Roster {
        #[arg(long)]
        json: bool,
    },
    /// Identify the faces in a still image
    Check {
        image: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List video capture devices
    Devices,
}

#[derive(Serialize)]
struct RosterReport {
    name: String,
    photos: usize,
}

#[derive(Serialize)]
struct CheckReport {
    name: Option<String>,
    similarity: f32,
    bbox: rollcall_core::BoundingBox,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    cli.apply(&mut config);

    match cli.command {
        Commands::Run { font, frames } => {
            config.font_path = font.or(config.font_path);
            config.consecutive_frames = frames.unwrap_or(config.consecutive_frames);
            take_attendance(config).await
        }
        Commands::Roster { json } => enroll_roster(&config, json),
        Commands::Check { image, json } => check_image(&config, &image, json),
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No video capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
            Ok(())
        }
    }
}

impl Cli {
    /// Layer the command-line overrides on top of the environment.
    fn apply(&self, config: &mut Config) {
        if let Some(camera) = &self.camera {
            config.camera_device = camera.clone();
        }
        if let Some(roster) = &self.roster {
            config.roster_path = roster.clone();
        }
        if let Some(models) = &self.models {
            config.model_dir = models.clone();
        }
        if let Some(threshold) = self.threshold {
            config.similarity_threshold = threshold;
        }
        if let Some(dir) = &self.output_dir {
            config.attendance_dir = dir.clone();
        }
        if let Some(preview) = &self.preview {
            config.preview_path = Some(preview.clone());
        }
        if let Some(max_frames) = self.max_frames {
            config.max_frames = max_frames;
        }
        if self.no_speech {
            config.speech.enabled = false;
        }
    }
}

fn parse_threshold(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("{e}"))?;
    if (-1.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{s} is not a cosine similarity in [-1, 1]"))
    }
}

async fn take_attendance(config: Config) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    let mut done = session::spawn(config, stop.clone())?;

    let outcome = tokio::select! {
        outcome = &mut done => outcome,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("interrupted; finishing session");
            stop.store(true, Ordering::Relaxed);
            done.await
        }
    };
    let summary = outcome.map_err(|_| session::SessionError::ThreadLost)??;

    println!("Attendance log: {}", summary.log_path.display());
    println!(
        "{} frames ({} dark), {} faces seen",
        summary.frames, summary.dark_frames, summary.faces_seen
    );
    for attendee in &summary.present {
        println!("  present  {}  {}", attendee.arrived_at.as_deref().unwrap_or("-"), attendee.name);
    }
    for name in &summary.absent {
        println!("  absent   {name}");
    }
    Ok(())
}

fn enroll_roster(config: &Config, json: bool) -> Result<()> {
    let roster = Roster::load(&config.roster_path)
        .with_context(|| format!("loading {}", config.roster_path.display()))?;
    let mut pipeline = FacePipeline::load(config)?;
    let gallery = roster.enroll(&mut pipeline)?;

    let report: Vec<RosterReport> = gallery
        .names
        .iter()
        .enumerate()
        .map(|(identity, name)| RosterReport {
            name: name.clone(),
            photos: gallery.entries.iter().filter(|e| e.identity == identity).count(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for r in &report {
            println!("{}: {} photo(s) enrolled", r.name, r.photos);
        }
    }
    Ok(())
}

fn check_image(config: &Config, path: &std::path::Path, json: bool) -> Result<()> {
    let roster = Roster::load(&config.roster_path)
        .with_context(|| format!("loading {}", config.roster_path.display()))?;
    let mut pipeline = FacePipeline::load(config)?;
    let gallery = roster.enroll(&mut pipeline)?;

    let photo = image::open(path)
        .with_context(|| format!("opening {}", path.display()))?
        .to_luma8();
    let view = GrayImage::new(photo.as_raw(), photo.width(), photo.height())?;

    let report: Vec<CheckReport> = pipeline
        .faces(&view)?
        .into_iter()
        .map(|face| {
            let result = CosineMatcher.best_match(&face.embedding, &gallery.entries, config.similarity_threshold);
            CheckReport {
                name: result.identity.and_then(|i| gallery.name(i)).map(String::from),
                similarity: result.similarity,
                bbox: face.bbox,
            }
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.is_empty() {
        println!("No faces found in {}", path.display());
    } else {
        for r in &report {
            println!(
                "{:<24} similarity {:.3}  at ({:.0}, {:.0}) {:.0}x{:.0}",
                r.name.as_deref().unwrap_or(desk::UNKNOWN_LABEL),
                r.similarity,
                r.bbox.x,
                r.bbox.y,
                r.bbox.width,
                r.bbox.height
            );
        }
    }
    Ok(())
}
