//! The capture loop.
//!
//! Everything that touches hardware or models is opened up front so a
//! misconfigured run fails before the first frame. The loop itself runs
//! on a dedicated OS thread and stops on request, after `max_frames`, or
//! when the camera stops delivering frames.

use crate::announcer::Announcer;
use crate::config::Config;
use crate::desk::{Desk, DeskSettings};
use crate::ledger::{Ledger, LedgerError};
use crate::overlay::{Overlay, OverlayError, PreviewSink};
use crate::pipeline::{Embedder, FacePipeline, PipelineError};
use crate::roster::{Roster, RosterError};
use rollcall_core::register::Attendee;
use rollcall_core::types::ImageSizeError;
use rollcall_core::{GrayImage, Register};
use rollcall_hw::{Camera, CameraError, Clahe};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Roster(#[from] RosterError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Overlay(#[from] OverlayError),
    #[error(transparent)]
    Frame(#[from] ImageSizeError),
    #[error("failed to start thread: {0}")]
    Thread(#[from] std::io::Error),
    #[error("session thread exited without a result")]
    ThreadLost,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub frames: u64,
    pub dark_frames: u64,
    pub faces_seen: u64,
    pub present: Vec<Attendee>,
    pub absent: Vec<String>,
    pub log_path: PathBuf,
}

/// Run a session on its own thread. Set `stop` to end it; the summary
/// arrives on the returned channel.
pub fn spawn(
    config: Config,
    stop: Arc<AtomicBool>,
) -> Result<oneshot::Receiver<Result<SessionSummary, SessionError>>, SessionError> {
    let (tx, rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("rollcall-session".into())
        .spawn(move || {
            let _ = tx.send(run(&config, &stop));
        })?;
    Ok(rx)
}

pub fn run(config: &Config, stop: &AtomicBool) -> Result<SessionSummary, SessionError> {
    let camera = Camera::open(&config.camera_device, config.frame_width, config.frame_height)?;
    tracing::info!(
        device = %camera.device_path,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera ready"
    );

    let mut pipeline = FacePipeline::load(config)?;
    let roster = Roster::load(&config.roster_path)?;
    let gallery = roster.enroll(&mut pipeline)?;
    tracing::info!(students = gallery.names.len(), photos = gallery.entries.len(), "roster enrolled");

    let today = chrono::Local::now().date_naive();
    let (ledger, earlier) = Ledger::open(&config.attendance_dir, today)?;
    let log_path = ledger.path().to_path_buf();
    let mut register = Register::new(gallery.names.iter().cloned());
    for entry in &earlier {
        if !register.restore(&entry.name, &entry.time) {
            tracing::warn!(name = %entry.name, "log lists a name that is not on the roster");
        }
    }

    let overlay = Overlay::new(config.font_path.as_deref())?;
    let preview = config.preview_path.clone().map(PreviewSink::new);

    let (announcer, voice_thread) = Announcer::from_config(&config.speech)?;
    let settings = DeskSettings {
        similarity_threshold: config.similarity_threshold,
        consecutive_frames: config.consecutive_frames,
        unknown_cache_size: config.unknown_cache_size,
    };
    let mut desk = Desk::new(gallery, register, &settings, ledger, announcer);

    let mut stream = camera.stream()?;
    if config.enhance_contrast {
        stream = stream.with_clahe(Clahe::default());
    }
    if config.warmup_frames > 0 {
        tracing::info!(count = config.warmup_frames, "discarding warmup frames");
        stream.discard(config.warmup_frames);
    }

    let mut frames = 0u64;
    let mut dark_frames = 0u64;
    let mut faces_seen = 0u64;
    tracing::info!("taking attendance; interrupt to finish");

    while !stop.load(Ordering::Relaxed) {
        if config.max_frames > 0 && frames >= config.max_frames {
            tracing::info!(frames, "frame limit reached");
            break;
        }

        let frame = match stream.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "camera stopped delivering frames");
                break;
            }
        };
        frames += 1;
        if frame.is_dark {
            dark_frames += 1;
            tracing::trace!(seq = frame.sequence, "dark frame skipped");
            continue;
        }

        let image = GrayImage::new(&frame.data, frame.width, frame.height)?;
        let faces = pipeline.faces(&image)?;
        faces_seen += faces.len() as u64;

        let time = chrono::Local::now().format("%H:%M:%S").to_string();
        let report = desk.process_frame(&faces, &time)?;
        for face in &report.faces {
            tracing::trace!(label = %face.label, similarity = face.similarity, "face");
        }
        tracing::trace!(
            seq = frame.sequence,
            faces = faces.len(),
            elapsed_ms = frame.timestamp.elapsed().as_millis() as u64,
            "frame processed"
        );

        if let Some(sink) = &preview {
            let annotated = overlay.render(&frame.data, frame.width, frame.height, &report);
            if let Err(e) = sink.publish(&annotated) {
                tracing::warn!(error = %e, "failed to update preview");
            }
        }
    }

    let register = desk.into_register();
    if voice_thread.join().is_err() {
        tracing::warn!("voice thread panicked");
    }

    let summary = SessionSummary {
        frames,
        dark_frames,
        faces_seen,
        present: register.present().into_iter().cloned().collect(),
        absent: register.absent().into_iter().map(String::from).collect(),
        log_path,
    };
    tracing::info!(
        frames,
        present = summary.present.len(),
        absent = summary.absent.len(),
        log = %summary.log_path.display(),
        "session finished"
    );
    Ok(summary)
}
