//! Per-face attendance decisions.
//!
//! Each embedded face is matched against the gallery, debounced, and, once
//! confirmed, marked present, written to the log and announced once.

use crate::announcer::Announce;
use crate::ledger::{AttendanceLog, LedgerError};
use crate::pipeline::FaceSample;
use crate::roster::Gallery;
use rollcall_core::{
    BoundingBox, CosineMatcher, MarkOutcome, Matcher, RecognitionTracker, Register, UnknownFaces, Verdict,
};

pub const UNKNOWN_LABEL: &str = "Unknown";
pub const NOT_RECOGNIZED: &str = "Face not recognized";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceStatus {
    /// Confirmed roster member.
    Recognized,
    /// Unmatched, or matched but not yet confirmed.
    Unrecognized,
}

#[derive(Debug, Clone)]
pub struct FaceAnnotation {
    pub bbox: BoundingBox,
    pub label: String,
    pub status: FaceStatus,
    pub similarity: f32,
}

/// What one frame produced: a box per face and the status line of the last one.
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    pub faces: Vec<FaceAnnotation>,
    pub banner: Option<String>,
}

pub struct DeskSettings {
    pub similarity_threshold: f32,
    pub consecutive_frames: u32,
    pub unknown_cache_size: usize,
}

pub struct Desk<L, A> {
    gallery: Gallery,
    register: Register,
    tracker: RecognitionTracker,
    unknown: UnknownFaces,
    threshold: f32,
    log: L,
    announcer: A,
}

impl<L: AttendanceLog, A: Announce> Desk<L, A> {
    pub fn new(gallery: Gallery, register: Register, settings: &DeskSettings, log: L, announcer: A) -> Self {
        Self {
            tracker: RecognitionTracker::new(settings.consecutive_frames),
            unknown: UnknownFaces::new(settings.unknown_cache_size, settings.similarity_threshold),
            threshold: settings.similarity_threshold,
            gallery,
            register,
            log,
            announcer,
        }
    }

    /// Handle every face of one frame. `time` is the wall clock as `HH:MM:SS`.
    pub fn process_frame(&mut self, faces: &[FaceSample], time: &str) -> Result<FrameReport, LedgerError> {
        let mut report = FrameReport::default();
        for face in faces {
            let (annotation, banner) = self.process_face(face, time)?;
            report.faces.push(annotation);
            report.banner = Some(banner);
        }
        self.unknown.end_frame();
        Ok(report)
    }

    fn process_face(&mut self, face: &FaceSample, time: &str) -> Result<(FaceAnnotation, String), LedgerError> {
        let result = CosineMatcher.best_match(&face.embedding, &self.gallery.entries, self.threshold);
        let verdict = match result.identity {
            Some(identity) => self.tracker.observe_match(identity),
            None => self.tracker.observe_unmatched(),
        };

        let unrecognized = |bbox: &BoundingBox| FaceAnnotation {
            bbox: bbox.clone(),
            label: UNKNOWN_LABEL.to_string(),
            status: FaceStatus::Unrecognized,
            similarity: result.similarity,
        };

        match verdict {
            Verdict::Confirmed { identity, hits } => {
                let name = self.gallery.name(identity).unwrap_or(UNKNOWN_LABEL).to_string();
                let banner = match self.register.check(&name) {
                    MarkOutcome::NewlyPresent => {
                        self.log.record(&name, time)?;
                        self.register.mark_present(&name, time);
                        tracing::info!(student = %name, time, hits, similarity = result.similarity, "marked present");
                        let text = format!("{name} Present");
                        self.announcer.announce(text.clone());
                        text
                    }
                    MarkOutcome::AlreadyPresent | MarkOutcome::NotOnRoster => format!("{name} marked present"),
                };
                let annotation = FaceAnnotation {
                    bbox: face.bbox.clone(),
                    label: name,
                    status: FaceStatus::Recognized,
                    similarity: result.similarity,
                };
                Ok((annotation, banner))
            }
            Verdict::Pending { identity, hits } => {
                tracing::debug!(identity, hits, similarity = result.similarity, "match pending confirmation");
                Ok((unrecognized(&face.bbox), NOT_RECOGNIZED.to_string()))
            }
            Verdict::Unknown => {
                if self.unknown.should_announce(&face.embedding) {
                    tracing::info!(similarity = result.similarity, "unrecognized face");
                    self.announcer.announce(NOT_RECOGNIZED.to_string());
                }
                Ok((unrecognized(&face.bbox), NOT_RECOGNIZED.to_string()))
            }
        }
    }

    /// Finish the session, releasing the log and the announcer.
    pub fn into_register(self) -> Register {
        self.register
    }
}
