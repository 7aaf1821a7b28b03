//! rollcall-core — face detection, recognition and attendance bookkeeping.
//!
//! SCRFD finds faces and ArcFace embeds them, both through ONNX Runtime on
//! the CPU. The tracker, register and unknown-face cache hold the per-session
//! state that turns embeddings into attendance.

pub mod alignment;
pub mod detector;
pub mod recognizer;
pub mod register;
pub mod tracker;
pub mod types;
pub mod unknown;

use std::path::PathBuf;

pub use detector::{DetectorOptions, FaceDetector};
pub use recognizer::FaceRecognizer;
pub use register::{MarkOutcome, Register};
pub use tracker::{RecognitionTracker, Verdict};
pub use types::{BoundingBox, CosineMatcher, Embedding, GalleryEntry, GrayImage, MatchResult, Matcher};
pub use unknown::UnknownFaces;

/// File name of the SCRFD detection model inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// `$XDG_DATA_HOME/rollcall/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    let data_home = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        });
    data_home.join("rollcall").join("models")
}
