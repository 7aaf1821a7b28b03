use std::path::PathBuf;

/// Runtime configuration, loaded from `ROLLCALL_*` environment variables.
///
/// Command-line flags are applied on top by `main`.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Requested capture size; the driver may negotiate another.
    pub frame_width: u32,
    pub frame_height: u32,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// TOML roster of expected students and their reference photos.
    pub roster_path: PathBuf,
    /// Where the daily `<YYYY-MM-DD>.csv` log is written.
    pub attendance_dir: PathBuf,
    /// Cosine similarity at or above which a face matches a student.
    pub similarity_threshold: f32,
    /// Matching frames needed before a student is marked present.
    pub consecutive_frames: u32,
    /// Unknown faces remembered before the announcement cache is cleared.
    pub unknown_cache_size: usize,
    /// Frames discarded after the stream starts (auto-exposure settling).
    pub warmup_frames: usize,
    /// Faces smaller than this (pixels, shorter side) are ignored.
    pub min_face_size: f32,
    /// Apply CLAHE to each frame before detection.
    pub enhance_contrast: bool,
    pub speech: SpeechConfig,
    /// Annotated copy of the latest frame, if set.
    pub preview_path: Option<PathBuf>,
    /// TTF/OTF font for overlay labels; without it only boxes are drawn.
    pub font_path: Option<PathBuf>,
    /// Stop after this many frames (0 = until interrupted).
    pub max_frames: u64,
}

#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub enabled: bool,
    /// espeak-ng compatible binary.
    pub program: String,
    pub voice: String,
    /// Words per minute.
    pub rate: u32,
    /// 0.0–2.0, 1.0 is the engine default.
    pub volume: f32,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            camera_device: std::env::var("ROLLCALL_CAMERA_DEVICE").unwrap_or_else(|_| "/dev/video0".to_string()),
            frame_width: env_parse("ROLLCALL_FRAME_WIDTH", 640),
            frame_height: env_parse("ROLLCALL_FRAME_HEIGHT", 480),
            model_dir: std::env::var("ROLLCALL_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| rollcall_core::default_model_dir()),
            roster_path: env_path("ROLLCALL_ROSTER").unwrap_or_else(|| PathBuf::from("roster.toml")),
            attendance_dir: env_path("ROLLCALL_ATTENDANCE_DIR").unwrap_or_else(|| PathBuf::from(".")),
            similarity_threshold: env_parse("ROLLCALL_SIMILARITY_THRESHOLD", 0.40),
            consecutive_frames: env_parse("ROLLCALL_CONSECUTIVE_FRAMES", 3),
            unknown_cache_size: env_parse("ROLLCALL_UNKNOWN_CACHE_SIZE", 10),
            warmup_frames: env_parse("ROLLCALL_WARMUP_FRAMES", 4),
            min_face_size: env_parse("ROLLCALL_MIN_FACE_SIZE", 40.0),
            enhance_contrast: env_flag("ROLLCALL_ENHANCE_CONTRAST", true),
            speech: SpeechConfig {
                enabled: env_flag("ROLLCALL_SPEECH", true),
                program: std::env::var("ROLLCALL_TTS_BIN").unwrap_or_else(|_| "espeak-ng".to_string()),
                voice: std::env::var("ROLLCALL_TTS_VOICE").unwrap_or_else(|_| "en".to_string()),
                rate: env_parse("ROLLCALL_TTS_RATE", 150),
                volume: env_parse("ROLLCALL_TTS_VOLUME", 0.9),
            },
            preview_path: env_path("ROLLCALL_PREVIEW"),
            font_path: env_path("ROLLCALL_FONT"),
            max_frames: env_parse("ROLLCALL_MAX_FRAMES", 0),
        }
    }

    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(rollcall_core::DETECTOR_MODEL_FILE)
    }

    pub fn recognizer_model_path(&self) -> PathBuf {
        self.model_dir.join(rollcall_core::RECOGNIZER_MODEL_FILE)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            default
        }),
        Err(_) => default,
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| !matches!(v.trim(), "0" | "false" | "no" | "off"))
        .unwrap_or(default)
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key).filter(|v| !v.is_empty()).map(PathBuf::from)
}
