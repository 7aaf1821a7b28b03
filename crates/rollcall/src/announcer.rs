//! Spoken feedback. Speech runs on its own thread so the capture loop never
//! waits for a sentence to finish.

use crate::config::SpeechConfig;
use std::io::ErrorKind;
use std::process::{Command, Stdio};
use tokio::sync::mpsc;

const QUEUE_DEPTH: usize = 8;

/// A speech synthesizer that blocks until `text` has been spoken.
pub trait Speak: Send + 'static {
    fn speak(&mut self, text: &str);
}

/// Drives an espeak-ng compatible command-line synthesizer.
///
/// If the program cannot be started it falls back to logging.
pub struct EspeakVoice {
    program: String,
    voice: String,
    rate: u32,
    amplitude: u32,
    available: bool,
}

impl EspeakVoice {
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            program: config.program.clone(),
            voice: config.voice.clone(),
            rate: config.rate,
            amplitude: (config.volume.clamp(0.0, 2.0) * 100.0).round() as u32,
            available: true,
        }
    }

    fn args(&self, text: &str) -> Vec<String> {
        vec![
            "-v".into(),
            self.voice.clone(),
            "-s".into(),
            self.rate.to_string(),
            "-a".into(),
            self.amplitude.to_string(),
            "--".into(),
            text.into(),
        ]
    }
}

impl Speak for EspeakVoice {
    fn speak(&mut self, text: &str) {
        if !self.available {
            tracing::info!(text, "announce");
            return;
        }
        let status = Command::new(&self.program)
            .args(self.args(text))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(s) if s.success() => tracing::debug!(text, "spoken"),
            Ok(s) => tracing::warn!(text, status = %s, "speech synthesizer failed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(program = %self.program, "speech synthesizer not installed; announcements will be logged only");
                self.available = false;
                tracing::info!(text, "announce");
            }
            Err(e) => tracing::warn!(text, error = %e, "failed to run speech synthesizer"),
        }
    }
}

/// Logs announcements instead of speaking them.
pub struct SilentVoice;

impl Speak for SilentVoice {
    fn speak(&mut self, text: &str) {
        tracing::info!(text, "announce");
    }
}

/// Queue of phrases waiting to be spoken.
pub trait Announce {
    fn announce(&self, text: String);
}

/// Handle to the speech thread. Dropping every handle ends the thread
/// once the queue is drained.
#[derive(Clone)]
pub struct Announcer {
    tx: mpsc::Sender<String>,
}

impl Announcer {
    pub fn spawn<S: Speak>(mut voice: S) -> std::io::Result<(Self, std::thread::JoinHandle<()>)> {
        let (tx, mut rx) = mpsc::channel::<String>(QUEUE_DEPTH);
        let handle = std::thread::Builder::new()
            .name("rollcall-voice".into())
            .spawn(move || {
                while let Some(text) = rx.blocking_recv() {
                    voice.speak(&text);
                }
                tracing::debug!("voice thread exiting");
            })?;
        Ok((Self { tx }, handle))
    }

    pub fn from_config(config: &SpeechConfig) -> std::io::Result<(Self, std::thread::JoinHandle<()>)> {
        if config.enabled {
            Self::spawn(EspeakVoice::new(config))
        } else {
            Self::spawn(SilentVoice)
        }
    }
}

impl Announce for Announcer {
    fn announce(&self, text: String) {
        match self.tx.try_send(text) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(text)) => {
                tracing::warn!(text, "speech queue full; dropping announcement");
            }
            Err(mpsc::error::TrySendError::Closed(text)) => {
                tracing::warn!(text, "voice thread gone; dropping announcement");
            }
        }
    }
}
