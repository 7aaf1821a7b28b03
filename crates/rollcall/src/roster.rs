//! The class roster: who is expected and what they look like.
//!
//! ```toml
//! [[students]]
//! name = "Ada Lovelace"
//! photos = ["photos/ada.jpg", "photos/ada-glasses.jpg"]
//! ```
//!
//! Relative photo paths are resolved against the roster file's directory.

use crate::pipeline::{Embedder, PipelineError};
use rollcall_core::{Embedding, GalleryEntry, GrayImage};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("failed to read roster {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid roster TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid roster: {0}")]
    Invalid(String),
    #[error("failed to load photo {path}: {source}")]
    Photo {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("no face found in {0}")]
    NoFace(PathBuf),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Student {
    pub name: String,
    pub photos: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RosterFile {
    #[serde(default)]
    students: Vec<Student>,
}

#[derive(Debug, Clone)]
pub struct Roster {
    pub students: Vec<Student>,
}

impl Roster {
    pub fn load(path: &Path) -> Result<Self, RosterError> {
        let text = std::fs::read_to_string(path).map_err(|source| RosterError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&text, base)
    }

    pub fn parse(text: &str, base_dir: &Path) -> Result<Self, RosterError> {
        let file: RosterFile = toml::from_str(text)?;
        if file.students.is_empty() {
            return Err(RosterError::Invalid("no students listed".into()));
        }

        let mut seen = HashSet::new();
        let mut students = Vec::with_capacity(file.students.len());
        for mut student in file.students {
            student.name = student.name.trim().to_string();
            if student.name.is_empty() {
                return Err(RosterError::Invalid("student with an empty name".into()));
            }
            if !seen.insert(student.name.clone()) {
                return Err(RosterError::Invalid(format!("duplicate student {:?}", student.name)));
            }
            if student.photos.is_empty() {
                return Err(RosterError::Invalid(format!("{:?} has no photos", student.name)));
            }
            student.photos = student
                .photos
                .into_iter()
                .map(|p| if p.is_relative() { base_dir.join(p) } else { p })
                .collect();
            students.push(student);
        }

        Ok(Self { students })
    }

    /// Embed every reference photo. Any photo without a face aborts enrollment.
    pub fn enroll<E: Embedder>(&self, embedder: &mut E) -> Result<Gallery, RosterError> {
        let mut entries = Vec::new();
        for (identity, student) in self.students.iter().enumerate() {
            for photo in &student.photos {
                let embedding = embed_photo(embedder, photo)?;
                tracing::info!(student = %student.name, photo = %photo.display(), "enrolled photo");
                entries.push(GalleryEntry { identity, embedding });
            }
        }
        Ok(Gallery {
            names: self.students.iter().map(|s| s.name.clone()).collect(),
            entries,
        })
    }
}

/// Embedding of the most confident face in `path`, averaged with the same
/// face seen in the mirrored photo when the detector finds it there.
fn embed_photo<E: Embedder>(embedder: &mut E, path: &Path) -> Result<Embedding, RosterError> {
    let photo = image::open(path)
        .map_err(|source| RosterError::Photo {
            path: path.to_path_buf(),
            source,
        })?
        .to_luma8();
    let mirrored = image::imageops::flip_horizontal(&photo);

    let mut samples = Vec::with_capacity(2);
    for pixels in [&photo, &mirrored] {
        let view = GrayImage::new(pixels.as_raw(), pixels.width(), pixels.height())
            .map_err(|e| RosterError::Invalid(format!("{}: {e}", path.display())))?;
        if let Some(face) = embedder.faces(&view)?.into_iter().next() {
            samples.push(face.embedding);
        } else if samples.is_empty() {
            return Err(RosterError::NoFace(path.to_path_buf()));
        }
    }

    Embedding::mean(&samples).ok_or_else(|| RosterError::NoFace(path.to_path_buf()))
}

/// Enrolled roster: display names indexed by identity plus all embeddings.
#[derive(Debug, Clone)]
pub struct Gallery {
    pub names: Vec<String>,
    pub entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn name(&self, identity: usize) -> Option<&str> {
        self.names.get(identity).map(String::as_str)
    }
}
