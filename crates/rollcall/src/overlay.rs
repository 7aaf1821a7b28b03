//! Annotated preview frames: a box per face, its label, and the status line.

use crate::desk::{FaceStatus, FrameReport};
use ab_glyph::{FontVec, PxScale};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use thiserror::Error;

const RECOGNIZED: Rgb<u8> = Rgb([0, 255, 0]);
const UNRECOGNIZED: Rgb<u8> = Rgb([255, 0, 0]);
const BANNER: Rgb<u8> = Rgb([0, 0, 255]);
const LABEL_SCALE: f32 = 24.0;
const BANNER_SCALE: f32 = 22.0;
const BOX_THICKNESS: i32 = 2;

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("failed to read font {path}: {source}")]
    FontRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0} is not a usable font")]
    FontInvalid(PathBuf),
    #[error("preview {path}: {source}")]
    Write {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("preview {path}: {source}")]
    Rename {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub struct Overlay {
    font: Option<FontVec>,
}

impl Overlay {
    pub fn new(font_path: Option<&Path>) -> Result<Self, OverlayError> {
        let font = match font_path {
            Some(path) => {
                let bytes = std::fs::read(path).map_err(|source| OverlayError::FontRead {
                    path: path.to_path_buf(),
                    source,
                })?;
                Some(FontVec::try_from_vec(bytes).map_err(|_| OverlayError::FontInvalid(path.to_path_buf()))?)
            }
            None => None,
        };
        Ok(Self { font })
    }

    /// Render a grayscale frame in color with the report drawn on top.
    pub fn render(&self, gray: &[u8], width: u32, height: u32, report: &FrameReport) -> RgbImage {
        let mut canvas = RgbImage::from_fn(width, height, |x, y| {
            let v = gray.get((y * width + x) as usize).copied().unwrap_or(0);
            Rgb([v, v, v])
        });

        for face in &report.faces {
            let color = match face.status {
                FaceStatus::Recognized => RECOGNIZED,
                FaceStatus::Unrecognized => UNRECOGNIZED,
            };
            let (left, top, right, bottom) = face.bbox.pixel_rect(width, height);
            for inset in 0..BOX_THICKNESS {
                let w = (right - left) as i32 - 2 * inset;
                let h = (bottom - top) as i32 - 2 * inset;
                if w > 0 && h > 0 {
                    let rect = Rect::at(left as i32 + inset, top as i32 + inset).of_size(w as u32, h as u32);
                    draw_hollow_rect_mut(&mut canvas, rect, color);
                }
            }
            if let Some(font) = &self.font {
                let y = (top as i32 - LABEL_SCALE as i32 - 4).max(0);
                draw_text_mut(&mut canvas, color, left as i32, y, PxScale::from(LABEL_SCALE), font, &face.label);
            }
        }

        if let (Some(font), Some(banner)) = (&self.font, &report.banner) {
            draw_text_mut(&mut canvas, BANNER, 10, 30, PxScale::from(BANNER_SCALE), font, banner);
        }

        canvas
    }
}

/// Keeps the latest annotated frame on disk for an external viewer.
pub struct PreviewSink {
    path: PathBuf,
    tmp: PathBuf,
    format: ImageFormat,
}

impl PreviewSink {
    /// The image format follows the file extension; unknown extensions get JPEG.
    pub fn new(path: PathBuf) -> Self {
        let format = ImageFormat::from_path(&path).unwrap_or(ImageFormat::Jpeg);
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        Self {
            path,
            tmp: PathBuf::from(tmp),
            format,
        }
    }

    /// Write to a sibling temp file and rename, so readers never see a torn image.
    pub fn publish(&self, image: &RgbImage) -> Result<(), OverlayError> {
        image
            .save_with_format(&self.tmp, self.format)
            .map_err(|source| OverlayError::Write {
                path: self.tmp.clone(),
                source,
            })?;
        std::fs::rename(&self.tmp, &self.path).map_err(|source| OverlayError::Rename {
            path: self.path.clone(),
            source,
        })
    }
}
