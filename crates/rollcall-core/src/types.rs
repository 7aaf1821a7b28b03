use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Integer pixel rectangle `(left, top, right, bottom)` clamped to the frame.
    pub fn pixel_rect(&self, frame_width: u32, frame_height: u32) -> (u32, u32, u32, u32) {
        let max_x = frame_width.saturating_sub(1) as f32;
        let max_y = frame_height.saturating_sub(1) as f32;
        let left = self.x.clamp(0.0, max_x);
        let top = self.y.clamp(0.0, max_y);
        let right = (self.x + self.width).clamp(0.0, max_x);
        let bottom = (self.y + self.height).clamp(0.0, max_y);
        (left as u32, top as u32, right as u32, bottom as u32)
    }

    /// Shorter side of the box in pixels.
    pub fn min_side(&self) -> f32 {
        self.width.min(self.height)
    }
}

#[derive(Error, Debug)]
#[error("image buffer too short: {width}x{height} needs {expected} bytes, got {actual}")]
pub struct ImageSizeError {
    pub width: u32,
    pub height: u32,
    pub expected: usize,
    pub actual: usize,
}

/// Borrowed 8-bit grayscale image.
#[derive(Debug, Clone, Copy)]
pub struct GrayImage<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
}

impl<'a> GrayImage<'a> {
    pub fn new(data: &'a [u8], width: u32, height: u32) -> Result<Self, ImageSizeError> {
        let expected = width as usize * height as usize;
        if data.len() < expected {
            return Err(ImageSizeError {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel value, or 0 outside the image.
    pub fn get(&self, x: i64, y: i64) -> u8 {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return 0;
        }
        self.data[y as usize * self.width as usize + x as usize]
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Cosine similarity in [-1, 1]. Zero vectors compare as 0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }

    /// L2 distance. For unit vectors this is `sqrt(2 - 2 * similarity)`.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// L2-normalized copy. A zero vector is returned unchanged.
    pub fn normalized(&self) -> Embedding {
        let norm: f32 = self.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            Embedding::new(self.values.iter().map(|v| v / norm).collect())
        } else {
            self.clone()
        }
    }

    /// Element-wise mean of several embeddings, L2-normalized.
    ///
    /// Returns `None` for an empty slice or mismatched dimensions.
    pub fn mean(samples: &[Embedding]) -> Option<Embedding> {
        let first = samples.first()?;
        let dim = first.values.len();
        if samples.iter().any(|s| s.values.len() != dim) {
            return None;
        }
        let mut acc = vec![0.0f32; dim];
        for sample in samples {
            for (slot, v) in acc.iter_mut().zip(&sample.values) {
                *slot += v;
            }
        }
        let n = samples.len() as f32;
        acc.iter_mut().for_each(|v| *v /= n);
        Some(Embedding::new(acc).normalized())
    }
}

/// One enrolled face: which roster identity it belongs to and its embedding.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub identity: usize,
    pub embedding: Embedding,
}

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub matched: bool,
    /// Cosine similarity of the best candidate [-1, 1].
    pub similarity: f32,
    /// Roster identity of the best candidate, set only when matched.
    pub identity: Option<usize>,
}

impl MatchResult {
    pub fn unmatched(similarity: f32) -> Self {
        Self {
            matched: false,
            similarity,
            identity: None,
        }
    }
}

/// Strategy for comparing a probe embedding against the enrolled gallery.
pub trait Matcher {
    fn best_match(&self, probe: &Embedding, gallery: &[GalleryEntry], threshold: f32) -> MatchResult;
}

/// Highest cosine similarity over the full gallery.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn best_match(&self, probe: &Embedding, gallery: &[GalleryEntry], threshold: f32) -> MatchResult {
        let best = gallery
            .iter()
            .map(|entry| (entry.identity, probe.similarity(&entry.embedding)))
            .fold(None, |best: Option<(usize, f32)>, (identity, sim)| match best {
                Some((_, best_sim)) if best_sim >= sim => best,
                _ => Some((identity, sim)),
            });

        match best {
            Some((identity, similarity)) if similarity >= threshold => MatchResult {
                matched: true,
                similarity,
                identity: Some(identity),
            },
            Some((_, similarity)) => MatchResult::unmatched(similarity),
            None => MatchResult::unmatched(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(identity: usize, values: &[f32]) -> GalleryEntry {
        GalleryEntry {
            identity,
            embedding: Embedding::new(values.to_vec()),
        }
    }

    #[test]
    fn test_similarity_identical_and_opposite() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        let b = Embedding::new(vec![-1.0, 0.0, 0.0]);
        assert!((a.similarity(&a) - 1.0).abs() < 1e-6);
        assert!((a.similarity(&b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_zero_vector() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_normalized_unit_length() {
        let e = Embedding::new(vec![3.0, 4.0]).normalized();
        assert!((e.values[0] - 0.6).abs() < 1e-6);
        assert!((e.values[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_tracks_similarity() {
        let a = Embedding::new(vec![3.0, 0.0]);
        let b = Embedding::new(vec![0.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
        assert_eq!(a.euclidean_distance(&a), 0.0);

        let (u, v) = (a.normalized(), b.normalized());
        let expected = (2.0 - 2.0 * u.similarity(&v)).sqrt();
        assert!((u.euclidean_distance(&v) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_mean_renormalizes() {
        let m = Embedding::mean(&[
            Embedding::new(vec![1.0, 0.0]),
            Embedding::new(vec![0.0, 1.0]),
        ])
        .unwrap();
        let half = std::f32::consts::FRAC_1_SQRT_2;
        assert!((m.values[0] - half).abs() < 1e-6);
        assert!((m.values[1] - half).abs() < 1e-6);
    }

    #[test]
    fn test_mean_rejects_empty_and_mismatched() {
        assert!(Embedding::mean(&[]).is_none());
        assert!(Embedding::mean(&[
            Embedding::new(vec![1.0]),
            Embedding::new(vec![1.0, 0.0]),
        ])
        .is_none());
    }

    #[test]
    fn test_matcher_picks_best_identity() {
        let gallery = vec![
            entry(0, &[0.0, 1.0, 0.0]),
            entry(1, &[0.0, 0.0, 1.0]),
            entry(2, &[0.9, 0.1, 0.0]),
        ];
        let probe = Embedding::new(vec![1.0, 0.0, 0.0]);
        let result = CosineMatcher.best_match(&probe, &gallery, 0.5);
        assert!(result.matched);
        assert_eq!(result.identity, Some(2));
    }

    #[test]
    fn test_matcher_below_threshold_keeps_similarity() {
        let gallery = vec![entry(0, &[1.0, 1.0])];
        let probe = Embedding::new(vec![1.0, 0.0]);
        let result = CosineMatcher.best_match(&probe, &gallery, 0.9);
        assert!(!result.matched);
        assert_eq!(result.identity, None);
        assert!((result.similarity - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
    }

    #[test]
    fn test_matcher_threshold_is_inclusive() {
        let gallery = vec![entry(4, &[1.0, 0.0])];
        let probe = Embedding::new(vec![1.0, 0.0]);
        assert!(CosineMatcher.best_match(&probe, &gallery, 1.0).matched);
    }

    #[test]
    fn test_matcher_empty_gallery() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let result = CosineMatcher.best_match(&probe, &[], 0.5);
        assert!(!result.matched);
        assert_eq!(result.similarity, 0.0);
    }

    #[test]
    fn test_gray_image_rejects_short_buffer() {
        let data = vec![0u8; 10];
        assert!(GrayImage::new(&data, 4, 4).is_err());
        let img = GrayImage::new(&data, 5, 2).unwrap();
        assert_eq!(img.get(-1, 0), 0);
        assert_eq!(img.get(5, 0), 0);
    }

    #[test]
    fn test_pixel_rect_clamps() {
        let b = BoundingBox {
            x: -10.0,
            y: 5.0,
            width: 50.0,
            height: 500.0,
            confidence: 0.9,
            landmarks: None,
        };
        assert_eq!(b.pixel_rect(100, 100), (0, 5, 40, 99));
    }
}
