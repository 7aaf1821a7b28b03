//! Grayscale frames and the conditioning applied to them: pixel-format
//! conversion, dark-frame rejection and CLAHE.

use thiserror::Error;

/// A captured 8-bit grayscale frame.
#[derive(Clone)]
pub struct Frame {
    /// Row-major pixels, `width * height` bytes.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// When the buffer was dequeued.
    pub timestamp: std::time::Instant,
    pub sequence: u32,
    pub is_dark: bool,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("{format:?} buffer too short: expected {expected} bytes, got {actual}")]
    ShortBuffer {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
}

/// Pixel layouts the camera layer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed, luma at every even byte.
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Grey => 1,
            PixelFormat::Yuyv | PixelFormat::Y16 => 2,
        }
    }

    /// Convert a raw driver buffer to 8-bit grayscale.
    pub fn to_grayscale(self, buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
        let pixels = width as usize * height as usize;
        let expected = pixels * self.bytes_per_pixel();
        if buf.len() < expected {
            return Err(FrameError::ShortBuffer {
                format: self,
                expected,
                actual: buf.len(),
            });
        }
        let raw = &buf[..expected];

        Ok(match self {
            PixelFormat::Grey => raw.to_vec(),
            PixelFormat::Yuyv => raw.iter().step_by(2).copied().collect(),
            // high byte of each little-endian sample
            PixelFormat::Y16 => raw.chunks_exact(2).map(|px| px[1]).collect(),
        })
    }
}

/// True when more than `threshold_pct` of pixels are below 32.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark = gray.iter().filter(|&&p| p < 32).count();
    (dark as f32 / gray.len() as f32) > threshold_pct
}

/// Contrast-limited adaptive histogram equalization on a square tile grid.
#[derive(Debug, Clone, Copy)]
pub struct Clahe {
    pub tiles: u32,
    /// Per-bin cap as a fraction of the tile's pixel count.
    pub clip_limit: f32,
}

impl Default for Clahe {
    fn default() -> Self {
        Self {
            tiles: 8,
            clip_limit: 0.02,
        }
    }
}

impl Clahe {
    /// Equalize `gray` in place. Images smaller than the grid are left alone.
    pub fn apply(&self, gray: &mut [u8], width: u32, height: u32) {
        let (w, h) = (width as usize, height as usize);
        let n = self.tiles.max(1) as usize;
        if w == 0 || h == 0 || gray.len() < w * h {
            return;
        }
        let (tile_w, tile_h) = (w / n, h / n);
        if tile_w == 0 || tile_h == 0 {
            return;
        }

        let luts: Vec<[u8; 256]> = (0..n * n)
            .map(|t| {
                let (row, col) = (t / n, t % n);
                let mut hist = [0u32; 256];
                for y in row * tile_h..(row + 1) * tile_h {
                    for &p in &gray[y * w + col * tile_w..y * w + (col + 1) * tile_w] {
                        hist[p as usize] += 1;
                    }
                }
                self.tile_lut(hist, (tile_w * tile_h) as u32)
            })
            .collect();

        // Blend the four nearest tile mappings by distance to tile centers.
        let last = (n - 1) as f32;
        for y in 0..h {
            let fy = (y as f32 / tile_h as f32 - 0.5).clamp(0.0, last);
            let (r0, dy) = (fy as usize, fy.fract());
            let r1 = (r0 + 1).min(n - 1);
            for x in 0..w {
                let fx = (x as f32 / tile_w as f32 - 0.5).clamp(0.0, last);
                let (c0, dx) = (fx as usize, fx.fract());
                let c1 = (c0 + 1).min(n - 1);

                let p = gray[y * w + x] as usize;
                let at = |r: usize, c: usize| luts[r * n + c][p] as f32;
                let top = at(r0, c0) * (1.0 - dx) + at(r0, c1) * dx;
                let bottom = at(r1, c0) * (1.0 - dx) + at(r1, c1) * dx;
                gray[y * w + x] = (top * (1.0 - dy) + bottom * dy).round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    /// Clip the histogram, spread the excess evenly and build the mapping.
    fn tile_lut(&self, mut hist: [u32; 256], total: u32) -> [u8; 256] {
        let clip = ((self.clip_limit * total as f32) as u32).max(1);
        let excess: u32 = hist.iter().map(|&b| b.saturating_sub(clip)).sum();
        let (share, remainder) = (excess / 256, (excess % 256) as usize);
        for (i, bin) in hist.iter_mut().enumerate() {
            *bin = (*bin).min(clip) + share + u32::from(i < remainder);
        }

        let mut lut = [0u8; 256];
        let mut cumulative = 0u32;
        let first = hist.iter().copied().find(|&b| b > 0).unwrap_or(0);
        let span = total.saturating_sub(first) as f32;
        for (i, &bin) in hist.iter().enumerate() {
            cumulative += bin;
            lut[i] = if span > 0.0 {
                (cumulative.saturating_sub(first) as f32 / span * 255.0).round().clamp(0.0, 255.0) as u8
            } else {
                i as u8
            };
        }
        lut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stddev(data: &[u8]) -> f32 {
        let n = data.len() as f32;
        let mean = data.iter().map(|&b| b as f32).sum::<f32>() / n;
        (data.iter().map(|&b| (b as f32 - mean).powi(2)).sum::<f32>() / n).sqrt()
    }

    #[test]
    fn test_yuyv_takes_luma() {
        let gray = PixelFormat::Yuyv.to_grayscale(&[100, 128, 200, 128], 2, 1).unwrap();
        assert_eq!(gray, vec![100, 200]);
    }

    #[test]
    fn test_y16_keeps_high_byte() {
        let gray = PixelFormat::Y16.to_grayscale(&[0xff, 0x12, 0x00, 0xab], 2, 1).unwrap();
        assert_eq!(gray, vec![0x12, 0xab]);
    }

    #[test]
    fn test_grey_truncates_padding() {
        let gray = PixelFormat::Grey.to_grayscale(&[1, 2, 3, 4, 99, 99], 2, 2).unwrap();
        assert_eq!(gray, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_short_buffer_rejected() {
        let err = PixelFormat::Yuyv.to_grayscale(&[1, 2], 2, 1).unwrap_err();
        assert!(matches!(err, FrameError::ShortBuffer { expected: 4, actual: 2, .. }));
    }

    #[test]
    fn test_dark_frame_threshold() {
        assert!(is_dark_frame(&[], 0.95));
        assert!(is_dark_frame(&vec![0u8; 100], 0.95));
        assert!(!is_dark_frame(&vec![128u8; 100], 0.95));

        let mut mostly = vec![10u8; 960];
        mostly.extend(vec![128u8; 40]);
        assert!(is_dark_frame(&mostly, 0.95));

        let mut borderline = vec![10u8; 940];
        borderline.extend(vec![128u8; 60]);
        assert!(!is_dark_frame(&borderline, 0.95));
    }

    #[test]
    fn test_clahe_stretches_low_contrast() {
        let (w, h) = (16u32, 16u32);
        let mut gray: Vec<u8> = (0..(w * h) as usize).map(|i| 100 + (i % 11) as u8).collect();
        let before = stddev(&gray);
        Clahe { tiles: 2, clip_limit: 0.02 }.apply(&mut gray, w, h);
        let after = stddev(&gray);
        assert!(after > before, "before={before:.2} after={after:.2}");
    }

    #[test]
    fn test_clahe_ignores_tiny_image() {
        let mut gray = vec![7u8; 4];
        Clahe::default().apply(&mut gray, 2, 2);
        assert_eq!(gray, vec![7u8; 4]);
    }
}
