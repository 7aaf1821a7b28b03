//! Face alignment via a 4-DOF similarity transform.
//!
//! Maps the five detected landmarks onto the InsightFace reference layout
//! and resamples the face into the 112×112 crop ArcFace expects.

use crate::types::GrayImage;

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: usize = 112;

/// `dst = [a -b; b a] * src + t`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Closed-form least-squares fit from `src` points to `dst` points.
    ///
    /// Returns `None` when the source points are all coincident.
    fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Option<Self> {
        let centroid = |pts: &[(f32, f32); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
            (sx / 5.0, sy / 5.0)
        };
        let (scx, scy) = centroid(src);
        let (dcx, dcy) = centroid(dst);

        let mut spread = 0.0f32;
        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            let (px, py) = (sx - scx, sy - scy);
            let (qx, qy) = (dx - dcx, dy - dcy);
            spread += px * px + py * py;
            dot += px * qx + py * qy;
            cross += px * qy - py * qx;
        }

        if spread < 1e-6 {
            return None;
        }

        let a = dot / spread;
        let b = cross / spread;
        Some(Self {
            a,
            b,
            tx: dcx - (a * scx - b * scy),
            ty: dcy - (b * scx + a * scy),
        })
    }

    fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let ia = self.a / det;
        let ib = -self.b / det;
        Some(Self {
            a: ia,
            b: ib,
            tx: -(ia * self.tx - ib * self.ty),
            ty: -(ib * self.tx + ia * self.ty),
        })
    }
}

fn sample_bilinear(image: &GrayImage<'_>, x: f32, y: f32) -> f32 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    image.get(x0, y0) as f32 * (1.0 - fx) * (1.0 - fy)
        + image.get(x0 + 1, y0) as f32 * fx * (1.0 - fy)
        + image.get(x0, y0 + 1) as f32 * (1.0 - fx) * fy
        + image.get(x0 + 1, y0 + 1) as f32 * fx * fy
}

fn warp(image: &GrayImage<'_>, to_crop: &Similarity, out_size: usize) -> Vec<u8> {
    let mut output = vec![0u8; out_size * out_size];
    let Some(to_source) = to_crop.inverse() else {
        return output;
    };

    for oy in 0..out_size {
        for ox in 0..out_size {
            let (sx, sy) = to_source.apply((ox as f32, oy as f32));
            output[oy * out_size + ox] = sample_bilinear(image, sx, sy).round().clamp(0.0, 255.0) as u8;
        }
    }
    output
}

/// Align a detected face to the canonical 112×112 crop.
///
/// Degenerate landmarks produce an all-black crop.
pub fn align_face(image: &GrayImage<'_>, landmarks: &[(f32, f32); 5]) -> Vec<u8> {
    match Similarity::estimate(landmarks, &REFERENCE_LANDMARKS_112) {
        Some(transform) => warp(image, &transform, ALIGNED_SIZE),
        None => vec![0u8; ALIGNED_SIZE * ALIGNED_SIZE],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32, tol: f32) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn test_identity_fit() {
        let t = Similarity::estimate(&REFERENCE_LANDMARKS_112, &REFERENCE_LANDMARKS_112).unwrap();
        assert!(approx(t.a, 1.0, 1e-4), "a = {}", t.a);
        assert!(approx(t.b, 0.0, 1e-4), "b = {}", t.b);
        assert!(approx(t.tx, 0.0, 1e-3), "tx = {}", t.tx);
        assert!(approx(t.ty, 0.0, 1e-3), "ty = {}", t.ty);
    }

    #[test]
    fn test_recovers_scale_rotation_translation() {
        let truth = Similarity {
            a: 0.5 * 30f32.to_radians().cos(),
            b: 0.5 * 30f32.to_radians().sin(),
            tx: 12.0,
            ty: -7.0,
        };
        let src: [(f32, f32); 5] = [
            (80.0, 60.0),
            (140.0, 58.0),
            (110.0, 95.0),
            (88.0, 130.0),
            (133.0, 129.0),
        ];
        let dst = src.map(|p| truth.apply(p));
        let fit = Similarity::estimate(&src, &dst).unwrap();
        assert!(approx(fit.a, truth.a, 1e-4));
        assert!(approx(fit.b, truth.b, 1e-4));
        assert!(approx(fit.tx, truth.tx, 1e-2));
        assert!(approx(fit.ty, truth.ty, 1e-2));
    }

    #[test]
    fn test_inverse_round_trips_a_point() {
        let t = Similarity { a: 0.8, b: -0.3, tx: 5.0, ty: 9.0 };
        let inv = t.inverse().unwrap();
        let (x, y) = inv.apply(t.apply((17.0, -4.0)));
        assert!(approx(x, 17.0, 1e-3) && approx(y, -4.0, 1e-3), "({x}, {y})");
    }

    #[test]
    fn test_coincident_landmarks_give_black_crop() {
        let frame = vec![200u8; 64 * 64];
        let image = GrayImage::new(&frame, 64, 64).unwrap();
        let crop = align_face(&image, &[(10.0, 10.0); 5]);
        assert_eq!(crop.len(), ALIGNED_SIZE * ALIGNED_SIZE);
        assert!(crop.iter().all(|&p| p == 0));
    }

    #[test]
    fn test_bright_eye_lands_on_reference_eye() {
        let (w, h) = (200usize, 200usize);
        let mut frame = vec![0u8; w * h];
        let landmarks: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];
        for y in 58..=62 {
            for x in 78..=82 {
                frame[y * w + x] = 255;
            }
        }

        let image = GrayImage::new(&frame, w as u32, h as u32).unwrap();
        let crop = align_face(&image, &landmarks);

        let rx = REFERENCE_LANDMARKS_112[0].0.round() as usize;
        let ry = REFERENCE_LANDMARKS_112[0].1.round() as usize;
        let peak = (ry - 1..=ry + 1)
            .flat_map(|y| (rx - 1..=rx + 1).map(move |x| (x, y)))
            .map(|(x, y)| crop[y * ALIGNED_SIZE + x])
            .max()
            .unwrap();
        assert!(peak > 100, "expected bright patch near ({rx}, {ry}), max={peak}");
    }
}
