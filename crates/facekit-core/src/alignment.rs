//! Landmark-based face alignment for the recognizer.
//!
//! Fits a 4-DOF similarity (uniform scale, rotation, translation) from the
//! five detected landmarks onto the InsightFace reference points and warps
//! the face into a 112x112 crop.

use image::{Rgb, RgbImage};

/// ArcFace reference landmarks in a 112x112 crop.
pub const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// `x' = a*x - b*y + tx`, `y' = b*x + a*y + ty`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Least-squares fit mapping `src` onto `dst`.
    ///
    /// Coincident source points leave scale and rotation undetermined; the
    /// fit then degrades to a pure translation between the centroids.
    fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
        let n = src.len() as f32;
        let centroid = |pts: &[(f32, f32); 5]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        let (scx, scy) = centroid(src);
        let (dcx, dcy) = centroid(dst);

        let (mut dot, mut cross, mut spread) = (0.0f32, 0.0f32, 0.0f32);
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst) {
            let (sx, sy) = (sx - scx, sy - scy);
            let (dx, dy) = (dx - dcx, dy - dcy);
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
            spread += sx * sx + sy * sy;
        }

        let (a, b) = if spread > f32::EPSILON {
            (dot / spread, cross / spread)
        } else {
            (1.0, 0.0)
        };
        Self {
            a,
            b,
            tx: dcx - (a * scx - b * scy),
            ty: dcy - (b * scx + a * scy),
        }
    }

    fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (self.a * x - self.b * y + self.tx, self.b * x + self.a * y + self.ty)
    }

    /// Inverse map, or `None` when the scale is zero.
    fn invert(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det < f32::EPSILON {
            return None;
        }
        let (a, b) = (self.a / det, -self.b / det);
        Some(Self {
            a,
            b,
            tx: -(a * self.tx - b * self.ty),
            ty: -(b * self.tx + a * self.ty),
        })
    }
}

/// Bilinear sample of `image` at a sub-pixel position; black outside.
fn sample_bilinear(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let (x0, y0) = (x.floor() as i64, y.floor() as i64);
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);

    let taps = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x0 + 1, y0, fx * (1.0 - fy)),
        (x0, y0 + 1, (1.0 - fx) * fy),
        (x0 + 1, y0 + 1, fx * fy),
    ];
    let mut acc = [0.0f32; 3];
    for (px, py, weight) in taps {
        if px < 0 || py < 0 || px >= w || py >= h {
            continue;
        }
        let pixel = image.get_pixel(px as u32, py as u32);
        for (sum, &v) in acc.iter_mut().zip(pixel.0.iter()) {
            *sum += v as f32 * weight;
        }
    }
    Rgb(acc.map(|v| v.round().clamp(0.0, 255.0) as u8))
}

/// Warp `image` so that `landmarks` land on [`REFERENCE_LANDMARKS_112`].
///
/// The result is always `ALIGNED_SIZE` square; regions that map outside
/// the source are black.
pub fn align_face(image: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let to_crop = Similarity::estimate(landmarks, &REFERENCE_LANDMARKS_112);
    let Some(to_source) = to_crop.invert() else {
        return RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
    };

    RgbImage::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |x, y| {
        let (sx, sy) = to_source.apply((x as f32, y as f32));
        sample_bilinear(image, sx, sy)
    })
}
