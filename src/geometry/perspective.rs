use image::{Rgb, RgbImage};
use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use rayon::prelude::*;

use crate::foundation::core::{PixelShape, Point};
use crate::geometry::roi::Roi;

/// Fill color for pixels that map outside the source frame.
///
/// White, not black: the filters look for colored regions, and black
/// borders would read as spurious dark features at the frame edges.
const FILL: Rgb<u8> = Rgb([255, 255, 255]);

/// Condition estimate above which an estimated matrix is rejected as
/// numerically degenerate.
const MAX_CONDITION: f64 = 1e12;

/// Perspective transform between video space and design space.
///
/// Holds the forward 3×3 matrix (video → design) together with its
/// inverse. Estimated from a four-corner [`Roi`]; degenerate corner sets
/// yield no transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerspectiveTransform {
    forward: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl PerspectiveTransform {
    /// Estimate the transform mapping `roi` (relative coordinates over
    /// `from_shape`) onto the full canonical rectangle of `to_shape`.
    ///
    /// Corner correspondence is fixed: `BL→(0,h), TL→(0,0), TR→(w,0),
    /// BR→(w,h)`. Returns `None` for collinear or otherwise degenerate
    /// corners and for numerically ill-conditioned solutions.
    pub fn estimate(roi: &Roi, from_shape: PixelShape, to_shape: PixelShape) -> Option<Self> {
        let src = roi.corners().map(|c| c.to_pixels(from_shape));
        let w = f64::from(to_shape.width);
        let h = f64::from(to_shape.height);
        let dst = [
            Point::new(0.0, h),
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(w, h),
        ];

        let forward = solve_homography(&src, &dst)?;
        if !forward.iter().all(|v| v.is_finite()) {
            return None;
        }

        let inverse = forward.try_inverse()?;
        let condition = forward.norm() * inverse.norm();
        if !condition.is_finite() || condition > MAX_CONDITION {
            return None;
        }

        Some(Self { forward, inverse })
    }

    /// The same transform with forward and inverse directions swapped.
    pub fn invert(&self) -> Self {
        Self {
            forward: self.inverse,
            inverse: self.forward,
        }
    }

    /// Map a video-space point into design space.
    pub fn transform_point(&self, p: Point) -> Point {
        apply_homogeneous(&self.forward, p)
    }

    /// Map a design-space point back into video space.
    pub fn inverse_point(&self, p: Point) -> Point {
        apply_homogeneous(&self.inverse, p)
    }

    /// Warp a video frame into design space.
    ///
    /// Inverse-mapped bilinear warp: each target pixel samples the source
    /// at its preimage; pixels mapping outside the frame are filled
    /// white. Rows are processed in parallel.
    pub fn warp_image(&self, image: &RgbImage, target_shape: PixelShape) -> RgbImage {
        let width = target_shape.width;
        let height = target_shape.height;
        let stride = width as usize * 3;
        let mut data = vec![0u8; stride * height as usize];

        data.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
            for x in 0..width as usize {
                let src = apply_homogeneous(
                    &self.inverse,
                    Point::new(x as f64 + 0.5, y as f64 + 0.5),
                );
                let px = sample_bilinear(image, src.x - 0.5, src.y - 0.5);
                let off = x * 3;
                row[off..off + 3].copy_from_slice(&px.0);
            }
        });

        RgbImage::from_raw(width, height, data)
            .unwrap_or_else(|| RgbImage::from_pixel(width, height, FILL))
    }
}

/// Solve the 4-point direct linear transform with `h33` fixed to 1.
fn solve_homography(src: &[Point; 4], dst: &[Point; 4]) -> Option<Matrix3<f64>> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for i in 0..4 {
        let (x, y) = (src[i].x, src[i].y);
        let (u, v) = (dst[i].x, dst[i].y);

        let r = 2 * i;
        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -u * x;
        a[(r, 7)] = -u * y;
        b[r] = u;

        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -v * x;
        a[(r + 1, 7)] = -v * y;
        b[r + 1] = v;
    }

    let h = a.lu().solve(&b)?;
    Some(Matrix3::new(
        h[0], h[1], h[2], //
        h[3], h[4], h[5], //
        h[6], h[7], 1.0,
    ))
}

fn apply_homogeneous(m: &Matrix3<f64>, p: Point) -> Point {
    let v = m * Vector3::new(p.x, p.y, 1.0);
    Point::new(v.x / v.z, v.y / v.z)
}

fn sample_bilinear(image: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    let w = image.width() as i64;
    let h = image.height() as i64;

    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    if x0 < -1 || y0 < -1 || x0 >= w || y0 >= h {
        return FILL;
    }

    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let fetch = |px: i64, py: i64| -> [f64; 3] {
        if px < 0 || py < 0 || px >= w || py >= h {
            [255.0, 255.0, 255.0]
        } else {
            let p = image.get_pixel(px as u32, py as u32).0;
            [f64::from(p[0]), f64::from(p[1]), f64::from(p[2])]
        }
    };

    let p00 = fetch(x0, y0);
    let p10 = fetch(x0 + 1, y0);
    let p01 = fetch(x0, y0 + 1);
    let p11 = fetch(x0 + 1, y0 + 1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] * (1.0 - fx) + p10[c] * fx;
        let bottom = p01[c] * (1.0 - fx) + p11[c] * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

#[cfg(test)]
#[path = "../../tests/unit/geometry/perspective.rs"]
mod tests;
