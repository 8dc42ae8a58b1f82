use crate::foundation::error::{GaugeError, GaugeResult};

pub use kurbo::{Point, Rect, Vec2};

/// Absolute 0-based frame index in video timeline space.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32, // must be > 0
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> GaugeResult<Self> {
        if den == 0 {
            return Err(GaugeError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(GaugeError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }

    /// Convert frame count to seconds.
    pub fn frames_to_secs(self, frames: u64) -> f64 {
        (frames as f64) * self.frame_duration_secs()
    }

    /// Convert seconds to frame count using floor semantics.
    pub fn secs_to_frames_floor(self, secs: f64) -> u64 {
        (secs * self.as_f64()).floor().max(0.0) as u64
    }
}

/// Pixel dimensions of a frame or render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PixelShape {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelShape {
    /// Create a validated non-degenerate shape.
    pub fn new(width: u32, height: u32) -> GaugeResult<Self> {
        if width == 0 || height == 0 {
            return Err(GaugeError::validation("PixelShape must be non-zero"));
        }
        Ok(Self { width, height })
    }

    /// Total pixel count.
    pub fn area(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// A point in relative `[0,1]²` coordinates.
///
/// Relative coordinates locate the design within a video frame
/// independently of the frame's pixel dimensions; `x` grows rightward and
/// `y` grows downward, matching raster order.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RelPoint {
    /// Horizontal coordinate, 0 at the left edge, 1 at the right.
    pub x: f64,
    /// Vertical coordinate, 0 at the top edge, 1 at the bottom.
    pub y: f64,
}

impl RelPoint {
    /// Construct a relative point. Values outside `[0,1]` are permitted
    /// (a Roi corner may sit slightly outside the frame) but must be
    /// finite.
    pub fn new(x: f64, y: f64) -> GaugeResult<Self> {
        if !x.is_finite() || !y.is_finite() {
            return Err(GaugeError::validation("RelPoint coordinates must be finite"));
        }
        Ok(Self { x, y })
    }

    /// Scale into absolute pixel coordinates for `shape`.
    pub fn to_pixels(self, shape: PixelShape) -> Point {
        Point::new(self.x * f64::from(shape.width), self.y * f64::from(shape.height))
    }

    /// Scale absolute pixel coordinates down into relative coordinates.
    pub fn from_pixels(p: Point, shape: PixelShape) -> Self {
        Self {
            x: p.x / f64::from(shape.width),
            y: p.y / f64::from(shape.height),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
