use image::{GrayImage, Rgb, RgbImage};

use crate::filter::morphology;
use crate::foundation::error::{GaugeError, GaugeResult};

/// Upper bound (exclusive) of the 8-bit hue axis.
///
/// Hue is stored halved so a full turn fits a byte: `0..=179` covers
/// 0°..358°.
pub const HUE_MOD: i32 = 180;

/// A color in 8-bit HSV: `h ∈ [0,179]`, `s, v ∈ [0,255]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HsvColor {
    /// Hue, in halved degrees.
    pub h: u8,
    /// Saturation.
    pub s: u8,
    /// Value.
    pub v: u8,
}

impl HsvColor {
    /// Convert from 8-bit RGB.
    pub fn from_rgb(rgb: Rgb<u8>) -> Self {
        let r = f64::from(rgb.0[0]) / 255.0;
        let g = f64::from(rgb.0[1]) / 255.0;
        let b = f64::from(rgb.0[2]) / 255.0;

        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let hue_deg = if delta == 0.0 {
            0.0
        } else if max == r {
            60.0 * (((g - b) / delta).rem_euclid(6.0))
        } else if max == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };

        let s = if max == 0.0 { 0.0 } else { delta / max };

        Self {
            h: ((hue_deg / 2.0).round() as i32).rem_euclid(HUE_MOD) as u8,
            s: (s * 255.0).round() as u8,
            v: (max * 255.0).round() as u8,
        }
    }

    /// Convert to 8-bit RGB.
    pub fn to_rgb(self) -> Rgb<u8> {
        let h = f64::from(self.h) * 2.0;
        let s = f64::from(self.s) / 255.0;
        let v = f64::from(self.v) / 255.0;

        let c = v * s;
        let x = c * (1.0 - ((h / 60.0).rem_euclid(2.0) - 1.0).abs());
        let m = v - c;

        let (r1, g1, b1) = match h as u32 / 60 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };

        Rgb([
            ((r1 + m) * 255.0).round() as u8,
            ((g1 + m) * 255.0).round() as u8,
            ((b1 + m) * 255.0).round() as u8,
        ])
    }
}

/// Symmetric per-channel half-widths around a filter's center color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HsvWindow {
    /// Hue half-width, in halved degrees.
    pub h: u8,
    /// Saturation half-width.
    pub s: u8,
    /// Value half-width.
    pub v: u8,
}

impl Default for HsvWindow {
    fn default() -> Self {
        Self { h: 10, s: 75, v: 75 }
    }
}

/// HSV range filter bound to one mask.
///
/// State is a center color plus a symmetric per-channel window. The hue
/// test wraps at [`HUE_MOD`]: a window crossing the boundary splits into
/// two disjoint inclusive ranges. Until a center is set the filter is not
/// ready and refuses to run.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ColorFilter {
    center: Option<HsvColor>,
    window: HsvWindow,
    /// Closing iterations applied before opening; fills interior holes.
    pub close_iterations: u32,
    /// Opening iterations applied after closing; removes speckle.
    pub open_iterations: u32,
}

impl Default for ColorFilter {
    fn default() -> Self {
        Self {
            center: None,
            window: HsvWindow::default(),
            close_iterations: 1,
            open_iterations: 1,
        }
    }
}

impl ColorFilter {
    /// Construct an unset filter with the given window.
    pub fn new(window: HsvWindow) -> Self {
        Self {
            window,
            ..Self::default()
        }
    }

    /// Set the center color.
    pub fn set(&mut self, color: HsvColor) {
        self.center = Some(color);
    }

    /// The configured center color, if any.
    pub fn center(&self) -> Option<HsvColor> {
        self.center
    }

    /// The configured window.
    pub fn window(&self) -> HsvWindow {
        self.window
    }

    /// Replace the window.
    pub fn set_window(&mut self, window: HsvWindow) {
        self.window = window;
    }

    /// True once a center color has been configured.
    pub fn is_ready(&self) -> bool {
        self.center.is_some()
    }

    /// Representative display color (the center, as RGB).
    pub fn mean_color(&self) -> Option<Rgb<u8>> {
        self.center.map(HsvColor::to_rgb)
    }

    /// True when `color` falls inside the configured window.
    pub fn matches(&self, color: HsvColor) -> bool {
        let Some(center) = self.center else {
            return false;
        };

        hue_in_window(color.h, center.h, self.window.h)
            && channel_in_window(color.s, center.s, self.window.s)
            && channel_in_window(color.v, center.v, self.window.v)
    }

    /// Run the full filter pipeline on `image`: range test, morphological
    /// close, morphological open, AND with `mask`.
    ///
    /// `image` and `mask` must share dimensions; the result is a 0/255
    /// binary image of the same size.
    pub fn filter(&self, image: &RgbImage, mask: &GrayImage) -> GaugeResult<GrayImage> {
        if !self.is_ready() {
            return Err(GaugeError::validation("color filter has no center color set"));
        }
        if image.dimensions() != mask.dimensions() {
            return Err(GaugeError::validation(format!(
                "filter image {:?} and mask {:?} dimensions differ",
                image.dimensions(),
                mask.dimensions()
            )));
        }

        let mut binary = GrayImage::new(image.width(), image.height());
        for (dst, px) in binary.iter_mut().zip(image.pixels()) {
            *dst = if self.matches(HsvColor::from_rgb(*px)) { 255 } else { 0 };
        }

        if self.close_iterations > 0 {
            binary = morphology::close(&binary, self.close_iterations);
        }
        if self.open_iterations > 0 {
            binary = morphology::open(&binary, self.open_iterations);
        }

        for (dst, m) in binary.iter_mut().zip(mask.iter()) {
            if *m == 0 {
                *dst = 0;
            }
        }
        Ok(binary)
    }
}

fn hue_in_window(h: u8, center: u8, half_width: u8) -> bool {
    let h = i32::from(h);
    let lo = i32::from(center) - i32::from(half_width);
    let hi = i32::from(center) + i32::from(half_width);

    if lo < 0 {
        // Window wraps below 0: split into [lo+180, 179] and [0, hi].
        h >= lo + HUE_MOD || h <= hi
    } else if hi >= HUE_MOD {
        // Window wraps above 179: split into [lo, 179] and [0, hi-180].
        h >= lo || h <= hi - HUE_MOD
    } else {
        h >= lo && h <= hi
    }
}

fn channel_in_window(v: u8, center: u8, half_width: u8) -> bool {
    let v = i32::from(v);
    v >= i32::from(center) - i32::from(half_width) && v <= i32::from(center) + i32::from(half_width)
}

#[cfg(test)]
#[path = "../../tests/unit/filter/hsv.rs"]
mod tests;
