use std::collections::BTreeMap;

use image::{Rgb, RgbImage};

use crate::design::mask::Mask;
use crate::foundation::error::GaugeResult;

/// The closed set of feature computations.
///
/// Every kind maps a filtered pixel count to a numeric value; parameters
/// are carried per-variant. There is no runtime registry: adding a kind
/// means adding a variant and covering the match arms.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureKind {
    /// Raw count of matched pixels.
    PixelCount,
    /// Physical area: pixel count scaled by the square of the pixel
    /// pitch.
    Area {
        /// Physical size of one design-space pixel, in mm.
        mm_per_pixel: f64,
    },
    /// Physical volume: area extruded by a per-region depth.
    Volume {
        /// Physical size of one design-space pixel, in mm.
        mm_per_pixel: f64,
        /// Region depth, in mm.
        depth_mm: f64,
    },
}

impl FeatureKind {
    /// Compute the feature value from a matched pixel count.
    pub fn value(&self, pixel_count: u64) -> f64 {
        let n = pixel_count as f64;
        match self {
            Self::PixelCount => n,
            Self::Area { mm_per_pixel } => n * mm_per_pixel * mm_per_pixel,
            Self::Volume {
                mm_per_pixel,
                depth_mm,
            } => n * mm_per_pixel * mm_per_pixel * depth_mm,
        }
    }

    /// Unit label for display.
    pub fn unit(&self) -> &'static str {
        match self {
            Self::PixelCount => "px",
            Self::Area { .. } => "mm²",
            Self::Volume { .. } => "mm³",
        }
    }
}

/// One named numeric quantity computed from a masked, filtered frame.
#[derive(Clone, Debug)]
pub struct Feature {
    /// Mask name; doubles as the feature's result-table name.
    pub name: String,
    /// Index of the bound mask within the analyzer's mask set.
    pub mask_index: usize,
    /// Effective computation for this feature (set-wide kind or per-mask
    /// override).
    pub kind: FeatureKind,
    /// Resolved display color; set by [`FeatureSet::resolve_colors`].
    pub display_color: Rgb<u8>,
}

/// Hue distance within which two features share a display-color bin,
/// in degrees.
const HUE_BIN_TOLERANCE_DEG: f64 = 15.0;

/// Ordered feature collection for one analyzer.
///
/// All features share the analyzer-wide [`FeatureKind`] unless a per-mask
/// override replaces it. Display colors disambiguate features whose
/// filters sit close in hue.
#[derive(Clone, Debug)]
pub struct FeatureSet {
    features: Vec<Feature>,
}

impl FeatureSet {
    /// Build one feature per non-skipped mask, in mask order.
    pub fn new(
        kind: FeatureKind,
        masks: &[Mask],
        overrides: &BTreeMap<String, FeatureKind>,
    ) -> Self {
        let features = masks
            .iter()
            .enumerate()
            .filter(|(_, mask)| !mask.skip)
            .map(|(mask_index, mask)| Feature {
                name: mask.name.clone(),
                mask_index,
                kind: overrides.get(&mask.name).copied().unwrap_or(kind),
                display_color: Rgb([255, 255, 255]),
            })
            .collect();
        Self { features }
    }

    /// Features in insertion (mask) order.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Assign display colors by hue proximity.
    ///
    /// Features are binned greedily in insertion order: a feature joins
    /// the first bin whose reference hue lies within the tolerance,
    /// else opens a new bin. Bins with fewer than four members step
    /// lightness down in fixed 60-unit increments from 200; larger bins
    /// divide `[20,255]` evenly. Deterministic given stable insertion
    /// order.
    pub fn resolve_colors(&mut self, masks: &[Mask]) {
        let hues: Vec<f64> = self
            .features
            .iter()
            .map(|f| {
                masks[f.mask_index]
                    .filter
                    .center()
                    .map(|c| f64::from(c.h) * 2.0)
                    .unwrap_or(0.0)
            })
            .collect();

        // bins[i] = (reference hue, member feature indices)
        let mut bins: Vec<(f64, Vec<usize>)> = Vec::new();
        for (idx, &hue) in hues.iter().enumerate() {
            match bins
                .iter_mut()
                .find(|(reference, _)| hue_distance_deg(hue, *reference) <= HUE_BIN_TOLERANCE_DEG)
            {
                Some((_, members)) => members.push(idx),
                None => bins.push((hue, vec![idx])),
            }
        }

        for (_, members) in &bins {
            let n = members.len();
            for (pos, &idx) in members.iter().enumerate() {
                let lightness = if n < 4 {
                    200.0 - 60.0 * pos as f64
                } else {
                    20.0 + 235.0 * pos as f64 / (n as f64 - 1.0)
                };
                self.features[idx].display_color =
                    hsl_to_rgb(hues[idx], 1.0, lightness.clamp(0.0, 255.0) / 255.0);
            }
        }
    }

    /// Compute every feature value for one warped frame.
    ///
    /// With `state` set, matched pixels are additionally painted into the
    /// design-space state image using each feature's display color; the
    /// possibly-updated image is handed back.
    pub fn calculate(
        &self,
        masks: &[Mask],
        warped: &RgbImage,
        state: Option<RgbImage>,
    ) -> GaugeResult<(Vec<(String, f64)>, Option<RgbImage>)> {
        let mut state = state;
        let mut values = Vec::with_capacity(self.features.len());

        for feature in &self.features {
            let mask = &masks[feature.mask_index];
            let binary = mask.filter_frame(warped)?;
            let pixel_count = binary.iter().filter(|&&v| v != 0).count() as u64;
            values.push((feature.name.clone(), feature.kind.value(pixel_count)));

            if let Some(img) = state.as_mut() {
                let crop = mask.crop();
                for (x, y, px) in binary.enumerate_pixels() {
                    if px.0[0] != 0 {
                        img.put_pixel(crop.x + x, crop.y + y, feature.display_color);
                    }
                }
            }
        }

        Ok((values, state))
    }
}

fn hue_distance_deg(a: f64, b: f64) -> f64 {
    let d = (a - b).abs() % 360.0;
    d.min(360.0 - d)
}

fn hsl_to_rgb(hue_deg: f64, saturation: f64, lightness: f64) -> Rgb<u8> {
    let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let x = c * (1.0 - ((hue_deg / 60.0).rem_euclid(2.0) - 1.0).abs());
    let m = lightness - c / 2.0;

    let (r1, g1, b1) = match (hue_deg.rem_euclid(360.0) / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    Rgb([
        ((r1 + m) * 255.0).round().clamp(0.0, 255.0) as u8,
        ((g1 + m) * 255.0).round().clamp(0.0, 255.0) as u8,
        ((b1 + m) * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

#[cfg(test)]
#[path = "../../tests/unit/features/measure.rs"]
mod tests;
