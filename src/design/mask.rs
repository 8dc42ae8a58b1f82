use std::path::Path;
use std::sync::Arc;

use image::{GrayImage, RgbImage, RgbaImage};
use tracing::warn;

use crate::cache::key::ComputeKey;
use crate::cache::store::{CachedArtifact, ComputeCache};
use crate::design::render::{DesignRender, DesignRenderer};
use crate::filter::hsv::ColorFilter;
use crate::foundation::core::{PixelShape, Point};
use crate::foundation::error::{GaugeError, GaugeResult};

/// Axis-aligned pixel rectangle in design space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CropRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl CropRect {
    /// True when `p` lies inside the rectangle.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= f64::from(self.x)
            && p.y >= f64::from(self.y)
            && p.x < f64::from(self.x + self.width)
            && p.y < f64::from(self.y + self.height)
    }
}

/// One binary region of the design, cropped to its bounding rectangle
/// and bound to one mutable [`ColorFilter`].
///
/// The bitmap and geometry are immutable once derived from a render;
/// only the filter state and the `skip` flag change at runtime.
#[derive(Clone, Debug)]
pub struct Mask {
    /// Layer name as authored in the design.
    pub name: String,
    /// The color filter bound to this mask.
    pub filter: ColorFilter,
    /// Exclude this mask from analysis without configuring its filter.
    pub skip: bool,
    bitmap: GrayImage,
    crop: CropRect,
    center: Point,
}

impl Mask {
    fn from_layer(name: String, full: &GrayImage) -> Option<Self> {
        let crop = bounding_box(full)?;
        let bitmap =
            image::imageops::crop_imm(full, crop.x, crop.y, crop.width, crop.height).to_image();
        let center = Point::new(
            f64::from(crop.x) + f64::from(crop.width) / 2.0,
            f64::from(crop.y) + f64::from(crop.height) / 2.0,
        );
        Some(Self {
            name,
            filter: ColorFilter::default(),
            skip: false,
            bitmap,
            crop,
            center,
        })
    }

    /// Cropped binary bitmap (0/255), `crop()`-sized.
    pub fn bitmap(&self) -> &GrayImage {
        &self.bitmap
    }

    /// Bounding rectangle of the region within the design.
    pub fn crop(&self) -> CropRect {
        self.crop
    }

    /// Center of the bounding rectangle in design space.
    pub fn center(&self) -> Point {
        self.center
    }

    /// True when the design-space point hits a set pixel of this mask.
    pub fn contains(&self, p: Point) -> bool {
        if !self.crop.contains(p) {
            return false;
        }
        let x = p.x as u32 - self.crop.x;
        let y = p.y as u32 - self.crop.y;
        self.bitmap.get_pixel(x, y).0[0] != 0
    }

    /// True when this mask does not block analysis: its filter is
    /// configured, or it is skipped.
    pub fn ready_or_skipped(&self) -> bool {
        self.skip || self.filter.is_ready()
    }

    /// Cut this mask's rectangle out of a design-space frame.
    pub fn crop_frame(&self, warped: &RgbImage) -> RgbImage {
        image::imageops::crop_imm(warped, self.crop.x, self.crop.y, self.crop.width, self.crop.height)
            .to_image()
    }

    /// Run this mask's filter over its rectangle of `warped`.
    pub fn filter_frame(&self, warped: &RgbImage) -> GaugeResult<GrayImage> {
        self.filter.filter(&self.crop_frame(warped), &self.bitmap)
    }
}

/// Result of routing a design-space point to a mask.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MaskHit {
    /// No mask contains the point.
    Miss,
    /// Exactly one mask contains the point.
    One(usize),
    /// Multiple masks overlap at the point. Reported to the caller as a
    /// conflict, never silently resolved.
    Ambiguous(Vec<usize>),
}

/// Binary regions of one rendered design, each bound to a color filter.
#[derive(Clone, Debug)]
pub struct MaskSet {
    overlay: Arc<RgbaImage>,
    shape: PixelShape,
    masks: Vec<Mask>,
}

impl MaskSet {
    /// Render `path` at `dpi` through the shared cache and derive masks
    /// from the named layers.
    pub fn render(
        renderer: &dyn DesignRenderer,
        cache: &ComputeCache,
        path: &Path,
        dpi: f32,
    ) -> GaugeResult<Self> {
        let key = ComputeKey::new(
            "render_design",
            [
                path.display().to_string(),
                format!("dpi=0x{:08x}", dpi.to_bits()),
            ],
        );
        let render = cache
            .get_or_compute(&key, || {
                renderer
                    .render(path, dpi)
                    .map(|r| CachedArtifact::Render(Arc::new(r)))
            })?
            .into_render()?;
        Self::from_render(&render)
    }

    /// Derive masks from an already-rendered design.
    pub fn from_render(render: &DesignRender) -> GaugeResult<Self> {
        let mut masks = Vec::with_capacity(render.layers.len());
        for layer in &render.layers {
            match Mask::from_layer(layer.name.clone(), &layer.bitmap) {
                Some(mask) => masks.push(mask),
                None => warn!(layer = %layer.name, "design layer is empty; ignoring"),
            }
        }
        if masks.is_empty() {
            return Err(GaugeError::setup("design produced no non-empty masks"));
        }

        Ok(Self {
            overlay: Arc::new(render.overlay.clone()),
            shape: render.shape(),
            masks,
        })
    }

    /// The full design overlay.
    pub fn overlay(&self) -> &RgbaImage {
        &self.overlay
    }

    /// Pixel dimensions of the design render.
    pub fn shape(&self) -> PixelShape {
        self.shape
    }

    /// Masks in design document order.
    pub fn masks(&self) -> &[Mask] {
        &self.masks
    }

    /// Mutable mask access for filter configuration.
    pub fn masks_mut(&mut self) -> &mut [Mask] {
        &mut self.masks
    }

    /// Route a design-space point to the mask(s) containing it.
    pub fn hit(&self, p: Point) -> MaskHit {
        let hits: Vec<usize> = self
            .masks
            .iter()
            .enumerate()
            .filter(|(_, m)| m.contains(p))
            .map(|(i, _)| i)
            .collect();

        match hits.len() {
            0 => MaskHit::Miss,
            1 => MaskHit::One(hits[0]),
            _ => MaskHit::Ambiguous(hits),
        }
    }

    /// True when every mask is ready or skipped.
    pub fn all_ready_or_skipped(&self) -> bool {
        self.masks.iter().all(Mask::ready_or_skipped)
    }
}

fn bounding_box(img: &GrayImage) -> Option<CropRect> {
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut any = false;

    for (x, y, px) in img.enumerate_pixels() {
        if px.0[0] != 0 {
            any = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    any.then(|| CropRect {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/design/mask.rs"]
mod tests;
