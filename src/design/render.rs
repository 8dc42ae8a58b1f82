use std::path::Path;

use anyhow::Context;
use image::{GrayImage, RgbaImage};

use crate::foundation::core::PixelShape;
use crate::foundation::error::{GaugeError, GaugeResult};

/// One named design layer rendered to a full-size binary mask.
///
/// A pixel is 255 where the layer painted anything (alpha > 0) and 0
/// elsewhere.
#[derive(Clone, Debug)]
pub struct NamedLayer {
    /// Layer name as authored in the design (group id).
    pub name: String,
    /// Full-size binary bitmap, same dimensions as the overlay.
    pub bitmap: GrayImage,
}

/// A design rendered at a fixed DPI: one overlay image plus one binary
/// bitmap per named layer.
#[derive(Clone, Debug)]
pub struct DesignRender {
    /// The whole design rasterized to RGBA, used for visual alignment.
    pub overlay: RgbaImage,
    /// Named layer bitmaps in document order.
    pub layers: Vec<NamedLayer>,
}

impl DesignRender {
    /// Pixel dimensions of the render.
    pub fn shape(&self) -> PixelShape {
        PixelShape {
            width: self.overlay.width(),
            height: self.overlay.height(),
        }
    }
}

/// Renderer collaborator turning a vector design file into a
/// [`DesignRender`].
///
/// The engine consumes this seam through the compute cache; backend
/// selection beyond the built-in SVG implementation is an embedding
/// concern.
pub trait DesignRenderer: Send + Sync {
    /// Render `path` at `dpi` into an overlay plus named layer bitmaps.
    fn render(&self, path: &Path, dpi: f32) -> GaugeResult<DesignRender>;
}

/// SVG design renderer over `usvg`/`resvg`.
///
/// Each top-level `<g>` element with a non-empty `id` becomes one named
/// layer; its subtree is rasterized separately and thresholded on alpha.
#[derive(Clone, Copy, Debug, Default)]
pub struct SvgRenderer;

/// Reference DPI of SVG user units.
const SVG_BASE_DPI: f32 = 96.0;

// Avoid pathological allocations. Callers needing very large renders
// should lower the DPI instead.
const MAX_DIM: u32 = 16_384;

impl DesignRenderer for SvgRenderer {
    fn render(&self, path: &Path, dpi: f32) -> GaugeResult<DesignRender> {
        if !dpi.is_finite() || dpi <= 0.0 {
            return Err(GaugeError::validation("render dpi must be finite and > 0"));
        }

        let bytes = std::fs::read(path)
            .with_context(|| format!("read design from '{}'", path.display()))
            .map_err(GaugeError::from)?;
        let tree = parse_svg(path, &bytes)?;

        let scale = dpi / SVG_BASE_DPI;
        let (width, height) = raster_size(&tree, scale)?;
        let xform = resvg::tiny_skia::Transform::from_scale(scale, scale);

        let mut pixmap = new_pixmap(width, height)?;
        resvg::render(&tree, xform, &mut pixmap.as_mut());
        let overlay = RgbaImage::from_raw(width, height, pixmap.data().to_vec())
            .ok_or_else(|| GaugeError::setup("overlay pixmap has unexpected byte length"))?;

        let mut layers = Vec::new();
        for node in tree.root().children() {
            let usvg::Node::Group(group) = node else {
                continue;
            };
            if group.id().is_empty() {
                continue;
            }

            let mut layer_pixmap = new_pixmap(width, height)?;
            resvg::render_node(node, xform, &mut layer_pixmap.as_mut());
            layers.push(NamedLayer {
                name: group.id().to_string(),
                bitmap: alpha_to_binary(width, height, layer_pixmap.data()),
            });
        }

        if layers.is_empty() {
            return Err(GaugeError::setup(format!(
                "design '{}' contains no named layers",
                path.display()
            )));
        }

        Ok(DesignRender { overlay, layers })
    }
}

fn parse_svg(path: &Path, bytes: &[u8]) -> GaugeResult<usvg::Tree> {
    let resources_dir = path.parent().map(|p| p.to_path_buf());

    let mut db = usvg::fontdb::Database::new();
    db.load_system_fonts();

    let opts = usvg::Options {
        resources_dir,
        fontdb: std::sync::Arc::new(db),
        ..Default::default()
    };

    usvg::Tree::from_data(bytes, &opts)
        .with_context(|| format!("parse design svg '{}'", path.display()))
        .map_err(GaugeError::from)
}

fn raster_size(tree: &usvg::Tree, scale: f32) -> GaugeResult<(u32, u32)> {
    fn to_px(v: f32) -> GaugeResult<u32> {
        if !v.is_finite() || v <= 0.0 {
            return Err(GaugeError::setup("design svg has invalid width/height"));
        }
        Ok((v.ceil() as u32).max(1))
    }

    let size = tree.size();
    let w = to_px(size.width() * scale)?;
    let h = to_px(size.height() * scale)?;

    if w > MAX_DIM || h > MAX_DIM {
        return Err(GaugeError::setup(format!(
            "design raster size too large: {w}x{h} (max {MAX_DIM}x{MAX_DIM})"
        )));
    }

    Ok((w, h))
}

fn new_pixmap(width: u32, height: u32) -> GaugeResult<resvg::tiny_skia::Pixmap> {
    resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| GaugeError::setup("failed to allocate design pixmap"))
}

fn alpha_to_binary(width: u32, height: u32, rgba: &[u8]) -> GrayImage {
    let mut out = GrayImage::new(width, height);
    for (dst, px) in out.iter_mut().zip(rgba.chunks_exact(4)) {
        *dst = if px[3] > 0 { 255 } else { 0 };
    }
    out
}
