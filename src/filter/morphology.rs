//! Binary morphology over 0/255 gray images.
//!
//! A 3×3 structuring element throughout. Padding follows the usual
//! convention that keeps image borders neutral: erosion pads with 255,
//! dilation pads with 0.

use image::GrayImage;

/// Morphological closing: dilate then erode, `iterations` times each.
///
/// Fills interior holes up to twice the iteration count wide.
pub fn close(img: &GrayImage, iterations: u32) -> GrayImage {
    let mut out = img.clone();
    for _ in 0..iterations {
        out = dilate_once(&out);
    }
    for _ in 0..iterations {
        out = erode_once(&out);
    }
    out
}

/// Morphological opening: erode then dilate, `iterations` times each.
///
/// Removes exterior speckle smaller than the structuring element.
pub fn open(img: &GrayImage, iterations: u32) -> GrayImage {
    let mut out = img.clone();
    for _ in 0..iterations {
        out = erode_once(&out);
    }
    for _ in 0..iterations {
        out = dilate_once(&out);
    }
    out
}

fn erode_once(img: &GrayImage) -> GrayImage {
    transform(img, 255, |acc, v| acc.min(v))
}

fn dilate_once(img: &GrayImage) -> GrayImage {
    transform(img, 0, |acc, v| acc.max(v))
}

fn transform(img: &GrayImage, pad: u8, fold: impl Fn(u8, u8) -> u8) -> GrayImage {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let mut out = GrayImage::new(img.width(), img.height());

    for y in 0..h {
        for x in 0..w {
            let mut acc = pad;
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let (nx, ny) = (x + dx, y + dy);
                    let v = if nx < 0 || ny < 0 || nx >= w || ny >= h {
                        pad
                    } else {
                        img.get_pixel(nx as u32, ny as u32).0[0]
                    };
                    acc = fold(acc, v);
                }
            }
            out.put_pixel(x as u32, y as u32, image::Luma([acc]));
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/filter/morphology.rs"]
mod tests;
