use super::*;
use crate::foundation::core::RelPoint;
use image::Rgb;

fn rel(x: f64, y: f64) -> RelPoint {
    RelPoint::new(x, y).unwrap()
}

fn shape(w: u32, h: u32) -> PixelShape {
    PixelShape::new(w, h).unwrap()
}

fn skewed_roi() -> Roi {
    Roi {
        bl: rel(0.12, 0.85),
        tl: rel(0.2, 0.1),
        tr: rel(0.85, 0.18),
        br: rel(0.9, 0.92),
    }
}

fn unit_roi() -> Roi {
    Roi {
        bl: rel(0.0, 1.0),
        tl: rel(0.0, 0.0),
        tr: rel(1.0, 0.0),
        br: rel(1.0, 1.0),
    }
}

fn assert_close(a: Point, b: Point, tolerance: f64) {
    assert!(
        (a.x - b.x).abs() < tolerance && (a.y - b.y).abs() < tolerance,
        "{a:?} != {b:?}"
    );
}

#[test]
fn estimate_maps_corners_to_canonical_rectangle() {
    let from = shape(640, 480);
    let to = shape(200, 100);
    let roi = skewed_roi();
    let t = PerspectiveTransform::estimate(&roi, from, to).unwrap();

    assert_close(t.transform_point(roi.bl.to_pixels(from)), Point::new(0.0, 100.0), 1e-6);
    assert_close(t.transform_point(roi.tl.to_pixels(from)), Point::new(0.0, 0.0), 1e-6);
    assert_close(t.transform_point(roi.tr.to_pixels(from)), Point::new(200.0, 0.0), 1e-6);
    assert_close(t.transform_point(roi.br.to_pixels(from)), Point::new(200.0, 100.0), 1e-6);
}

#[test]
fn inverse_roundtrips_the_corners() {
    let from = shape(640, 480);
    let to = shape(200, 100);
    let roi = skewed_roi();
    let t = PerspectiveTransform::estimate(&roi, from, to).unwrap();

    for corner in roi.corners() {
        let p = corner.to_pixels(from);
        assert_close(t.inverse_point(t.transform_point(p)), p, 1e-6);
    }
}

#[test]
fn invert_swaps_directions() {
    let from = shape(640, 480);
    let to = shape(200, 100);
    let t = PerspectiveTransform::estimate(&skewed_roi(), from, to).unwrap();
    let inv = t.invert();

    let p = Point::new(123.0, 45.0);
    assert_close(inv.transform_point(p), t.inverse_point(p), 1e-9);
}

#[test]
fn collinear_corners_yield_none() {
    let degenerate = Roi {
        bl: rel(0.1, 0.1),
        tl: rel(0.3, 0.3),
        tr: rel(0.5, 0.5),
        br: rel(0.7, 0.7),
    };
    assert!(PerspectiveTransform::estimate(&degenerate, shape(100, 100), shape(50, 50)).is_none());
}

#[test]
fn coincident_corners_yield_none() {
    let p = rel(0.4, 0.4);
    let degenerate = Roi {
        bl: p,
        tl: p,
        tr: p,
        br: p,
    };
    assert!(PerspectiveTransform::estimate(&degenerate, shape(100, 100), shape(50, 50)).is_none());
}

#[test]
fn full_frame_roi_warps_a_constant_image_losslessly() {
    let video = shape(64, 48);
    let design = shape(64, 48);
    let t = PerspectiveTransform::estimate(&unit_roi(), video, design).unwrap();

    let frame = RgbImage::from_pixel(64, 48, Rgb([10, 200, 30]));
    let warped = t.warp_image(&frame, design);

    assert_eq!(warped.dimensions(), (64, 48));
    for px in warped.pixels() {
        assert_eq!(px.0, [10, 200, 30]);
    }
}

#[test]
fn out_of_frame_samples_fill_white() {
    // The Roi covers only the inner quarter, so warping expands it; the
    // preimage of most design pixels falls outside the frame for corners
    // beyond [0,1].
    let oversized = Roi {
        bl: rel(-1.0, 2.0),
        tl: rel(-1.0, -1.0),
        tr: rel(2.0, -1.0),
        br: rel(2.0, 2.0),
    };
    let video = shape(32, 32);
    let design = shape(32, 32);
    let t = PerspectiveTransform::estimate(&oversized, video, design).unwrap();

    let frame = RgbImage::from_pixel(32, 32, Rgb([0, 0, 0]));
    let warped = t.warp_image(&frame, design);

    let corner = warped.get_pixel(0, 0).0;
    assert_eq!(corner, [255, 255, 255], "outside pixels must fill white");
    let center = warped.get_pixel(16, 16).0;
    assert_eq!(center, [0, 0, 0], "inside pixels must sample the frame");
}
