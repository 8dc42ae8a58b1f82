use super::*;

#[test]
fn primary_colors_convert_to_expected_hsv() {
    assert_eq!(
        HsvColor::from_rgb(Rgb([255, 0, 0])),
        HsvColor { h: 0, s: 255, v: 255 }
    );
    assert_eq!(
        HsvColor::from_rgb(Rgb([0, 255, 0])),
        HsvColor { h: 60, s: 255, v: 255 }
    );
    assert_eq!(
        HsvColor::from_rgb(Rgb([0, 0, 255])),
        HsvColor { h: 120, s: 255, v: 255 }
    );
    assert_eq!(
        HsvColor::from_rgb(Rgb([0, 0, 0])),
        HsvColor { h: 0, s: 0, v: 0 }
    );
    assert_eq!(
        HsvColor::from_rgb(Rgb([255, 255, 255])),
        HsvColor { h: 0, s: 0, v: 255 }
    );
}

#[test]
fn rgb_roundtrip_is_close_for_saturated_colors() {
    for rgb in [
        Rgb([255u8, 0, 0]),
        Rgb([0, 255, 0]),
        Rgb([0, 0, 255]),
        Rgb([200, 120, 40]),
    ] {
        let back = HsvColor::from_rgb(rgb).to_rgb();
        for c in 0..3 {
            let delta = i32::from(back.0[c]) - i32::from(rgb.0[c]);
            assert!(delta.abs() <= 4, "{rgb:?} -> {back:?}");
        }
    }
}

#[test]
fn window_wrapping_below_zero_splits_into_two_ranges() {
    // center 5 ± 10 covers [175, 179] and [0, 15].
    let mut filter = ColorFilter::new(HsvWindow { h: 10, s: 255, v: 255 });
    filter.set(HsvColor { h: 5, s: 128, v: 128 });

    assert!(filter.matches(HsvColor { h: 178, s: 128, v: 128 }));
    assert!(filter.matches(HsvColor { h: 0, s: 128, v: 128 }));
    assert!(filter.matches(HsvColor { h: 15, s: 128, v: 128 }));
    assert!(!filter.matches(HsvColor { h: 90, s: 128, v: 128 }));
    assert!(!filter.matches(HsvColor { h: 16, s: 128, v: 128 }));
    assert!(!filter.matches(HsvColor { h: 174, s: 128, v: 128 }));
}

#[test]
fn window_wrapping_above_the_modulus_splits_into_two_ranges() {
    // center 175 ± 10 covers [165, 179] and [0, 5].
    let mut filter = ColorFilter::new(HsvWindow { h: 10, s: 255, v: 255 });
    filter.set(HsvColor { h: 175, s: 128, v: 128 });

    assert!(filter.matches(HsvColor { h: 2, s: 128, v: 128 }));
    assert!(filter.matches(HsvColor { h: 165, s: 128, v: 128 }));
    assert!(!filter.matches(HsvColor { h: 6, s: 128, v: 128 }));
    assert!(!filter.matches(HsvColor { h: 100, s: 128, v: 128 }));
}

#[test]
fn saturation_and_value_windows_clamp_inclusively() {
    let mut filter = ColorFilter::new(HsvWindow { h: 179, s: 20, v: 20 });
    filter.set(HsvColor { h: 0, s: 100, v: 200 });

    assert!(filter.matches(HsvColor { h: 50, s: 80, v: 220 }));
    assert!(!filter.matches(HsvColor { h: 50, s: 79, v: 200 }));
    assert!(!filter.matches(HsvColor { h: 50, s: 100, v: 221 }));
}

#[test]
fn readiness_requires_a_center_color() {
    let mut filter = ColorFilter::default();
    assert!(!filter.is_ready());
    assert!(filter.mean_color().is_none());

    filter.set(HsvColor { h: 30, s: 200, v: 200 });
    assert!(filter.is_ready());
    assert!(filter.mean_color().is_some());
}

#[test]
fn unready_filter_refuses_to_run() {
    let filter = ColorFilter::default();
    let image = RgbImage::new(4, 4);
    let mask = GrayImage::from_pixel(4, 4, image::Luma([255]));
    assert!(filter.filter(&image, &mask).is_err());
}

#[test]
fn mismatched_mask_dimensions_are_rejected() {
    let mut filter = ColorFilter::default();
    filter.set(HsvColor { h: 0, s: 255, v: 255 });
    let image = RgbImage::new(4, 4);
    let mask = GrayImage::new(5, 4);
    assert!(filter.filter(&image, &mask).is_err());
}

#[test]
fn pipeline_selects_the_target_color_within_the_mask() {
    // 12x12 red square centered in a blue field; mask covers the left
    // half of the image only.
    let mut image = RgbImage::from_pixel(24, 24, Rgb([0, 0, 255]));
    for y in 6..18 {
        for x in 6..18 {
            image.put_pixel(x, y, Rgb([255, 0, 0]));
        }
    }
    let mut mask = GrayImage::new(24, 24);
    for y in 0..24 {
        for x in 0..12 {
            mask.put_pixel(x, y, image::Luma([255]));
        }
    }

    let mut filter = ColorFilter::default();
    filter.set(HsvColor::from_rgb(Rgb([255, 0, 0])));
    let binary = filter.filter(&image, &mask).unwrap();

    // Only the left half of the red square survives the mask AND.
    let expected: usize = 12 * 6;
    let actual = binary.iter().filter(|&&v| v != 0).count();
    assert_eq!(actual, expected);
    assert_eq!(binary.get_pixel(7, 7).0[0], 255);
    assert_eq!(binary.get_pixel(13, 7).0[0], 0, "outside mask");
    assert_eq!(binary.get_pixel(2, 2).0[0], 0, "background color");
}
