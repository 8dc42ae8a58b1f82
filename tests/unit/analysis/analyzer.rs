use super::*;

#[path = "support.rs"]
mod support;

use std::sync::OnceLock;

use image::Rgb;

use crate::analysis::config::{FrameSampling, MaskConfig};
use crate::events::EventCategory;
use crate::filter::hsv::{ColorFilter, HsvColor};
use crate::geometry::roi::Flip;
use support::{SyntheticDecoder, SyntheticRenderer, context, touch, unit_roi};

const SHAPE: PixelShape = PixelShape {
    width: 32,
    height: 24,
};

fn blue() -> Rgb<u8> {
    Rgb([0, 0, 255])
}

fn decoder(frame_count: u64) -> SyntheticDecoder {
    SyntheticDecoder::new(frame_count, 1, SHAPE, blue())
}

fn renderer() -> SyntheticRenderer {
    SyntheticRenderer {
        shape: SHAPE,
        regions: vec![("well".to_string(), 5, 5, 10, 10)],
    }
}

fn base_config(tag: &str) -> AnalyzerConfig {
    AnalyzerConfig {
        video_path: Some(touch(&format!("{tag}.mp4"))),
        design_path: Some(touch(&format!("{tag}.svg"))),
        sampling: FrameSampling::Interval { dt: 2.0 },
        ..AnalyzerConfig::default()
    }
}

fn ready_analyzer(tag: &str, frame_count: u64) -> Arc<Analyzer> {
    let (ctx, _) = context(decoder(frame_count), renderer());
    let analyzer = Analyzer::new(tag, ctx, base_config(tag)).unwrap();
    assert!(analyzer.launch());
    assert!(analyzer.estimate_transform(unit_roi()).is_some());
    analyzer
        .set_mask_filter("well", HsvColor::from_rgb(blue()))
        .unwrap();
    analyzer
}

#[test]
fn state_machine_advances_with_the_predicates() {
    let (ctx, _) = context(decoder(10), renderer());
    let analyzer = Analyzer::new("sm", ctx, AnalyzerConfig::default()).unwrap();
    assert_eq!(analyzer.state(), AnalyzerState::Incomplete);

    let patch = ConfigPatch {
        video_path: Some(touch("sm.mp4")),
        design_path: Some(touch("sm.svg")),
        ..ConfigPatch::default()
    };
    analyzer.set_config(patch).unwrap();
    assert_eq!(analyzer.state(), AnalyzerState::CanLaunch);

    assert!(analyzer.launch());
    assert_eq!(analyzer.state(), AnalyzerState::Launched);

    assert!(analyzer.estimate_transform(unit_roi()).is_some());
    assert_eq!(analyzer.state(), AnalyzerState::CanFilter);

    analyzer
        .set_mask_filter("well", HsvColor::from_rgb(blue()))
        .unwrap();
    assert_eq!(analyzer.state(), AnalyzerState::CanAnalyze);
}

#[test]
fn skipped_masks_unblock_analysis() {
    let (ctx, _) = context(decoder(10), renderer());
    let analyzer = Analyzer::new("skip", ctx, base_config("skip")).unwrap();
    assert!(analyzer.launch());
    assert!(analyzer.estimate_transform(unit_roi()).is_some());
    assert_eq!(analyzer.state(), AnalyzerState::CanFilter);

    let mut masks = std::collections::BTreeMap::new();
    masks.insert(
        "well".to_string(),
        MaskConfig {
            skip: true,
            ..MaskConfig::default()
        },
    );
    analyzer
        .set_config(ConfigPatch {
            masks: Some(masks),
            ..ConfigPatch::default()
        })
        .unwrap();
    assert_eq!(analyzer.state(), AnalyzerState::CanAnalyze);
}

#[test]
fn launch_failure_surfaces_as_cannot_launch() {
    // A design with no usable layers fails setup during launch.
    let empty = SyntheticRenderer {
        shape: SHAPE,
        regions: Vec::new(),
    };
    let (ctx, _) = context(decoder(10), empty);
    let analyzer = Analyzer::new("bad", ctx, base_config("bad")).unwrap();
    assert_eq!(analyzer.state(), AnalyzerState::CanLaunch);

    assert!(!analyzer.launch());
    // The reason is latched; the analyzer no longer claims launchability.
    assert_eq!(analyzer.state(), AnalyzerState::Incomplete);
    assert!(!analyzer.analyze());
}

#[test]
fn analyze_refused_before_predicates_hold() {
    let (ctx, _) = context(decoder(10), renderer());
    let analyzer = Analyzer::new("early", ctx, base_config("early")).unwrap();
    assert!(!analyzer.analyze());
    assert!(analyzer.launch());
    assert!(!analyzer.analyze(), "no transform estimated yet");
}

#[test]
fn analyze_fills_result_tables_in_frame_order() {
    let analyzer = ready_analyzer("run", 10);
    assert!(analyzer.analyze());
    assert_eq!(analyzer.state(), AnalyzerState::Done);

    let results = analyzer.results();
    let table = results.get("well").expect("result table per feature");
    let frames: Vec<u64> = table.keys().copied().collect();
    assert_eq!(frames, vec![0, 2, 4, 6, 8]);
    for value in table.values() {
        assert_eq!(*value, 100.0, "10x10 mask filled with the filter color");
    }

    let status = analyzer.status();
    assert!(status.has_results);
    assert!(status.cached);
    assert!(!status.busy);
    assert_eq!(status.progress, 1.0);
}

#[test]
fn decode_failures_skip_the_frame_and_notify() {
    let mut failing = decoder(10);
    failing.fail_frames = vec![2];
    let (ctx, events) = context(failing, renderer());
    let analyzer = Analyzer::new("skipframe", ctx, base_config("skipframe")).unwrap();
    assert!(analyzer.launch());
    assert!(analyzer.estimate_transform(unit_roi()).is_some());
    analyzer
        .set_mask_filter("well", HsvColor::from_rgb(blue()))
        .unwrap();

    assert!(analyzer.analyze());
    assert_eq!(analyzer.state(), AnalyzerState::Done);

    let results = analyzer.results();
    let frames: Vec<u64> = results["well"].keys().copied().collect();
    assert_eq!(frames, vec![0, 4, 6, 8], "failed frame is absent");

    assert!(
        events
            .events()
            .iter()
            .any(|e| e.category == EventCategory::Notice),
        "a user-facing notice is pushed for the skipped frame"
    );
}

#[test]
fn cancellation_is_cooperative_and_terminal() {
    let slot: Arc<OnceLock<Arc<Analyzer>>> = Arc::new(OnceLock::new());
    let hook_slot = slot.clone();

    let mut hooked = decoder(10);
    hooked.on_decode = Some(Box::new(move |index| {
        if index >= 4
            && let Some(analyzer) = hook_slot.get()
        {
            analyzer.cancel();
        }
    }));

    let (ctx, _) = context(hooked, renderer());
    let analyzer = Analyzer::new("cancel", ctx, base_config("cancel")).unwrap();
    slot.set(analyzer.clone()).ok();

    assert!(analyzer.launch());
    assert!(analyzer.estimate_transform(unit_roi()).is_some());
    analyzer
        .set_mask_filter("well", HsvColor::from_rgb(blue()))
        .unwrap();

    assert!(!analyzer.analyze());
    assert_eq!(analyzer.state(), AnalyzerState::Canceled);

    // Frame 4 still completes (the flag is polled at iteration starts);
    // later frames never run.
    let frames: Vec<u64> = analyzer.results()["well"].keys().copied().collect();
    assert_eq!(frames, vec![0, 2, 4]);
}

#[test]
fn flagged_error_ends_the_run_in_error_state() {
    let slot: Arc<OnceLock<Arc<Analyzer>>> = Arc::new(OnceLock::new());
    let hook_slot = slot.clone();

    let mut hooked = decoder(10);
    hooked.on_decode = Some(Box::new(move |index| {
        if index >= 2
            && let Some(analyzer) = hook_slot.get()
        {
            analyzer.flag_error();
        }
    }));

    let (ctx, _) = context(hooked, renderer());
    let analyzer = Analyzer::new("err", ctx, base_config("err")).unwrap();
    slot.set(analyzer.clone()).ok();

    assert!(analyzer.launch());
    assert!(analyzer.estimate_transform(unit_roi()).is_some());
    analyzer
        .set_mask_filter("well", HsvColor::from_rgb(blue()))
        .unwrap();

    assert!(!analyzer.analyze());
    assert_eq!(analyzer.state(), AnalyzerState::Error);
}

#[test]
fn done_regresses_to_can_filter_with_progress_reset() {
    let analyzer = ready_analyzer("regress", 10);
    assert!(analyzer.analyze());
    assert_eq!(analyzer.state(), AnalyzerState::Done);
    assert_eq!(analyzer.status().progress, 1.0);

    // Unsetting the mask filter drops can_analyze while can_filter still
    // holds.
    let mut masks = std::collections::BTreeMap::new();
    masks.insert(
        "well".to_string(),
        MaskConfig {
            filter: ColorFilter::default(),
            skip: false,
            feature: None,
        },
    );
    analyzer
        .set_config(ConfigPatch {
            masks: Some(masks),
            ..ConfigPatch::default()
        })
        .unwrap();

    assert_eq!(analyzer.state(), AnalyzerState::CanFilter);
    assert_eq!(analyzer.status().progress, 0.0, "progress resets from Done");
}

#[test]
fn estimate_transform_returns_the_adjusted_roi() {
    let (ctx, _) = context(decoder(10), renderer());
    let analyzer = Analyzer::new("adjust", ctx, base_config("adjust")).unwrap();
    assert!(analyzer.launch());

    analyzer
        .set_config(ConfigPatch {
            turn: Some(2),
            ..ConfigPatch::default()
        })
        .unwrap();

    let roi = unit_roi();
    let adjusted = analyzer.estimate_transform(roi).unwrap();
    assert_eq!(adjusted, roi.adjust(Flip::default(), 2));
}

#[test]
fn unlaunched_estimation_returns_none_but_stores_the_roi() {
    let (ctx, _) = context(decoder(10), renderer());
    let analyzer = Analyzer::new("unlaunched", ctx, AnalyzerConfig::default()).unwrap();
    assert!(analyzer.estimate_transform(unit_roi()).is_none());
    assert_eq!(analyzer.get_config().roi, Some(unit_roi()));
}

#[test]
fn image_accessors_cover_the_pipeline() {
    let analyzer = ready_analyzer("images", 10);

    let raw = analyzer.raw_frame(Some(FrameIndex(0))).unwrap();
    assert_eq!(raw.dimensions(), (32, 24));

    let warped = analyzer.warped_frame(None).unwrap();
    assert_eq!(warped.dimensions(), (32, 24));
    assert_eq!(warped.get_pixel(10, 10).0, [0, 0, 255]);

    let filtered = analyzer.filtered_frame(None).unwrap();
    let set_pixels = filtered.iter().filter(|&&v| v != 0).count();
    assert_eq!(set_pixels, 100, "only the mask region survives");

    let overlaid = analyzer.overlaid_frame(None).unwrap();
    assert_eq!(overlaid.dimensions(), (32, 24));

    let state = analyzer.state_frame(None).unwrap();
    let painted = state.pixels().filter(|px| px.0 != [0, 0, 0]).count();
    assert_eq!(painted, 100);
}

#[test]
fn transform_access_before_estimation_is_a_contract_error() {
    let (ctx, _) = context(decoder(10), renderer());
    let analyzer = Analyzer::new("notransform", ctx, base_config("notransform")).unwrap();
    assert!(analyzer.launch());

    assert!(matches!(
        analyzer.warped_frame(None),
        Err(GaugeError::NotEstimated(_))
    ));
}

#[test]
fn out_of_range_frame_indices_are_rejected() {
    let analyzer = ready_analyzer("range", 10);
    assert!(matches!(
        analyzer.raw_frame(Some(FrameIndex(10))),
        Err(GaugeError::Validation(_))
    ));
}

#[test]
fn seek_snaps_to_the_nearest_cached_frame() {
    let analyzer = ready_analyzer("seek", 10);
    assert!(analyzer.analyze());

    // Sampled (and therefore cached) frames are 0,2,4,6,8. Position 3/9
    // sits between cached neighbors; the lower one wins at equal
    // distance.
    let resolved = analyzer.seek(3.0 / 9.0);
    assert!((resolved - 2.0 / 9.0).abs() < 1e-9, "resolved {resolved}");
    assert_eq!(analyzer.status().position, resolved);

    // Out-of-range input clamps to the end, then snaps down to the last
    // cached frame.
    let resolved = analyzer.seek(7.5);
    assert!((resolved - 8.0 / 9.0).abs() < 1e-9, "resolved {resolved}");
}

#[test]
fn mask_hits_route_design_points() {
    let analyzer = ready_analyzer("hits", 10);
    assert_eq!(analyzer.hit_mask(Point::new(7.0, 7.0)).unwrap(), MaskHit::One(0));
    assert_eq!(analyzer.hit_mask(Point::new(1.0, 1.0)).unwrap(), MaskHit::Miss);
}

#[test]
fn get_config_reflects_live_mask_state() {
    let analyzer = ready_analyzer("sync", 10);
    let config = analyzer.get_config();
    let mask_config = config.masks.get("well").expect("mask config synced");
    assert!(mask_config.filter.is_ready());
}
