use super::*;

use std::path::PathBuf;

use crate::filter::hsv::{ColorFilter, HsvColor};

#[test]
fn count_sampling_spreads_evenly_and_deduplicates() {
    let fps = Fps::new(30, 1).unwrap();

    let seq = FrameSampling::Count { n: 5 }.sequence(100, fps);
    let raw: Vec<u64> = seq.iter().map(|f| f.0).collect();
    assert_eq!(raw, vec![0, 20, 40, 60, 80]);

    // More samples than frames collapses to one entry per frame.
    let seq = FrameSampling::Count { n: 10 }.sequence(3, fps);
    let raw: Vec<u64> = seq.iter().map(|f| f.0).collect();
    assert_eq!(raw, vec![0, 1, 2]);
}

#[test]
fn interval_sampling_steps_by_dt_times_fps() {
    let fps = Fps::new(2, 1).unwrap();
    let seq = FrameSampling::Interval { dt: 2.0 }.sequence(10, fps);
    let raw: Vec<u64> = seq.iter().map(|f| f.0).collect();
    assert_eq!(raw, vec![0, 4, 8]);

    // Sub-frame intervals clamp to a step of one.
    let seq = FrameSampling::Interval { dt: 0.1 }.sequence(4, fps);
    assert_eq!(seq.len(), 4);
}

#[test]
fn sequences_are_strictly_ascending() {
    let fps = Fps::new(30000, 1001).unwrap();
    for sampling in [
        FrameSampling::Count { n: 17 },
        FrameSampling::Interval { dt: 0.7 },
    ] {
        let seq = sampling.sequence(333, fps);
        for pair in seq.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}

#[test]
fn sampling_validation_rejects_degenerate_parameters() {
    assert!(FrameSampling::Count { n: 0 }.validate().is_err());
    assert!(FrameSampling::Interval { dt: 0.0 }.validate().is_err());
    assert!(FrameSampling::Interval { dt: f64::NAN }.validate().is_err());
    assert!(FrameSampling::Count { n: 1 }.validate().is_ok());
}

#[test]
fn empty_patch_merge_is_a_noop() {
    let mut config = AnalyzerConfig::default();
    let before = config.clone();
    let outcome = config.merge(ConfigPatch::default());
    assert!(outcome.is_noop());
    assert_eq!(config, before);
}

#[test]
fn path_changes_require_relaunch() {
    let mut config = AnalyzerConfig::default();
    let outcome = config.merge(ConfigPatch {
        video_path: Some(PathBuf::from("/tmp/v.mp4")),
        ..ConfigPatch::default()
    });
    assert!(outcome.needs_relaunch);
    assert!(!outcome.needs_estimate);

    // Re-applying the same path changes nothing.
    let outcome = config.merge(ConfigPatch {
        video_path: Some(PathBuf::from("/tmp/v.mp4")),
        ..ConfigPatch::default()
    });
    assert!(outcome.is_noop());
}

#[test]
fn roi_and_orientation_changes_require_estimation() {
    use crate::foundation::core::RelPoint;

    let roi = Roi {
        bl: RelPoint::new(0.0, 1.0).unwrap(),
        tl: RelPoint::new(0.0, 0.0).unwrap(),
        tr: RelPoint::new(1.0, 0.0).unwrap(),
        br: RelPoint::new(1.0, 1.0).unwrap(),
    };

    let mut config = AnalyzerConfig::default();
    let outcome = config.merge(ConfigPatch {
        roi: Some(roi),
        ..ConfigPatch::default()
    });
    assert!(outcome.needs_estimate);
    assert!(!outcome.needs_relaunch);

    let outcome = config.merge(ConfigPatch {
        turn: Some(1),
        ..ConfigPatch::default()
    });
    assert!(outcome.needs_estimate);
}

#[test]
fn mask_entries_merge_by_name() {
    let mut config = AnalyzerConfig::default();

    let mut filter = ColorFilter::default();
    filter.set(HsvColor { h: 40, s: 200, v: 200 });
    let mut masks = BTreeMap::new();
    masks.insert(
        "well".to_string(),
        MaskConfig {
            filter,
            skip: false,
            feature: None,
        },
    );

    let outcome = config.merge(ConfigPatch {
        masks: Some(masks),
        ..ConfigPatch::default()
    });
    assert!(outcome.masks_changed);
    assert!(config.masks.contains_key("well"));

    // A second mask merges in without clobbering the first.
    let mut more = BTreeMap::new();
    more.insert("channel".to_string(), MaskConfig::default());
    config.merge(ConfigPatch {
        masks: Some(more),
        ..ConfigPatch::default()
    });
    assert_eq!(config.masks.len(), 2);
}

#[test]
fn patch_deserializes_from_partial_json() {
    let patch: ConfigPatch =
        serde_json::from_str(r#"{"turn": 2, "sampling": {"mode": "count", "n": 7}}"#).unwrap();
    assert_eq!(patch.turn, Some(2));
    assert_eq!(patch.sampling, Some(FrameSampling::Count { n: 7 }));
    assert!(patch.video_path.is_none());
}
