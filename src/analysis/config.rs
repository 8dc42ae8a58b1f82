use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::features::measure::FeatureKind;
use crate::filter::hsv::ColorFilter;
use crate::foundation::core::{Fps, FrameIndex};
use crate::foundation::error::{GaugeError, GaugeResult};
use crate::geometry::roi::{Flip, Roi};

/// Frame sequencing mode for one analysis run.
///
/// The two modes are mutually exclusive by construction; there is no way
/// to combine them.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FrameSampling {
    /// `n` evenly spaced indices across `[0, frame_count)`.
    Count {
        /// Number of frames to sample; must be > 0.
        n: u64,
    },
    /// One index every `dt` seconds (`dt·fps` frames apart).
    Interval {
        /// Seconds between sampled frames; must be finite and > 0.
        dt: f64,
    },
}

impl FrameSampling {
    /// Validate mode parameters.
    pub fn validate(&self) -> GaugeResult<()> {
        match self {
            Self::Count { n } if *n == 0 => {
                Err(GaugeError::validation("sampling count must be > 0"))
            }
            Self::Interval { dt } if !dt.is_finite() || *dt <= 0.0 => {
                Err(GaugeError::validation("sampling dt must be finite and > 0"))
            }
            _ => Ok(()),
        }
    }

    /// Resolve the strictly ascending frame sequence for a video.
    pub fn sequence(&self, frame_count: u64, fps: Fps) -> Vec<FrameIndex> {
        match *self {
            Self::Count { n } => {
                let mut out = Vec::new();
                for i in 0..n {
                    let idx = i * frame_count / n;
                    if out.last() != Some(&FrameIndex(idx)) {
                        out.push(FrameIndex(idx));
                    }
                }
                out
            }
            Self::Interval { dt } => {
                let step = (dt * fps.as_f64()).round().max(1.0) as u64;
                (0..frame_count)
                    .step_by(step as usize)
                    .map(FrameIndex)
                    .collect()
            }
        }
    }
}

impl Default for FrameSampling {
    fn default() -> Self {
        Self::Interval { dt: 5.0 }
    }
}

/// Per-mask configuration: filter state, skip flag, and an optional
/// feature-kind override.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MaskConfig {
    /// Filter bound to the mask.
    #[serde(default)]
    pub filter: ColorFilter,
    /// Exclude the mask from analysis.
    #[serde(default)]
    pub skip: bool,
    /// Feature computation overriding the analyzer-wide kind.
    #[serde(default)]
    pub feature: Option<FeatureKind>,
}

/// Full analyzer configuration.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnalyzerConfig {
    /// Path of the video to analyze.
    pub video_path: Option<PathBuf>,
    /// Path of the design locating the regions of interest.
    pub design_path: Option<PathBuf>,
    /// Design render DPI; `None` uses the engine default.
    pub dpi: Option<f32>,
    /// Region of interest within the video frame.
    pub roi: Option<Roi>,
    /// Mirror adjustment applied before `turn`.
    #[serde(default)]
    pub flip: Flip,
    /// Clockwise quarter turns applied after `flip`.
    #[serde(default)]
    pub turn: i32,
    /// Frame sequencing mode.
    #[serde(default)]
    pub sampling: FrameSampling,
    /// Analyzer-wide feature computation.
    pub feature: FeatureKind,
    /// Per-mask configuration keyed by mask name.
    #[serde(default)]
    pub masks: BTreeMap<String, MaskConfig>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            video_path: None,
            design_path: None,
            dpi: None,
            roi: None,
            flip: Flip::default(),
            turn: 0,
            sampling: FrameSampling::default(),
            feature: FeatureKind::PixelCount,
            masks: BTreeMap::new(),
        }
    }
}

impl AnalyzerConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> GaugeResult<()> {
        self.sampling.validate()?;
        if let Some(dpi) = self.dpi
            && (!dpi.is_finite() || dpi <= 0.0)
        {
            return Err(GaugeError::validation("dpi must be finite and > 0"));
        }
        Ok(())
    }
}

/// What a [`ConfigPatch`] merge changed, driving follow-up work.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Video path, design path or DPI changed; a launched analyzer must
    /// re-launch.
    pub needs_relaunch: bool,
    /// Roi, flip or turn changed; a launched analyzer must re-estimate
    /// its transform.
    pub needs_estimate: bool,
    /// Mask filters, skips or feature settings changed.
    pub masks_changed: bool,
}

impl MergeOutcome {
    /// True when nothing changed.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Partial analyzer configuration; unset fields leave the target
/// untouched on merge.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConfigPatch {
    /// Replace the video path.
    #[serde(default)]
    pub video_path: Option<PathBuf>,
    /// Replace the design path.
    #[serde(default)]
    pub design_path: Option<PathBuf>,
    /// Replace the render DPI.
    #[serde(default)]
    pub dpi: Option<f32>,
    /// Replace the region of interest.
    #[serde(default)]
    pub roi: Option<Roi>,
    /// Replace the mirror adjustment.
    #[serde(default)]
    pub flip: Option<Flip>,
    /// Replace the turn count.
    #[serde(default)]
    pub turn: Option<i32>,
    /// Replace the sampling mode.
    #[serde(default)]
    pub sampling: Option<FrameSampling>,
    /// Replace the analyzer-wide feature kind.
    #[serde(default)]
    pub feature: Option<FeatureKind>,
    /// Merge per-mask configuration by name.
    #[serde(default)]
    pub masks: Option<BTreeMap<String, MaskConfig>>,
}

impl AnalyzerConfig {
    /// Merge `patch` into this configuration and report what changed.
    pub fn merge(&mut self, patch: ConfigPatch) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        if let Some(path) = patch.video_path
            && self.video_path.as_ref() != Some(&path)
        {
            self.video_path = Some(path);
            outcome.needs_relaunch = true;
        }
        if let Some(path) = patch.design_path
            && self.design_path.as_ref() != Some(&path)
        {
            self.design_path = Some(path);
            outcome.needs_relaunch = true;
        }
        if let Some(dpi) = patch.dpi
            && self.dpi != Some(dpi)
        {
            self.dpi = Some(dpi);
            outcome.needs_relaunch = true;
        }

        if let Some(roi) = patch.roi
            && self.roi != Some(roi)
        {
            self.roi = Some(roi);
            outcome.needs_estimate = true;
        }
        if let Some(flip) = patch.flip
            && self.flip != flip
        {
            self.flip = flip;
            outcome.needs_estimate = true;
        }
        if let Some(turn) = patch.turn
            && self.turn != turn
        {
            self.turn = turn;
            outcome.needs_estimate = true;
        }

        if let Some(sampling) = patch.sampling {
            self.sampling = sampling;
        }
        if let Some(feature) = patch.feature
            && self.feature != feature
        {
            self.feature = feature;
            outcome.masks_changed = true;
        }
        if let Some(masks) = patch.masks {
            for (name, mask_config) in masks {
                if self.masks.get(&name) != Some(&mask_config) {
                    self.masks.insert(name, mask_config);
                    outcome.masks_changed = true;
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
#[path = "../../tests/unit/analysis/config.rs"]
mod tests;
