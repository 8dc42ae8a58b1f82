use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use image::{GrayImage, RgbImage};
use serde_json::json;
use tracing::{debug, warn};

use crate::analysis::config::{AnalyzerConfig, ConfigPatch};
use crate::cache::store::ComputeCache;
use crate::config::EngineConfig;
use crate::design::mask::{MaskHit, MaskSet};
use crate::design::render::DesignRenderer;
use crate::events::{EventCategory, EventSink};
use crate::features::measure::{FeatureKind, FeatureSet};
use crate::filter::hsv::HsvColor;
use crate::foundation::core::{FrameIndex, PixelShape, Point};
use crate::foundation::error::{GaugeError, GaugeResult};
use crate::geometry::perspective::PerspectiveTransform;
use crate::geometry::roi::Roi;
use crate::snapshot::{ConfigSnapshot, SnapshotStore};
use crate::video::decode::VideoDecoder;
use crate::video::source::FrameSource;

/// Maximum distance scanned around a seek target when snapping to the
/// nearest cached frame.
const SEEK_SNAP_RADIUS: u64 = 64;

/// Shared engine services handed to every analyzer.
///
/// Constructed once by the embedding process; collaborators are trait
/// objects so transports and tests can substitute their own.
pub struct EngineContext {
    /// Engine-wide configuration.
    pub engine: EngineConfig,
    /// The shared compute cache.
    pub cache: Arc<ComputeCache>,
    /// Video decoder collaborator.
    pub decoder: Arc<dyn VideoDecoder>,
    /// Design renderer collaborator.
    pub renderer: Arc<dyn DesignRenderer>,
    /// Event sink collaborator.
    pub events: Arc<dyn EventSink>,
    /// Optional snapshot persistence collaborator.
    pub snapshots: Option<Arc<dyn SnapshotStore>>,
}

/// The authoritative analyzer lifecycle state.
///
/// Mutated only through [`Analyzer::state_transition`] and the analyze
/// run itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerState {
    /// Not enough configuration to launch.
    Incomplete,
    /// Video and design paths are resolvable.
    CanLaunch,
    /// Components are constructed but no transform is estimated yet.
    Launched,
    /// The transform is estimated; filters can be tuned.
    CanFilter,
    /// Every mask is ready or skipped; analysis may start.
    CanAnalyze,
    /// An analysis run is in progress.
    Analyzing,
    /// The last run completed.
    Done,
    /// The last run was canceled.
    Canceled,
    /// The last run failed, or the predicates were inconsistent.
    Error,
}

/// Snapshot of externally visible analyzer state.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct AnalyzerStatus {
    /// Lifecycle state.
    pub state: AnalyzerState,
    /// True while a launch or analysis run holds the analyzer.
    pub busy: bool,
    /// True once at least one frame was decoded into the cache.
    pub cached: bool,
    /// True once at least one result row exists.
    pub has_results: bool,
    /// Current relative position in `[0,1]`.
    pub position: f64,
    /// Progress of the current/last run in `[0,1]`.
    pub progress: f64,
}

/// How an analysis run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunEnd {
    Done,
    Canceled,
    Failed,
}

struct SharedStatus {
    state: AnalyzerState,
    progress: f64,
    position: f64,
}

struct Inner {
    config: AnalyzerConfig,
    setup_error: Option<String>,
    source: Option<FrameSource>,
    masks: Option<MaskSet>,
    transform: Option<PerspectiveTransform>,
    features: Option<FeatureSet>,
    results: BTreeMap<String, BTreeMap<u64, f64>>,
}

/// One video/design analysis unit.
///
/// Owns a lock serializing its own config mutation, launch and analyze
/// operations (per-analyzer mutual exclusion, not global). Status reads
/// never take that lock, so progress stays observable while a run is in
/// flight. Cancellation is cooperative through an atomic flag polled
/// once per frame.
pub struct Analyzer {
    id: String,
    ctx: Arc<EngineContext>,
    inner: Mutex<Inner>,
    shared: Mutex<SharedStatus>,
    cancel_requested: AtomicBool,
    error_flagged: AtomicBool,
    busy: AtomicBool,
    has_results: AtomicBool,
    any_cached: AtomicBool,
}

impl Analyzer {
    /// Construct an analyzer with a validated configuration.
    pub fn new(
        id: impl Into<String>,
        ctx: Arc<EngineContext>,
        config: AnalyzerConfig,
    ) -> GaugeResult<Arc<Self>> {
        config.validate()?;
        let analyzer = Arc::new(Self {
            id: id.into(),
            ctx,
            inner: Mutex::new(Inner {
                config,
                setup_error: None,
                source: None,
                masks: None,
                transform: None,
                features: None,
                results: BTreeMap::new(),
            }),
            shared: Mutex::new(SharedStatus {
                state: AnalyzerState::Incomplete,
                progress: 0.0,
                position: 0.0,
            }),
            cancel_requested: AtomicBool::new(false),
            error_flagged: AtomicBool::new(false),
            busy: AtomicBool::new(false),
            has_results: AtomicBool::new(false),
            any_cached: AtomicBool::new(false),
        });
        analyzer.state_transition();
        Ok(analyzer)
    }

    /// The analyzer id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Externally visible status. Never blocks on a running analysis.
    pub fn status(&self) -> AnalyzerStatus {
        let shared = self.lock_shared();
        AnalyzerStatus {
            state: shared.state,
            busy: self.busy.load(Ordering::Relaxed),
            cached: self.any_cached.load(Ordering::Relaxed),
            has_results: self.has_results.load(Ordering::Relaxed),
            position: shared.position,
            progress: shared.progress,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AnalyzerState {
        self.lock_shared().state
    }

    /// Copy of the current configuration, with live mask state synced
    /// back into its per-mask section.
    pub fn get_config(&self) -> AnalyzerConfig {
        let mut inner = self.lock_inner();
        Self::sync_mask_config(&mut inner);
        inner.config.clone()
    }

    /// Merge a partial configuration, re-validate, and re-launch or
    /// re-estimate as needed. Returns the updated configuration.
    pub fn set_config(&self, patch: ConfigPatch) -> GaugeResult<AnalyzerConfig> {
        let mut inner = self.lock_inner();

        let mut next = inner.config.clone();
        let outcome = next.merge(patch);
        next.validate()?;
        inner.config = next;

        if outcome.needs_relaunch {
            // A fresh path deserves a fresh attempt even after an earlier
            // setup failure.
            inner.setup_error = None;
            if inner.source.is_some() || inner.masks.is_some() {
                if let Err(err) = self.launch_locked(&mut inner) {
                    warn!(id = %self.id, %err, "re-launch after config change failed");
                    inner.setup_error = Some(err.to_string());
                    inner.source = None;
                    inner.masks = None;
                    inner.transform = None;
                    inner.features = None;
                }
            }
        } else {
            if outcome.masks_changed {
                Self::apply_mask_config(&mut inner);
                Self::rebuild_features(&mut inner);
            }
            if outcome.needs_estimate {
                Self::estimate_locked(&mut inner);
            }
        }

        self.recompute_state(&mut inner);
        self.ctx.events.push(
            EventCategory::Config,
            &self.id,
            json!({"action": "set_config"}),
        );
        Self::sync_mask_config(&mut inner);
        Ok(inner.config.clone())
    }

    /// Re-evaluate the lifecycle state from the current predicates and
    /// return the result.
    pub fn state_transition(&self) -> AnalyzerState {
        let mut inner = self.lock_inner();
        self.recompute_state(&mut inner)
    }

    /// Construct the frame source, mask set and transform for the
    /// configured paths.
    ///
    /// Requires `can_launch()`. Failures are logged and latched so
    /// `can_launch()` turns false; no error crosses this boundary.
    pub fn launch(&self) -> bool {
        let mut inner = self.lock_inner();
        if !Self::can_launch_inner(&inner) {
            debug!(id = %self.id, "launch refused: can_launch() is false");
            return false;
        }

        self.busy.store(true, Ordering::Relaxed);
        let result = self.launch_locked(&mut inner);
        self.busy.store(false, Ordering::Relaxed);

        match result {
            Ok(()) => {
                self.recompute_state(&mut inner);
                true
            }
            Err(err) => {
                warn!(id = %self.id, %err, "launch failed");
                inner.setup_error = Some(err.to_string());
                inner.source = None;
                inner.masks = None;
                inner.transform = None;
                inner.features = None;
                self.recompute_state(&mut inner);
                false
            }
        }
    }

    /// Run one analysis over the configured frame sequence.
    ///
    /// Requires `can_analyze()`. The cancel and error flags are checked
    /// once per frame (cooperative, not preemptive); per-frame decode
    /// failures skip the frame with a notice. Ends in `Done`, `Canceled`
    /// or `Error`; returns true only for `Done`.
    #[tracing::instrument(skip(self), fields(id = %self.id))]
    pub fn analyze(&self) -> bool {
        let mut inner = self.lock_inner();
        if self.recompute_state(&mut inner) != AnalyzerState::CanAnalyze {
            debug!(id = %self.id, "analyze refused: can_analyze() is false");
            return false;
        }

        self.cancel_requested.store(false, Ordering::Relaxed);
        self.error_flagged.store(false, Ordering::Relaxed);
        self.busy.store(true, Ordering::Relaxed);
        self.set_shared_state(AnalyzerState::Analyzing);

        let end = match self.analyze_locked(&mut inner) {
            Ok(end) => end,
            Err(err) => {
                warn!(id = %self.id, %err, "analysis failed");
                RunEnd::Failed
            }
        };

        let terminal = match end {
            RunEnd::Done => AnalyzerState::Done,
            RunEnd::Canceled => AnalyzerState::Canceled,
            RunEnd::Failed => AnalyzerState::Error,
        };

        // Transient flags never outlive the run.
        self.cancel_requested.store(false, Ordering::Relaxed);
        self.error_flagged.store(false, Ordering::Relaxed);
        self.busy.store(false, Ordering::Relaxed);
        self.set_shared_state(terminal);
        self.ctx.events.push(
            EventCategory::Status,
            &self.id,
            json!({"state": terminal, "progress": self.lock_shared().progress}),
        );

        end == RunEnd::Done
    }

    /// Request cooperative cancellation of the running analysis.
    pub fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::Relaxed);
    }

    /// Flag the running analysis as failed; it stops at the next frame
    /// boundary.
    pub fn flag_error(&self) {
        self.error_flagged.store(true, Ordering::Relaxed);
    }

    /// Store `roi` and, when launched, estimate the transform from it.
    ///
    /// Returns the flip/turn-adjusted Roi actually used on success.
    pub fn estimate_transform(&self, roi: Roi) -> Option<Roi> {
        let mut inner = self.lock_inner();
        inner.config.roi = Some(roi);
        let adjusted = Self::estimate_locked(&mut inner);
        self.recompute_state(&mut inner);
        adjusted
    }

    /// Seek to a relative position, snapping to the nearest cached frame
    /// within a small radius. Returns the resolved relative position.
    pub fn seek(&self, relative: f64) -> f64 {
        let relative = if relative.is_finite() {
            relative.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let inner = self.lock_inner();
        let resolved = match inner.source.as_ref() {
            None => relative,
            Some(source) => {
                let count = source.info().frame_count;
                let target = (relative * (count.saturating_sub(1)) as f64).round() as u64;
                let snapped = self.nearest_cached(source, target).unwrap_or(target);
                if count > 1 {
                    snapped as f64 / (count - 1) as f64
                } else {
                    0.0
                }
            }
        };
        drop(inner);

        self.lock_shared().position = resolved;
        resolved
    }

    /// Result tables: feature name → (frame index → value).
    pub fn results(&self) -> BTreeMap<String, BTreeMap<u64, f64>> {
        self.lock_inner().results.clone()
    }

    /// The decoded (video-space) frame at `index`, defaulting to the
    /// current position.
    pub fn raw_frame(&self, index: Option<FrameIndex>) -> GaugeResult<Arc<RgbImage>> {
        let inner = self.lock_inner();
        let source = Self::source(&inner)?;
        let index = self.resolve_index(source, index)?;
        let frame = source.frame(index)?;
        self.any_cached.store(true, Ordering::Relaxed);
        Ok(frame)
    }

    /// The frame at `index` warped into design space.
    pub fn warped_frame(&self, index: Option<FrameIndex>) -> GaugeResult<RgbImage> {
        let inner = self.lock_inner();
        let (warped, _) = self.warp_locked(&inner, index)?;
        Ok(warped)
    }

    /// Design-space binary composite of every ready mask's filter output
    /// for the frame at `index`.
    pub fn filtered_frame(&self, index: Option<FrameIndex>) -> GaugeResult<GrayImage> {
        let inner = self.lock_inner();
        let (warped, shape) = self.warp_locked(&inner, index)?;
        let masks = Self::masks(&inner)?;

        let mut out = GrayImage::new(shape.width, shape.height);
        for mask in masks.masks() {
            if mask.skip || !mask.filter.is_ready() {
                continue;
            }
            let binary = mask.filter_frame(&warped)?;
            let crop = mask.crop();
            for (x, y, px) in binary.enumerate_pixels() {
                if px.0[0] != 0 {
                    out.put_pixel(crop.x + x, crop.y + y, image::Luma([255]));
                }
            }
        }
        Ok(out)
    }

    /// The warped frame with the design overlay composited on top.
    pub fn overlaid_frame(&self, index: Option<FrameIndex>) -> GaugeResult<RgbImage> {
        let inner = self.lock_inner();
        let (mut warped, _) = self.warp_locked(&inner, index)?;
        let masks = Self::masks(&inner)?;

        // Overlay pixels are premultiplied RGBA.
        for (dst, src) in warped.pixels_mut().zip(masks.overlay().pixels()) {
            let a = u32::from(src.0[3]);
            for c in 0..3 {
                let over = u32::from(src.0[c]);
                let under = u32::from(dst.0[c]);
                dst.0[c] = (over + under * (255 - a) / 255).min(255) as u8;
            }
        }
        Ok(warped)
    }

    /// Design-space state image: every feature's matched pixels painted
    /// in its display color on black.
    pub fn state_frame(&self, index: Option<FrameIndex>) -> GaugeResult<RgbImage> {
        let inner = self.lock_inner();
        let (warped, shape) = self.warp_locked(&inner, index)?;
        let masks = Self::masks(&inner)?;
        let features = inner
            .features
            .as_ref()
            .ok_or_else(|| GaugeError::validation("analyzer has no feature set"))?;

        let canvas = RgbImage::new(shape.width, shape.height);
        let (_, state) = features.calculate(masks.masks(), &warped, Some(canvas))?;
        state.ok_or_else(|| GaugeError::validation("state image was not produced"))
    }

    /// Route a design-space point to the mask(s) containing it.
    pub fn hit_mask(&self, point: Point) -> GaugeResult<MaskHit> {
        let inner = self.lock_inner();
        Ok(Self::masks(&inner)?.hit(point))
    }

    /// Set the filter center color of the named mask.
    pub fn set_mask_filter(&self, name: &str, color: HsvColor) -> GaugeResult<()> {
        let mut inner = self.lock_inner();
        let masks = inner
            .masks
            .as_mut()
            .ok_or_else(|| GaugeError::validation("analyzer is not launched"))?;
        let mask = masks
            .masks_mut()
            .iter_mut()
            .find(|m| m.name == name)
            .ok_or_else(|| GaugeError::validation(format!("no mask named '{name}'")))?;
        mask.filter.set(color);

        Self::rebuild_features(&mut inner);
        Self::sync_mask_config(&mut inner);
        self.recompute_state(&mut inner);
        Ok(())
    }

    // ---- internals ----

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_shared(&self) -> MutexGuard<'_, SharedStatus> {
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_shared_state(&self, state: AnalyzerState) {
        self.lock_shared().state = state;
    }

    fn source<'a>(inner: &'a Inner) -> GaugeResult<&'a FrameSource> {
        inner
            .source
            .as_ref()
            .ok_or_else(|| GaugeError::validation("analyzer is not launched"))
    }

    fn masks<'a>(inner: &'a Inner) -> GaugeResult<&'a MaskSet> {
        inner
            .masks
            .as_ref()
            .ok_or_else(|| GaugeError::validation("analyzer is not launched"))
    }

    fn can_launch_inner(inner: &Inner) -> bool {
        fn resolvable(path: Option<&Path>) -> bool {
            path.is_some_and(Path::is_file)
        }

        inner.setup_error.is_none()
            && resolvable(inner.config.video_path.as_deref())
            && resolvable(inner.config.design_path.as_deref())
    }

    /// Recompute the authoritative state from the predicates.
    ///
    /// When several predicates hold the most advanced state wins; the
    /// `Error` arm is the defensive fallback for combinations the
    /// predicate definitions rule out.
    fn recompute_state(&self, inner: &mut Inner) -> AnalyzerState {
        let mut shared = self.lock_shared();
        if matches!(shared.state, AnalyzerState::Done | AnalyzerState::Canceled) {
            shared.progress = 0.0;
        }

        let launched = inner.source.is_some() && inner.masks.is_some();
        let can_launch = Self::can_launch_inner(inner);
        let can_filter = launched && inner.transform.is_some();
        let can_analyze =
            can_filter && inner.masks.as_ref().is_some_and(MaskSet::all_ready_or_skipped);

        let next = match (can_analyze, can_filter, launched, can_launch) {
            (true, _, true, _) => AnalyzerState::CanAnalyze,
            (false, true, true, _) => AnalyzerState::CanFilter,
            (false, false, true, _) => AnalyzerState::Launched,
            (false, false, false, true) => AnalyzerState::CanLaunch,
            (false, false, false, false) => AnalyzerState::Incomplete,
            _ => AnalyzerState::Error,
        };

        shared.state = next;
        next
    }

    fn launch_locked(&self, inner: &mut Inner) -> GaugeResult<()> {
        let video_path = inner
            .config
            .video_path
            .clone()
            .ok_or_else(|| GaugeError::setup("no video path configured"))?;
        let design_path = inner
            .config
            .design_path
            .clone()
            .ok_or_else(|| GaugeError::setup("no design path configured"))?;

        let source = FrameSource::open(
            self.ctx.decoder.clone(),
            self.ctx.cache.clone(),
            &video_path,
        )?;
        let dpi = inner.config.dpi.unwrap_or(self.ctx.engine.render_dpi);
        let masks = MaskSet::render(&*self.ctx.renderer, &self.ctx.cache, &design_path, dpi)?;

        inner.source = Some(source);
        inner.masks = Some(masks);
        Self::apply_mask_config(inner);
        Self::estimate_locked(inner);
        Self::rebuild_features(inner);

        if let Some(snapshots) = &self.ctx.snapshots {
            let snapshot = ConfigSnapshot {
                analyzer_id: self.id.clone(),
                video_id: video_path.display().to_string(),
                design_id: design_path.display().to_string(),
                config: serde_json::to_value(&inner.config)
                    .map_err(|e| GaugeError::validation(format!("serialize config: {e}")))?,
            };
            if let Err(err) = snapshots.store(&snapshot) {
                warn!(id = %self.id, %err, "storing config snapshot failed");
            }
        }

        self.ctx.events.push(
            EventCategory::Config,
            &self.id,
            json!({"action": "launch"}),
        );
        Ok(())
    }

    /// Estimate the transform from the stored Roi, flip applied before
    /// turn, both always derived from the unmodified stored corners.
    /// Returns the adjusted Roi on success.
    fn estimate_locked(inner: &mut Inner) -> Option<Roi> {
        let roi = inner.config.roi?;
        let source = inner.source.as_ref()?;
        let masks = inner.masks.as_ref()?;

        let adjusted = roi.adjust(inner.config.flip, inner.config.turn);
        inner.transform =
            PerspectiveTransform::estimate(&adjusted, source.info().shape, masks.shape());
        inner.transform.map(|_| adjusted)
    }

    fn apply_mask_config(inner: &mut Inner) {
        let Some(masks) = inner.masks.as_mut() else {
            return;
        };
        for mask in masks.masks_mut() {
            if let Some(mask_config) = inner.config.masks.get(&mask.name) {
                mask.filter = mask_config.filter.clone();
                mask.skip = mask_config.skip;
            }
        }
    }

    fn sync_mask_config(inner: &mut Inner) {
        let Some(masks) = inner.masks.as_ref() else {
            return;
        };
        for mask in masks.masks() {
            let entry = inner.config.masks.entry(mask.name.clone()).or_default();
            entry.filter = mask.filter.clone();
            entry.skip = mask.skip;
        }
    }

    fn rebuild_features(inner: &mut Inner) {
        let Some(masks) = inner.masks.as_ref() else {
            inner.features = None;
            return;
        };
        let overrides: BTreeMap<String, FeatureKind> = inner
            .config
            .masks
            .iter()
            .filter_map(|(name, c)| c.feature.map(|kind| (name.clone(), kind)))
            .collect();
        let mut features = FeatureSet::new(inner.config.feature, masks.masks(), &overrides);
        features.resolve_colors(masks.masks());
        inner.features = Some(features);
    }

    fn analyze_locked(&self, inner: &mut Inner) -> GaugeResult<RunEnd> {
        let Inner {
            config,
            source,
            masks,
            transform,
            features,
            results,
            ..
        } = &mut *inner;

        let source = source
            .as_ref()
            .ok_or_else(|| GaugeError::validation("analyzer is not launched"))?;
        let masks = masks
            .as_ref()
            .ok_or_else(|| GaugeError::validation("analyzer has no masks"))?;
        let transform = transform
            .as_ref()
            .ok_or_else(|| GaugeError::not_estimated("no Roi has been set"))?;
        let features = features
            .as_ref()
            .ok_or_else(|| GaugeError::validation("analyzer has no feature set"))?;

        let info = source.info();
        let sequence = config.sampling.sequence(info.frame_count, info.fps);
        let total = sequence.len();
        let design_shape = masks.shape();

        for (done, &index) in sequence.iter().enumerate() {
            // Cooperative stop points, once per frame. An issued decode is
            // never interrupted mid-flight.
            if self.cancel_requested.load(Ordering::Relaxed) {
                return Ok(RunEnd::Canceled);
            }
            if self.error_flagged.load(Ordering::Relaxed) {
                return Ok(RunEnd::Failed);
            }

            match source.frame(index) {
                Ok(frame) => {
                    self.any_cached.store(true, Ordering::Relaxed);
                    let warped = transform.warp_image(&frame, design_shape);
                    let (values, _) = features.calculate(masks.masks(), &warped, None)?;
                    for (name, value) in values {
                        results.entry(name).or_default().insert(index.0, value);
                    }
                    self.has_results.store(true, Ordering::Relaxed);
                }
                Err(GaugeError::Decode(msg)) => {
                    warn!(id = %self.id, frame = index.0, reason = %msg, "frame skipped");
                    self.ctx.events.push(
                        EventCategory::Notice,
                        &self.id,
                        json!({"notice": "frame skipped", "frame": index.0, "reason": msg}),
                    );
                }
                Err(other) => return Err(other),
            }

            let mut shared = self.lock_shared();
            shared.progress = (done + 1) as f64 / total as f64;
            shared.position = if info.frame_count > 1 {
                index.0 as f64 / (info.frame_count - 1) as f64
            } else {
                0.0
            };
        }

        Ok(RunEnd::Done)
    }

    fn resolve_index(
        &self,
        source: &FrameSource,
        index: Option<FrameIndex>,
    ) -> GaugeResult<FrameIndex> {
        let count = source.info().frame_count;
        match index {
            Some(index) if index.0 < count => Ok(index),
            Some(index) => Err(GaugeError::validation(format!(
                "frame index {} out of range [0, {count})",
                index.0
            ))),
            None => {
                let position = self.lock_shared().position;
                Ok(FrameIndex(
                    (position * count.saturating_sub(1) as f64).round() as u64,
                ))
            }
        }
    }

    fn warp_locked(
        &self,
        inner: &Inner,
        index: Option<FrameIndex>,
    ) -> GaugeResult<(RgbImage, PixelShape)> {
        let source = Self::source(inner)?;
        let masks = Self::masks(inner)?;
        let transform = inner
            .transform
            .as_ref()
            .ok_or_else(|| GaugeError::not_estimated("no Roi has been set"))?;

        let index = self.resolve_index(source, index)?;
        let frame = source.frame(index)?;
        self.any_cached.store(true, Ordering::Relaxed);
        let shape = masks.shape();
        Ok((transform.warp_image(&frame, shape), shape))
    }

    fn nearest_cached(&self, source: &FrameSource, target: u64) -> Option<u64> {
        let count = source.info().frame_count;
        for distance in 0..=SEEK_SNAP_RADIUS {
            let below = target.checked_sub(distance);
            let above = Some(target + distance).filter(|&i| i < count);
            for candidate in [below, above].into_iter().flatten() {
                if source.is_cached(FrameIndex(candidate)).unwrap_or(false) {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

#[cfg(test)]
#[path = "../../tests/unit/analysis/analyzer.rs"]
mod tests;
