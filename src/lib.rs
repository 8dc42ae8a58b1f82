//! Framegauge measures quantitative features from a video by comparing each
//! frame, after a perspective correction, against a vector design whose
//! layers define regions of interest.
//!
//! The public API is analyzer-oriented:
//!
//! - Open a shared [`ComputeCache`] and construct an [`Analyzer`]
//! - Configure it (video/design paths, [`Roi`], filters), then `launch()`
//! - Run `analyze()` directly or queue several analyzers on an
//!   [`AnalysisQueue`]
//!
//! Transport, persistence schema and UI delivery are out of scope; the
//! collaborator seams ([`VideoDecoder`], [`DesignRenderer`], [`EventSink`],
//! [`SnapshotStore`]) are traits an outer layer implements or reuses.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Analyzer state machine and the batch analysis queue.
pub mod analysis;
/// Memoizing compute cache with in-flight deduplication.
pub mod cache;
/// Engine-wide configuration value.
pub mod config;
/// Design rendering and mask extraction.
pub mod design;
/// Event sink collaborator seam.
pub mod events;
/// Feature extraction over masked, filtered frames.
pub mod features;
/// HSV color filtering and binary morphology.
pub mod filter;
/// Region-of-interest geometry and perspective transforms.
pub mod geometry;
/// Config snapshot persistence collaborator seam.
pub mod snapshot;
/// Video metadata, decoding and the cached frame source.
pub mod video;

pub use crate::foundation::core::{Fps, FrameIndex, PixelShape, Point, Rect, RelPoint, Vec2};
pub use crate::foundation::error::{GaugeError, GaugeResult};

pub use crate::analysis::analyzer::{Analyzer, AnalyzerState, AnalyzerStatus, EngineContext};
pub use crate::analysis::config::{AnalyzerConfig, ConfigPatch, FrameSampling, MaskConfig};
pub use crate::analysis::queue::{AnalysisQueue, QueueState};
pub use crate::cache::key::ComputeKey;
pub use crate::cache::store::{CachedArtifact, ComputeCache};
pub use crate::config::EngineConfig;
pub use crate::design::mask::{CropRect, Mask, MaskHit, MaskSet};
pub use crate::design::render::{DesignRender, DesignRenderer, NamedLayer, SvgRenderer};
pub use crate::events::{Event, EventCategory, EventSink, MemoryEventSink, TracingEventSink};
pub use crate::features::measure::{Feature, FeatureKind, FeatureSet};
pub use crate::filter::hsv::{ColorFilter, HsvColor, HsvWindow};
pub use crate::geometry::perspective::PerspectiveTransform;
pub use crate::geometry::roi::{Flip, Roi};
pub use crate::snapshot::{ConfigSnapshot, JsonSnapshotStore, SnapshotStore};
pub use crate::video::decode::{FfmpegDecoder, VideoDecoder, VideoInfo};
pub use crate::video::source::FrameSource;
