use std::path::Path;
use std::sync::Arc;

use image::RgbImage;

use crate::cache::key::ComputeKey;
use crate::cache::store::{CachedArtifact, ComputeCache};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{GaugeError, GaugeResult};
use crate::video::decode::{VideoDecoder, VideoInfo};

/// Frame access for one opened video, memoized through the shared
/// compute cache.
///
/// Decoding is delegated to the [`VideoDecoder`] collaborator; every
/// decoded frame is stored under a `(operation, path, index)` cache key,
/// so repeated seeks and re-analysis hit memory instead of the decoder.
pub struct FrameSource {
    decoder: Arc<dyn VideoDecoder>,
    cache: Arc<ComputeCache>,
    info: VideoInfo,
}

impl FrameSource {
    /// Open `path` through `decoder` and validate its metadata.
    pub fn open(
        decoder: Arc<dyn VideoDecoder>,
        cache: Arc<ComputeCache>,
        path: &Path,
    ) -> GaugeResult<Self> {
        let info = decoder.open(path)?;
        if info.frame_count == 0 {
            return Err(GaugeError::setup(format!(
                "video '{}' has no frames",
                path.display()
            )));
        }
        Ok(Self {
            decoder,
            cache,
            info,
        })
    }

    /// Immutable metadata of the opened video.
    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    /// Cache key addressing the decoded frame at `index`.
    pub fn frame_key(&self, index: FrameIndex) -> ComputeKey {
        ComputeKey::new(
            "decode_frame",
            [
                self.info.source_path.display().to_string(),
                index.0.to_string(),
            ],
        )
    }

    /// Decode (or fetch) the frame at `index`.
    pub fn frame(&self, index: FrameIndex) -> GaugeResult<Arc<RgbImage>> {
        if index.0 >= self.info.frame_count {
            return Err(GaugeError::validation(format!(
                "frame index {} out of range [0, {})",
                index.0, self.info.frame_count
            )));
        }

        self.cache
            .get_or_compute(&self.frame_key(index), || {
                self.decoder
                    .decode(&self.info, index)
                    .map(|img| CachedArtifact::Frame(Arc::new(img)))
            })?
            .into_frame()
    }

    /// True when the frame at `index` is already cached.
    pub fn is_cached(&self, index: FrameIndex) -> GaugeResult<bool> {
        self.cache.contains(&self.frame_key(index))
    }
}
