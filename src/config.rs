use std::path::PathBuf;
use std::time::Duration;

/// Engine-wide configuration.
///
/// Constructed once by the embedding process and passed by reference into
/// every component that needs it. There is no global settings object;
/// cache limits, timeouts and render defaults all flow through this value.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Optional directory backing the compute cache. `None` keeps the
    /// cache memory-only.
    pub cache_dir: Option<PathBuf>,
    /// Byte budget for cached artifacts; least-recently-touched entries
    /// are evicted past this limit.
    pub cache_limit_bytes: u64,
    /// How long a reader waits on an in-flight cache key before falling
    /// back to direct (duplicate) computation.
    pub cache_block_timeout: Duration,
    /// Sleep interval between polls of an in-flight cache key.
    pub cache_poll_interval: Duration,
    /// Wipe a corrupt cache directory and retry opening once instead of
    /// failing initialization.
    pub wipe_cache_on_corruption: bool,
    /// Default DPI at which designs are rendered.
    pub render_dpi: f32,
    /// Interval at which the analysis queue worker re-checks its pause
    /// flag.
    pub queue_poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            cache_limit_bytes: 2 * 1024 * 1024 * 1024,
            cache_block_timeout: Duration::from_secs(10),
            cache_poll_interval: Duration::from_millis(10),
            wipe_cache_on_corruption: true,
            render_dpi: 400.0,
            queue_poll_interval: Duration::from_millis(500),
        }
    }
}
