/// Convenience result type used across Framegauge.
pub type GaugeResult<T> = Result<T, GaugeError>;

/// Top-level error taxonomy used by engine APIs.
#[derive(thiserror::Error, Debug)]
pub enum GaugeError {
    /// A launch-time precondition failed: bad paths, zero-frame video,
    /// design render failure. Fatal to `launch()`, surfaced as
    /// `can_launch() == false` plus a logged reason.
    #[error("setup error: {0}")]
    Setup(String),

    /// Invalid user-provided configuration or argument data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Use of a closed compute cache. A programming error; propagates.
    #[error("cache access error: {0}")]
    CacheAccess(String),

    /// A perspective transform was used before a Roi was set.
    #[error("transform not estimated: {0}")]
    NotEstimated(String),

    /// A single frame failed to decode. Recovered locally during
    /// analysis (the frame is skipped with a notice).
    #[error("frame decode error: {0}")]
    Decode(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GaugeError {
    /// Build a [`GaugeError::Setup`] value.
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    /// Build a [`GaugeError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`GaugeError::CacheAccess`] value.
    pub fn cache_access(msg: impl Into<String>) -> Self {
        Self::CacheAccess(msg.into())
    }

    /// Build a [`GaugeError::NotEstimated`] value.
    pub fn not_estimated(msg: impl Into<String>) -> Self {
        Self::NotEstimated(msg.into())
    }

    /// Build a [`GaugeError::Decode`] value.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
