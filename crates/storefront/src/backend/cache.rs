//! Cache keys for backend responses.

/// Cache key for slow-changing backend data.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum CacheKey {
    WheelConfig,
}
