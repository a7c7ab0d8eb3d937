//! Rate limiting logic and state management.

mod guard;
mod limiter;
mod presets;
mod window;

pub use guard::with_rate_limit;
pub use limiter::{RateLimitStatus, RateLimiter, DEFAULT_STORAGE_KEY};
pub use presets::{BucketKey, OperationCategory, PresetTable};
pub use window::{RateLimitConfig, RateLimitEntry, TimeWindow};
