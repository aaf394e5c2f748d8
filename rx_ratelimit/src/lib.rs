pub mod bucket;
pub mod error;
pub mod key;
pub mod limiter;
pub mod time;

pub use bucket::Bucket;
pub use error::RateLimitError;
pub use error::Result;
pub use key::RouteKey;
pub use limiter::BucketLimiter;
pub use limiter::BucketReport;
pub use time::parse_reset_after;
pub use time::secs_to_duration;
