//! Infrastructure layer: platform API access, response caching, retry policy

pub mod api;
pub mod cache;
pub mod resilience;

pub use api::{FileSource, PlatformClient, PlatformDataSource};
pub use cache::{CacheStats, FileCache, ProgressStore};
pub use resilience::{retry_with_backoff, RetryConfig};
