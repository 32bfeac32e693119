//! Cache manager component over a pluggable key/value store.
//!
//! `CacheManager` reads the `cache` configuration section:
//!
//! ```yaml
//! cache:
//!   store: memory
//!   options:
//!     max: 1000   # entries
//!     ttl: 60     # seconds
//! ```

mod manager;
mod store;

pub use manager::{CacheConfig, CacheError, CacheManager, CacheOptions};
pub use store::{CacheStore, MemoryStore};
