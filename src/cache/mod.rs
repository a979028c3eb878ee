//! Response caching subsystem.
//!
//! # Data Flow
//! ```text
//! Admitted GET request:
//!     → fetcher.rs (derive key, look up, fetch on miss)
//!     → store.rs (TTL entries keyed by upstream URL)
//! ```
//!
//! # Design Decisions
//! - The proxy imposes its own short TTL instead of upstream directives
//! - Only successful upstream responses are stored
//! - Writes happen after the response is handed back, on a tracked task

pub mod fetcher;
pub mod store;

pub use fetcher::{CacheAsideFetcher, CacheStatus, FetcherError};
pub use store::{CacheKey, CachedResponse, MemoryStore, ResponseStore};
