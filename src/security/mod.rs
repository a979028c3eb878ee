//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming GET request:
//!     → headers.rs (resolve client identity)
//!     → rate_limit.rs (sliding window, soft limit / hard block)
//!     → Pass to cache-aside fetch
//! ```
//!
//! # Design Decisions
//! - Limiting is per process; instances do not coordinate
//! - Blocked attempts are not recorded as hits
//! - No trust in client input beyond the configured identity headers

pub mod headers;
pub mod rate_limit;

pub use headers::ClientIdentity;
pub use rate_limit::{Decision, RateLimitPolicy, RateLimitStore, SlidingWindowLimiter};
