//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Bind every gateway listener → Spawn servers and sweepers → Await
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain requests → Flush cache writes
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!
//! Maintenance (maintenance.rs):
//!     Periodic sweep of idle rate-limit records and expired cache entries
//! ```
//!
//! # Design Decisions
//! - All listeners bind before any traffic is served
//! - A bind failure on one gateway aborts the whole process

pub mod maintenance;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use maintenance::Sweeper;
pub use shutdown::Shutdown;
pub use startup::StartupError;
