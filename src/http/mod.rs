//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, dispatch)
//!     → request.rs (assign request ID)
//!     → [rate limiter admits or rejects]
//!     → [cache-aside fetcher answers from cache or upstream]
//!     → response.rs (error bodies) + cors.rs (CORS headers)
//!     → Send to client
//! ```

pub mod cors;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use response::ProxyError;
pub use server::{build_router, GatewayServer, GatewayState};
