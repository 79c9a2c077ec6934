//! Clinic HTTP API.
//!
//! Public routes serve the patient-facing review and complaint flows;
//! staff and admin routes sit behind bearer-token middleware. The router
//! is composable: `api_router()` returns a `Router` that `server` mounts
//! with CORS and tracing layers.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod types;

pub use router::api_router;
pub use types::ApiContext;
