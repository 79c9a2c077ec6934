//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Auth validator: bearer JWT, user lookup, admin check
//! 2. Audit logger: runs after auth so it can tag the user id

pub mod audit;
pub mod auth;
