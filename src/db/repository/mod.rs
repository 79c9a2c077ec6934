//! Repository layer: entity-scoped database operations.
//!
//! Free functions over a borrowed `Connection`, one sub-module per entity
//! family. Reference data shares its list/lookup/reorder logic through the
//! `ReferenceEntity` trait in `reference`.

mod catalog;
mod complaint;
mod doctor;
mod owner;
mod prompt;
mod reference;
mod review;
mod user;

pub use catalog::*;
pub use complaint::*;
pub use doctor::*;
pub use owner::*;
pub use prompt::*;
pub use reference::*;
pub use review::*;
pub use user::*;

use chrono::{NaiveDateTime, Timelike, Utc};

/// Current UTC time truncated to whole seconds, as stored in `created_at`.
pub(crate) fn now_utc() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

/// `?, ?, ?` placeholder list for an `IN (...)` clause.
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
