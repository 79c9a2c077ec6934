//! API endpoint handlers.
//!
//! Each module covers one area of the clinic API. Handlers keep database
//! guards inside a block and release them before any `.await`.

pub mod admin;
pub mod catalog;
pub mod complaints;
pub mod dashboard;
pub mod images;
pub mod messenger;
pub mod prompts;
pub mod reviews;
pub mod session;
pub mod users;
