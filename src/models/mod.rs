//! Domain records shared by the repository, API and notification layers.

pub mod catalog;
pub mod complaint;
pub mod enums;
pub mod filters;
pub mod owner;
pub mod prompt;
pub mod review;
pub mod user;

pub use catalog::*;
pub use complaint::*;
pub use enums::*;
pub use filters::*;
pub use owner::*;
pub use prompt::*;
pub use review::*;
pub use user::*;
