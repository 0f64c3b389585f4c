//! Core types shared by every layer.
//!
//! - Protocol constants
//! - Error types
//! - Content names and production protocols
//! - Time sources
//! - Collaborator traits (portal, read callback)

mod constants;
mod error;
mod name;
mod protocol;
mod time;
mod traits;

pub use constants::*;
pub use error::*;
pub use name::*;
pub use protocol::*;
pub use time::*;
pub use traits::*;
