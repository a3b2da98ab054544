//! Test doubles recording broker interactions

mod channel;
mod context;

pub use channel::*;
pub use context::*;
