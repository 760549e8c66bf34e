//! Gateway assembly and request dispatch

mod builder;
mod dispatch;

pub use builder::{Bifrost, BifrostBuilder};
pub use dispatch::Gateway;
