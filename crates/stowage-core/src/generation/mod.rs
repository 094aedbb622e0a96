//! Generation - synthetic maps for tests and the headless harness.

mod catalog;
mod map;

pub use catalog::*;
pub use map::*;
