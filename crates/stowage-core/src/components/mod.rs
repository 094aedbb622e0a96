//! Component definitions for the per-map ECS mirror.
//!
//! Components are pure data attached to host objects. The engine keeps
//! them in step with the inbound lifecycle events; nothing here has
//! behavior of its own.

mod objects;
mod storage;

pub use objects::*;
pub use storage::*;
