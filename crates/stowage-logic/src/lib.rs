//! Pure storage-placement logic for Stowage.
//!
//! This crate decides where a storable item should go once a move is
//! needed. It holds no engine state: callers report lifecycle events as
//! plain data and the caches here stay consistent incrementally, so a
//! search never rescans the map.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`blocker`] | Per-map bitmap of cells that can never hold storage |
//! | [`capacity`] | Per-region free-slot count and category/stacking index |
//! | [`categorical`] | Generic key → ordered member set registry |
//! | [`cell`] | Grid coordinates and map bounds |
//! | [`config`] | District and sampling tuning, validation |
//! | [`defs`] | Object definitions, passability, precomputed class tags |
//! | [`district`] | Lazy partitioning of large regions into bounded districts |
//! | [`item`] | Storable item snapshots and stacking rules |
//! | [`region`] | Regions, groups, priorities and acceptance policies |
//! | [`search`] | Priority/distance best-cell search and its reference |
//! | [`storage`] | Per-map owner of regions, groups and every cache |
//! | [`tiers`] | Cached priority tiers for the search walk |

pub mod blocker;
pub mod capacity;
pub mod categorical;
pub mod cell;
pub mod config;
pub mod defs;
pub mod district;
pub mod item;
pub mod region;
pub mod search;
pub mod storage;
pub mod tiers;
