//! Domain models for universe graphs.
//!
//! # Core Concepts
//!
//! ## Definitions
//!
//! - [`GalaxyDef`], [`StarDef`], [`PlanetDef`]: in-memory descriptions of objects that do
//!   not exist on the ledger yet. A definition graph is a strict tree and is consumed
//!   exactly once when it is turned into an operation plan.
//! - [`UniverseRef`]: where a new galaxy lands, either a brand new universe or one that
//!   is already persisted.
//!
//! ## Committed Snapshots
//!
//! Read-only values reconstructed from ledger state:
//!
//! - [`Universe`]: a persisted container with its identifier and galaxies.
//! - [`Galaxy`], [`Star`], [`Planet`]: nested snapshots in ledger (attach) order.
//!
//! Identifiers ([`ObjectId`], [`Address`]) are assigned by the ledger and never minted here.

mod committed;
mod defs;
mod ids;

pub use committed::*;
pub use defs::*;
pub use ids::*;

/// Lowest orbit slot a star or planet may occupy.
pub const MIN_ORBIT: u32 = 1;

/// Highest orbit slot a star or planet may occupy.
pub const MAX_ORBIT: u32 = 15;
