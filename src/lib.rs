//! Atomic submission planning and ownership reconstruction for universe graphs
//! stored on a ledger.
//!
//! - [`plan`] turns a galaxy definition into one dependency-ordered batch.
//! - [`submit`] sends that batch atomically and re-reads the result.
//! - [`reconstruct`] normalizes ledger object content into [`models`].
//! - [`discovery`] infers which universes an account created from its history.

pub mod config;
pub mod devnet;
pub mod discovery;
pub mod ledger;
pub mod models;
pub mod plan;
pub mod reconstruct;
pub mod submit;
pub mod tree_render;
