//! Submission graph planning.
//!
//! Turns a definition tree into a flat, dependency-ordered batch of move calls.
//! Nothing here talks to the ledger; a plan is only data until it is submitted.

mod builder;
mod operation;

use std::fmt;

use thiserror::Error;

use crate::models::UniverseRef;

pub use builder::*;
pub use operation::*;

/// Kind of definition node, used in validation messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Galaxy,
    Star,
    Planet,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Galaxy => "galaxy",
            Self::Star => "star",
            Self::Planet => "planet",
        })
    }
}

/// A malformed definition graph or operation list. Raised before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("{kind} at {path} has an empty name")]
    EmptyName { kind: EntityKind, path: String },

    #[error("{kind} {name:?} at {path} has orbit {orbit}, expected 1..=15")]
    OrbitOutOfRange {
        kind: EntityKind,
        name: String,
        path: String,
        orbit: u32,
    },

    #[error("operation {position} references {handle}, which is not defined before it")]
    DanglingReference {
        position: usize,
        handle: OperationHandle,
    },

    #[error("operation {position} references {handle}, but {function} returns no value")]
    NotAValue {
        position: usize,
        handle: OperationHandle,
        function: Function,
    },

    #[error("operation {position} calls {function} with {found} arguments, expected {expected}")]
    ArityMismatch {
        position: usize,
        function: Function,
        expected: usize,
        found: usize,
    },

    #[error("operation {position} argument {index} of {function} is {found}, expected {expected}")]
    ArgumentKind {
        position: usize,
        function: Function,
        index: usize,
        expected: ValueKind,
        found: String,
    },

    #[error("operation {position} attaches the galaxy to {found}, but the sequence targets {root}")]
    RootMismatch {
        position: usize,
        root: UniverseRef,
        found: Argument,
    },

    #[error("sequence targets a new universe but never calls create_universe")]
    MissingUniverse,
}
