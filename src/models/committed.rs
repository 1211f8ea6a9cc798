use serde::{Deserialize, Serialize};

use super::ids::ObjectId;

/// A planet as read back from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Planet {
    pub name: String,
    pub orbit: u8,
}

/// A star as read back from the ledger.
///
/// `alive` is the liveness flag the ledger maintains; this crate never changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Star {
    pub name: String,
    pub orbit: u8,
    pub alive: bool,
    pub planets: Vec<Planet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Galaxy {
    pub name: String,
    pub stars: Vec<Star>,
}

/// A persisted universe snapshot.
///
/// Immutable view of ledger state at read time. Galaxies keep ledger order, which
/// reflects the order in which they were attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Universe {
    pub id: ObjectId,
    pub galaxies: Vec<Galaxy>,
}

impl Universe {
    pub fn star_count(&self) -> usize {
        self.galaxies.iter().map(|g| g.stars.len()).sum()
    }

    pub fn planet_count(&self) -> usize {
        self.galaxies
            .iter()
            .flat_map(|g| g.stars.iter())
            .map(|s| s.planets.len())
            .sum()
    }

    pub fn galaxy(&self, name: &str) -> Option<&Galaxy> {
        self.galaxies.iter().find(|g| g.name == name)
    }
}
