use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ids::{IdError, ObjectId};

/// A planet to be created. Leaf of the definition tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanetDef {
    pub name: String,
    /// Orbit slot, valid in `1..=15`. Checked when the plan is built.
    pub orbit: u32,
}

impl PlanetDef {
    pub fn new(name: impl Into<String>, orbit: u32) -> Self {
        Self {
            name: name.into(),
            orbit,
        }
    }
}

/// A star to be created together with the planets attached to it.
///
/// Orbit slots are not required to be unique among siblings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarDef {
    pub name: String,
    pub orbit: u32,
    #[serde(default)]
    pub planets: Vec<PlanetDef>,
}

impl StarDef {
    pub fn new(name: impl Into<String>, orbit: u32) -> Self {
        Self {
            name: name.into(),
            orbit,
            planets: Vec::new(),
        }
    }

    /// Append a planet, builder style.
    pub fn with_planet(mut self, planet: PlanetDef) -> Self {
        self.planets.push(planet);
        self
    }
}

/// A galaxy to be created, with its stars in attach order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalaxyDef {
    pub name: String,
    #[serde(default)]
    pub stars: Vec<StarDef>,
}

impl GalaxyDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stars: Vec::new(),
        }
    }

    pub fn with_star(mut self, star: StarDef) -> Self {
        self.stars.push(star);
        self
    }

    /// Total number of planets across all stars.
    pub fn planet_count(&self) -> usize {
        self.stars.iter().map(|s| s.planets.len()).sum()
    }
}

/// Destination of a new galaxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniverseRef {
    /// Create a fresh universe in the same submission.
    New,
    /// Attach to a universe that already exists on the ledger.
    Existing(ObjectId),
}

impl UniverseRef {
    pub fn existing_id(&self) -> Option<&ObjectId> {
        match self {
            Self::New => None,
            Self::Existing(id) => Some(id),
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::New)
    }
}

impl fmt::Display for UniverseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => f.write_str("new"),
            Self::Existing(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for UniverseRef {
    type Err = IdError;

    /// Accepts `new` or an object id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("new") {
            Ok(Self::New)
        } else {
            s.parse().map(Self::Existing)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn galaxy_def_parses_with_missing_sequences() {
        let galaxy: GalaxyDef = serde_json::from_str(
            r#"{"name":"Andromeda","stars":[{"name":"Sun","orbit":3}]}"#,
        )
        .unwrap();

        assert_eq!(galaxy.stars.len(), 1);
        assert!(galaxy.stars[0].planets.is_empty());
    }

    #[test]
    fn universe_ref_parses_sentinel_and_ids() {
        assert_eq!("new".parse::<UniverseRef>().unwrap(), UniverseRef::New);
        assert_eq!("NEW".parse::<UniverseRef>().unwrap(), UniverseRef::New);

        let existing: UniverseRef = "0xAB".parse().unwrap();
        assert_eq!(existing.existing_id(), Some(&ObjectId::from_u128(0xab)));
        assert!("nope".parse::<UniverseRef>().is_err());
    }

    #[test]
    fn planet_count_sums_all_stars() {
        let galaxy = GalaxyDef::new("Milky Way")
            .with_star(StarDef::new("Sun", 1).with_planet(PlanetDef::new("Earth", 3)))
            .with_star(
                StarDef::new("Sirius", 2)
                    .with_planet(PlanetDef::new("A", 1))
                    .with_planet(PlanetDef::new("B", 2)),
            );
        assert_eq!(galaxy.planet_count(), 3);
    }
}
