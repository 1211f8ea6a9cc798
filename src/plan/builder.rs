use crate::models::{GalaxyDef, ObjectId, PlanetDef, StarDef, UniverseRef, MAX_ORBIT, MIN_ORBIT};

use super::{
    Argument, BuildError, EntityKind, Function, MoveTarget, Operation, OperationHandle,
    OperationSequence,
};

/// Builds operation batches for one deployed universe module.
///
/// Usage:
/// ```rust,ignore
/// let planner = Planner::new(target);
/// let galaxy = GalaxyDef::new("Andromeda").with_star(StarDef::new("Sun", 1));
/// let sequence = planner.build(UniverseRef::New, galaxy)?;
/// ```
#[derive(Debug, Clone)]
pub struct Planner {
    target: MoveTarget,
}

impl Planner {
    pub fn new(target: MoveTarget) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &MoveTarget {
        &self.target
    }

    /// Plan the creation of `galaxy` and its whole subtree, attached to `root`.
    ///
    /// Emission order:
    /// 1. `create_universe()` when `root` is [`UniverseRef::New`]
    /// 2. `new_galaxy(name)`
    /// 3. per star: `new_star`, then `new_planet` + `add_planet_on_star` for each
    ///    planet, then `add_star_on_galaxy`
    /// 4. `add_galaxy_on_universe(universe, galaxy)`
    ///
    /// The definition is validated as it is walked; the first problem aborts the
    /// build and no partial sequence escapes.
    pub fn build(
        &self,
        root: UniverseRef,
        galaxy: GalaxyDef,
    ) -> Result<OperationSequence, BuildError> {
        check_name(EntityKind::Galaxy, &galaxy.name, "galaxy")?;

        let mut seq = OperationSequence::new(root.clone());

        let universe = match root {
            UniverseRef::New => Argument::Result(self.emit(
                &mut seq,
                Function::CreateUniverse,
                vec![],
            )?),
            UniverseRef::Existing(id) => Argument::Object(id),
        };

        let galaxy_handle = self.emit(
            &mut seq,
            Function::NewGalaxy,
            vec![Argument::string(galaxy.name)],
        )?;

        for (i, star) in galaxy.stars.into_iter().enumerate() {
            self.emit_star(&mut seq, galaxy_handle, star, i)?;
        }

        self.emit(
            &mut seq,
            Function::AddGalaxyOnUniverse,
            vec![universe, Argument::Result(galaxy_handle)],
        )?;

        tracing::debug!(
            root = %seq.root(),
            operations = seq.len(),
            "Planned galaxy submission"
        );
        Ok(seq)
    }

    /// Plan an empty universe on its own.
    pub fn build_universe(&self) -> Result<OperationSequence, BuildError> {
        let mut seq = OperationSequence::new(UniverseRef::New);
        self.emit(&mut seq, Function::CreateUniverse, vec![])?;
        Ok(seq)
    }

    /// Plan a star-less galaxy attached to an existing universe.
    pub fn build_named_galaxy(
        &self,
        universe: ObjectId,
        name: impl Into<String>,
    ) -> Result<OperationSequence, BuildError> {
        self.build(UniverseRef::Existing(universe), GalaxyDef::new(name))
    }

    fn emit_star(
        &self,
        seq: &mut OperationSequence,
        galaxy: OperationHandle,
        star: StarDef,
        index: usize,
    ) -> Result<(), BuildError> {
        let path = format!("stars[{}]", index);
        check_name(EntityKind::Star, &star.name, &path)?;
        let orbit = check_orbit(EntityKind::Star, &star.name, &path, star.orbit)?;

        let star_handle = self.emit(
            seq,
            Function::NewStar,
            vec![Argument::string(star.name), Argument::u8(orbit)],
        )?;

        for (j, planet) in star.planets.into_iter().enumerate() {
            let planet_handle = self.emit_planet(seq, planet, &format!("{}.planets[{}]", path, j))?;
            self.emit(
                seq,
                Function::AddPlanetOnStar,
                vec![
                    Argument::Result(star_handle),
                    Argument::Result(planet_handle),
                ],
            )?;
        }

        self.emit(
            seq,
            Function::AddStarOnGalaxy,
            vec![Argument::Result(galaxy), Argument::Result(star_handle)],
        )?;
        Ok(())
    }

    fn emit_planet(
        &self,
        seq: &mut OperationSequence,
        planet: PlanetDef,
        path: &str,
    ) -> Result<OperationHandle, BuildError> {
        check_name(EntityKind::Planet, &planet.name, path)?;
        let orbit = check_orbit(EntityKind::Planet, &planet.name, path, planet.orbit)?;
        self.emit(
            seq,
            Function::NewPlanet,
            vec![Argument::string(planet.name), Argument::u8(orbit)],
        )
    }

    fn emit(
        &self,
        seq: &mut OperationSequence,
        function: Function,
        arguments: Vec<Argument>,
    ) -> Result<OperationHandle, BuildError> {
        seq.push(Operation::call(&self.target, function, arguments))
    }
}

fn check_name(kind: EntityKind, name: &str, path: &str) -> Result<(), BuildError> {
    if name.trim().is_empty() {
        return Err(BuildError::EmptyName {
            kind,
            path: path.to_string(),
        });
    }
    Ok(())
}

/// Validate an orbit slot and narrow it to the one-byte wire width.
fn check_orbit(kind: EntityKind, name: &str, path: &str, orbit: u32) -> Result<u8, BuildError> {
    if !(MIN_ORBIT..=MAX_ORBIT).contains(&orbit) {
        return Err(BuildError::OrbitOutOfRange {
            kind,
            name: name.to_string(),
            path: path.to_string(),
            orbit,
        });
    }
    // In range, so it fits.
    Ok(orbit as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner() -> Planner {
        Planner::new(MoveTarget::new("0x2a".parse().unwrap(), "universe"))
    }

    #[test]
    fn orbit_bounds_are_inclusive() {
        assert_eq!(check_orbit(EntityKind::Planet, "p", "p", 1), Ok(1));
        assert_eq!(check_orbit(EntityKind::Planet, "p", "p", 15), Ok(15));
        assert!(check_orbit(EntityKind::Planet, "p", "p", 0).is_err());
        assert!(check_orbit(EntityKind::Planet, "p", "p", 16).is_err());
    }

    #[test]
    fn whitespace_name_is_empty() {
        let err = planner()
            .build(UniverseRef::New, GalaxyDef::new("   "))
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::EmptyName {
                kind: EntityKind::Galaxy,
                path: "galaxy".to_string()
            }
        );
    }

    #[test]
    fn standalone_universe_is_a_single_call() {
        let seq = planner().build_universe().unwrap();
        assert_eq!(seq.len(), 1);
        assert_eq!(seq.operations()[0].function, Function::CreateUniverse);
        assert!(seq.root().is_new());
    }
}
