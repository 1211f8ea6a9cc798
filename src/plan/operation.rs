use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{ObjectId, UniverseRef};

use super::BuildError;

/// Forward reference to the value produced by an operation earlier in the same batch.
///
/// A handle is the index of the producing operation. It only becomes a concrete object
/// id when the ledger executes the batch, so it is never resolved locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationHandle(usize);

impl OperationHandle {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("#{}", self.0))
    }
}

/// Package and module that host the universe entry functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveTarget {
    pub package: ObjectId,
    pub module: String,
}

impl MoveTarget {
    pub fn new(package: ObjectId, module: impl Into<String>) -> Self {
        Self {
            package,
            module: module.into(),
        }
    }

    /// Fully qualified name of a function in this module.
    pub fn function_path(&self, function: Function) -> String {
        format!("{}::{}::{}", self.package, self.module, function.as_str())
    }

    /// Fully qualified type tag of a struct in this module.
    pub fn type_tag(&self, name: &str) -> String {
        format!("{}::{}::{}", self.package, self.module, name)
    }

    /// Type tag of the root container, used to recognize owned universes.
    pub fn universe_type(&self) -> String {
        self.type_tag("Universe")
    }
}

/// Entry functions of the universe module.
///
/// The names are a stable contract with the on-ledger module and with ownership
/// discovery, which matches them exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Function {
    CreateUniverse,
    NewGalaxy,
    NewStar,
    NewPlanet,
    AddPlanetOnStar,
    AddStarOnGalaxy,
    AddGalaxyOnUniverse,
}

impl Function {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateUniverse => "create_universe",
            Self::NewGalaxy => "new_galaxy",
            Self::NewStar => "new_star",
            Self::NewPlanet => "new_planet",
            Self::AddPlanetOnStar => "add_planet_on_star",
            Self::AddStarOnGalaxy => "add_star_on_galaxy",
            Self::AddGalaxyOnUniverse => "add_galaxy_on_universe",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "create_universe" => Some(Self::CreateUniverse),
            "new_galaxy" => Some(Self::NewGalaxy),
            "new_star" => Some(Self::NewStar),
            "new_planet" => Some(Self::NewPlanet),
            "add_planet_on_star" => Some(Self::AddPlanetOnStar),
            "add_star_on_galaxy" => Some(Self::AddStarOnGalaxy),
            "add_galaxy_on_universe" => Some(Self::AddGalaxyOnUniverse),
            _ => None,
        }
    }

    /// Kinds of the arguments this call takes, in order.
    pub fn parameters(&self) -> &'static [ValueKind] {
        match self {
            Self::CreateUniverse => &[],
            Self::NewGalaxy => &[ValueKind::String],
            Self::NewStar | Self::NewPlanet => &[ValueKind::String, ValueKind::U8],
            Self::AddPlanetOnStar => &[ValueKind::Star, ValueKind::Planet],
            Self::AddStarOnGalaxy => &[ValueKind::Galaxy, ValueKind::Star],
            Self::AddGalaxyOnUniverse => &[ValueKind::Universe, ValueKind::Galaxy],
        }
    }

    /// Kind of the value this call returns, if any.
    pub fn produces(&self) -> Option<ValueKind> {
        match self {
            Self::CreateUniverse => Some(ValueKind::Universe),
            Self::NewGalaxy => Some(ValueKind::Galaxy),
            Self::NewStar => Some(ValueKind::Star),
            Self::NewPlanet => Some(ValueKind::Planet),
            Self::AddPlanetOnStar | Self::AddStarOnGalaxy | Self::AddGalaxyOnUniverse => None,
        }
    }

    /// Whether later operations may reference this call's result.
    pub fn produces_value(&self) -> bool {
        self.produces().is_some()
    }

    pub fn arity(&self) -> usize {
        self.parameters().len()
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a call parameter accepts or a call result is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    U8,
    Universe,
    Galaxy,
    Star,
    Planet,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::String => "string",
            Self::U8 => "u8",
            Self::Universe => "Universe",
            Self::Galaxy => "Galaxy",
            Self::Star => "Star",
            Self::Planet => "Planet",
        })
    }
}

/// A pure (non-object) argument value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PureValue {
    String(String),
    U8(u8),
}

impl PureValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::String(_) => ValueKind::String,
            Self::U8(_) => ValueKind::U8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Argument {
    Pure(PureValue),
    /// Result of an earlier operation in the same batch.
    Result(OperationHandle),
    /// An object that already exists on the ledger.
    Object(ObjectId),
}

impl Argument {
    pub fn string(value: impl Into<String>) -> Self {
        Self::Pure(PureValue::String(value.into()))
    }

    pub fn u8(value: u8) -> Self {
        Self::Pure(PureValue::U8(value))
    }

    pub fn handle(&self) -> Option<OperationHandle> {
        match self {
            Self::Result(handle) => Some(*handle),
            _ => None,
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pure(PureValue::String(s)) => write!(f, "{:?}", s),
            Self::Pure(PureValue::U8(n)) => write!(f, "{}u8", n),
            Self::Result(handle) => write!(f, "{}", handle),
            Self::Object(id) => write!(f, "@{}", id.short()),
        }
    }
}

/// A single move call in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub package: ObjectId,
    pub module: String,
    pub function: Function,
    pub arguments: Vec<Argument>,
}

impl Operation {
    pub fn call(target: &MoveTarget, function: Function, arguments: Vec<Argument>) -> Self {
        Self {
            package: target.package.clone(),
            module: target.module.clone(),
            function,
            arguments,
        }
    }

    /// Handles this operation depends on.
    pub fn references(&self) -> impl Iterator<Item = OperationHandle> + '_ {
        self.arguments.iter().filter_map(Argument::handle)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}(", self.module, self.function)?;
        for (i, arg) in self.arguments.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", arg)?;
        }
        f.write_str(")")
    }
}

/// An ordered batch of operations submitted as one atomic unit.
///
/// Every handle in the sequence points strictly backwards at an operation that
/// produces a value of the kind its parameter takes, and every galaxy attach
/// targets the declared root. The constructors enforce this, so a sequence that
/// exists is valid. Deserialization goes through the same check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SequenceParts")]
pub struct OperationSequence {
    root: UniverseRef,
    operations: Vec<Operation>,
}

#[derive(Deserialize)]
struct SequenceParts {
    root: UniverseRef,
    operations: Vec<Operation>,
}

impl TryFrom<SequenceParts> for OperationSequence {
    type Error = BuildError;

    fn try_from(parts: SequenceParts) -> Result<Self, Self::Error> {
        Self::from_operations(parts.root, parts.operations)
    }
}

impl OperationSequence {
    pub(crate) fn new(root: UniverseRef) -> Self {
        Self {
            root,
            operations: Vec::new(),
        }
    }

    /// Adopt an externally assembled operation list, rejecting any forward or
    /// dangling reference, argument of the wrong kind, or attach to a universe
    /// other than `root`.
    pub fn from_operations(
        root: UniverseRef,
        operations: Vec<Operation>,
    ) -> Result<Self, BuildError> {
        let sequence = Self { root, operations };
        sequence.validate()?;
        Ok(sequence)
    }

    /// Append an operation and return the handle to its result.
    pub(crate) fn push(&mut self, operation: Operation) -> Result<OperationHandle, BuildError> {
        let position = self.operations.len();
        check_operation(&self.root, &self.operations, position, &operation)?;
        self.operations.push(operation);
        Ok(OperationHandle(position))
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        for (position, operation) in self.operations.iter().enumerate() {
            check_operation(&self.root, &self.operations[..position], position, operation)?;
        }
        if self.root.is_new() && self.count(Function::CreateUniverse) == 0 {
            return Err(BuildError::MissingUniverse);
        }
        Ok(())
    }

    pub fn root(&self) -> &UniverseRef {
        &self.root
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn get(&self, handle: OperationHandle) -> Option<&Operation> {
        self.operations.get(handle.0)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }

    /// Number of calls to `function` in the batch.
    pub fn count(&self, function: Function) -> usize {
        self.operations
            .iter()
            .filter(|op| op.function == function)
            .count()
    }
}

impl<'a> IntoIterator for &'a OperationSequence {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

impl fmt::Display for OperationSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "target: {}", self.root)?;
        for (i, op) in self.operations.iter().enumerate() {
            writeln!(f, "{:>4}  {}", OperationHandle(i), op)?;
        }
        Ok(())
    }
}

/// `earlier` holds exactly the operations before `position`.
fn check_operation(
    root: &UniverseRef,
    earlier: &[Operation],
    position: usize,
    operation: &Operation,
) -> Result<(), BuildError> {
    let function = operation.function;
    let parameters = function.parameters();
    if operation.arguments.len() != parameters.len() {
        return Err(BuildError::ArityMismatch {
            position,
            function,
            expected: parameters.len(),
            found: operation.arguments.len(),
        });
    }

    for (index, (argument, &expected)) in operation.arguments.iter().zip(parameters).enumerate() {
        let mismatch = |found: String| BuildError::ArgumentKind {
            position,
            function,
            index,
            expected,
            found,
        };
        let found = match argument {
            Argument::Pure(value) => value.kind(),
            Argument::Result(handle) => {
                let producer = earlier
                    .get(handle.index())
                    .ok_or(BuildError::DanglingReference { position, handle: *handle })?;
                producer.function.produces().ok_or(BuildError::NotAValue {
                    position,
                    handle: *handle,
                    function: producer.function,
                })?
            }
            // Only universes exist on the ledger as standalone objects.
            Argument::Object(_) if expected == ValueKind::Universe => continue,
            Argument::Object(_) => return Err(mismatch("object".to_string())),
        };
        if found != expected {
            return Err(mismatch(found.to_string()));
        }
    }

    if function == Function::AddGalaxyOnUniverse {
        check_attach_root(root, position, &operation.arguments[0])?;
    }
    Ok(())
}

/// The universe argument of a galaxy attach must be the declared root: the
/// batch's own `create_universe` result for a new root, the root object otherwise.
fn check_attach_root(
    root: &UniverseRef,
    position: usize,
    universe: &Argument,
) -> Result<(), BuildError> {
    let matches = match (root, universe) {
        (UniverseRef::New, Argument::Result(_)) => true,
        (UniverseRef::Existing(id), Argument::Object(object)) => id == object,
        _ => false,
    };
    if !matches {
        return Err(BuildError::RootMismatch {
            position,
            root: root.clone(),
            found: universe.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> MoveTarget {
        MoveTarget::new("0x2a".parse().unwrap(), "universe")
    }

    #[test]
    fn function_names_round_trip() {
        for f in [
            Function::CreateUniverse,
            Function::NewGalaxy,
            Function::NewStar,
            Function::NewPlanet,
            Function::AddPlanetOnStar,
            Function::AddStarOnGalaxy,
            Function::AddGalaxyOnUniverse,
        ] {
            assert_eq!(Function::from_str(f.as_str()), Some(f));
        }
        assert_eq!(Function::from_str("new_universe"), None);
    }

    #[test]
    fn push_rejects_self_reference() {
        let mut seq = OperationSequence::new(UniverseRef::New);
        let err = seq
            .push(Operation::call(
                &target(),
                Function::AddPlanetOnStar,
                vec![
                    Argument::Result(OperationHandle::new(0)),
                    Argument::Result(OperationHandle::new(0)),
                ],
            ))
            .unwrap_err();

        assert!(matches!(err, BuildError::DanglingReference { position: 0, .. }));
        assert!(seq.is_empty());
    }

    #[test]
    fn display_lists_operations_with_handles() {
        let t = target();
        let mut seq = OperationSequence::new(UniverseRef::New);
        let u = seq
            .push(Operation::call(&t, Function::CreateUniverse, vec![]))
            .unwrap();
        let g = seq
            .push(Operation::call(
                &t,
                Function::NewGalaxy,
                vec![Argument::string("Andromeda")],
            ))
            .unwrap();
        seq.push(Operation::call(
            &t,
            Function::AddGalaxyOnUniverse,
            vec![Argument::Result(u), Argument::Result(g)],
        ))
        .unwrap();

        let text = seq.to_string();
        assert_eq!(
            text,
            "target: new\n  #0  universe::create_universe()\n  #1  universe::new_galaxy(\"Andromeda\")\n  #2  universe::add_galaxy_on_universe(#0, #1)\n"
        );
    }

    #[test]
    fn deserialize_rejects_forward_reference() {
        let json = serde_json::json!({
            "root": "new",
            "operations": [{
                "package": "0x2a",
                "module": "universe",
                "function": "add_galaxy_on_universe",
                "arguments": [{"Result": 1}, {"Result": 0}]
            }]
        });
        let err = serde_json::from_value::<OperationSequence>(json).unwrap_err();
        assert!(err.to_string().contains("not defined before it"));
    }

    #[test]
    fn deserialize_rejects_attach_to_another_universe() {
        let json = serde_json::json!({
            "root": { "existing": "0xa" },
            "operations": [{
                "package": "0x2a",
                "module": "universe",
                "function": "new_galaxy",
                "arguments": [{"Pure": {"String": "G"}}]
            }, {
                "package": "0x2a",
                "module": "universe",
                "function": "add_galaxy_on_universe",
                "arguments": [{"Object": "0xb"}, {"Result": 0}]
            }]
        });
        let err = serde_json::from_value::<OperationSequence>(json).unwrap_err();
        assert!(err.to_string().contains("but the sequence targets"));
    }

    #[test]
    fn parameter_kinds_match_producers() {
        assert_eq!(Function::AddStarOnGalaxy.parameters()[1], ValueKind::Star);
        assert_eq!(Function::NewStar.produces(), Some(ValueKind::Star));
        assert_eq!(Function::AddGalaxyOnUniverse.produces(), None);
        assert_eq!(Function::NewPlanet.arity(), 2);
    }

    #[test]
    fn target_paths_are_fully_qualified() {
        let t = target();
        let package = ObjectId::from_u128(0x2a);
        assert_eq!(
            t.function_path(Function::CreateUniverse),
            format!("{}::universe::create_universe", package)
        );
        assert_eq!(t.universe_type(), format!("{}::universe::Universe", package));
    }
}
