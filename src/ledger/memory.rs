//! In-process ledger.
//!
//! Mirrors what the real service guarantees and nothing more: batches execute
//! against scratch state and only a fully successful batch is committed. Values
//! created in a batch move when attached, so each can be consumed once. Only
//! universes are top-level objects; galaxies, stars and planets live wrapped
//! inside them but still receive ids and show up as created in the effects.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{
    ChangeKind, Command, ExecutionReceipt, ExecutionStatus, LedgerService, MoveCallRecord,
    ObjectChange, ObjectRef, OwnedObjectRef, ServiceError, TransactionBlock, TransactionData,
    TransactionEffects, TransactionEnvelope, TransactionKind, TransactionPage, TransactionQuery,
    PROGRAMMABLE_TRANSACTION,
};
use crate::models::{Address, ObjectId};
use crate::plan::{Argument, Function, MoveTarget, Operation, OperationSequence, PureValue};

#[derive(Debug, Clone)]
struct PlanetObject {
    id: ObjectId,
    name: String,
    orbit: u8,
}

#[derive(Debug, Clone)]
struct StarObject {
    id: ObjectId,
    name: String,
    orbit: u8,
    alive: bool,
    planets: Vec<PlanetObject>,
}

#[derive(Debug, Clone)]
struct GalaxyObject {
    id: ObjectId,
    name: String,
    stars: Vec<StarObject>,
}

#[derive(Debug, Clone)]
struct UniverseObject {
    id: ObjectId,
    version: u64,
    galaxies: Vec<GalaxyObject>,
}

/// Result slot of an executed operation.
#[derive(Debug)]
enum Slot {
    Universe(UniverseObject),
    Galaxy(GalaxyObject),
    Star(StarObject),
    Planet(PlanetObject),
    Unit,
    Moved,
}

impl Slot {
    fn describe(&self) -> &'static str {
        match self {
            Self::Universe(_) => "Universe",
            Self::Galaxy(_) => "Galaxy",
            Self::Star(_) => "Star",
            Self::Planet(_) => "Planet",
            Self::Unit => "()",
            Self::Moved => "moved value",
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    reject_next: Option<String>,
    fail_after: Option<usize>,
    failing_queries: usize,
}

#[derive(Debug, Default)]
struct LedgerState {
    next_id: u128,
    universes: BTreeMap<ObjectId, UniverseObject>,
    raw_objects: BTreeMap<ObjectId, Value>,
    history: Vec<(Address, TransactionBlock)>,
    faults: Faults,
}

/// In-memory [`LedgerService`].
#[derive(Debug)]
pub struct MemoryLedger {
    target: MoveTarget,
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new(target: MoveTarget) -> Self {
        Self {
            target,
            state: Mutex::new(LedgerState {
                // Low ids are left for callers who inject objects by hand.
                next_id: 0x1000,
                ..Default::default()
            }),
        }
    }

    pub fn target(&self) -> &MoveTarget {
        &self.target
    }

    // ============================================================
    // Fault injection
    // ============================================================

    /// Refuse the next batch outright, before any operation runs.
    pub fn reject_next(&self, reason: impl Into<String>) {
        let mut state = self.state.lock().expect("ledger lock poisoned");
        state.faults.reject_next = Some(reason.into());
    }

    /// Abort the next batch after `operations` of its operations have run.
    pub fn fail_after(&self, operations: usize) {
        let mut state = self.state.lock().expect("ledger lock poisoned");
        state.faults.fail_after = Some(operations);
    }

    /// Make the next `count` history queries fail.
    pub fn fail_queries(&self, count: usize) {
        let mut state = self.state.lock().expect("ledger lock poisoned");
        state.faults.failing_queries = count;
    }

    // ============================================================
    // Direct state access
    // ============================================================

    /// Store an object whose content is served verbatim by `get_object`.
    pub fn insert_raw_object(&self, id: ObjectId, object: Value) {
        let mut state = self.state.lock().expect("ledger lock poisoned");
        state.raw_objects.insert(id, object);
    }

    /// Append a transaction to `sender`'s history without executing anything.
    pub fn record_transaction(&self, sender: Address, block: TransactionBlock) {
        let mut state = self.state.lock().expect("ledger lock poisoned");
        state.history.push((sender, block));
    }

    pub fn universe_ids(&self) -> Vec<ObjectId> {
        let state = self.state.lock().expect("ledger lock poisoned");
        state.universes.keys().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        let state = self.state.lock().expect("ledger lock poisoned");
        state.history.len()
    }

    // ============================================================
    // Execution
    // ============================================================

    fn run_batch(
        &self,
        state: &mut LedgerState,
        sender: &Address,
        sequence: &OperationSequence,
    ) -> Result<ExecutionReceipt, ServiceError> {
        if let Some(reason) = state.faults.reject_next.take() {
            return Err(ServiceError::Rejected(reason));
        }
        let fail_after = state.faults.fail_after.take();

        let mut scratch = Scratch {
            next_id: state.next_id,
            slots: Vec::with_capacity(sequence.len()),
            touched: HashMap::new(),
            created: Vec::new(),
        };

        for (i, op) in sequence.operations().iter().enumerate() {
            if fail_after == Some(i) {
                return Err(ServiceError::Rejected(format!(
                    "batch aborted after {} of {} operations",
                    i,
                    sequence.len()
                )));
            }
            if op.package != self.target.package || op.module != self.target.module {
                return Err(ServiceError::Rejected(format!(
                    "operation {}: unknown module {}::{}",
                    i, op.package, op.module
                )));
            }
            let slot = scratch
                .apply(state, op)
                .map_err(|e| ServiceError::Rejected(format!("operation {}: {}", i, e)))?;
            scratch.slots.push(slot);
        }

        let mut new_universes = Vec::new();
        for slot in std::mem::take(&mut scratch.slots) {
            match slot {
                Slot::Universe(universe) => new_universes.push(universe),
                Slot::Unit | Slot::Moved => {}
                other => {
                    return Err(ServiceError::Rejected(format!(
                        "unused {} value left at end of batch",
                        other.describe()
                    )))
                }
            }
        }

        // Commit point: nothing above touched `state` except reading it.
        let digest = Uuid::new_v4().simple().to_string();
        let timestamp_ms = Utc::now().timestamp_millis().to_string();

        let mut object_changes: Vec<ObjectChange> = scratch
            .created
            .iter()
            .map(|(id, name)| ObjectChange::created(id.clone(), self.target.type_tag(name)))
            .collect();

        for (id, mut universe) in scratch.touched {
            universe.version += 1;
            object_changes.push(ObjectChange {
                kind: ChangeKind::Mutated,
                object_id: id.clone(),
                object_type: Some(self.target.universe_type()),
            });
            state.universes.insert(id, universe);
        }
        for universe in new_universes {
            state.universes.insert(universe.id.clone(), universe);
        }
        state.next_id = scratch.next_id;

        let block = TransactionBlock {
            digest: digest.clone(),
            timestamp_ms: Some(timestamp_ms.clone()),
            transaction: Some(TransactionEnvelope {
                data: TransactionData {
                    sender: sender.clone(),
                    transaction: TransactionKind {
                        kind: PROGRAMMABLE_TRANSACTION.to_string(),
                        transactions: sequence
                            .iter()
                            .map(|op| Command {
                                move_call: Some(MoveCallRecord {
                                    package: op.package.clone(),
                                    module: op.module.clone(),
                                    function: op.function.as_str().to_string(),
                                }),
                            })
                            .collect(),
                    },
                },
            }),
            effects: Some(TransactionEffects {
                status: ExecutionStatus {
                    status: "success".to_string(),
                    error: None,
                },
                created: scratch
                    .created
                    .iter()
                    .map(|(id, _)| OwnedObjectRef {
                        reference: ObjectRef {
                            object_id: id.clone(),
                            version: 1,
                            digest: digest.clone(),
                        },
                    })
                    .collect(),
            }),
            object_changes: object_changes.clone(),
        };
        state.history.push((sender.clone(), block));

        Ok(ExecutionReceipt {
            digest,
            timestamp_ms: Some(timestamp_ms),
            object_changes,
        })
    }

    fn render_object(&self, universe: &UniverseObject) -> Value {
        let universe_type = self.target.universe_type();
        let galaxy_type = self.target.type_tag("Galaxy");
        let star_type = self.target.type_tag("Star");
        let planet_type = self.target.type_tag("Planet");

        let galaxies: Vec<Value> = universe
            .galaxies
            .iter()
            .map(|g| {
                let stars: Vec<Value> = g
                    .stars
                    .iter()
                    .map(|s| {
                        let planets: Vec<Value> = s
                            .planets
                            .iter()
                            .map(|p| {
                                json!({
                                    "type": planet_type,
                                    "fields": {
                                        "id": { "id": p.id },
                                        "name": p.name,
                                        "orbit": p.orbit,
                                    }
                                })
                            })
                            .collect();
                        json!({
                            "type": star_type,
                            "fields": {
                                "id": { "id": s.id },
                                "name": s.name,
                                "orbit": s.orbit,
                                "alive": s.alive,
                                "planets": planets,
                            }
                        })
                    })
                    .collect();
                json!({
                    "type": galaxy_type,
                    "fields": {
                        "id": { "id": g.id },
                        "name": g.name,
                        "stars": stars,
                    }
                })
            })
            .collect();

        json!({
            "data": {
                "objectId": universe.id,
                "version": universe.version.to_string(),
                "type": universe_type,
                "content": {
                    "dataType": "moveObject",
                    "type": universe_type,
                    "hasPublicTransfer": false,
                    "fields": {
                        "id": { "id": universe.id },
                        "galaxies": galaxies,
                    }
                }
            }
        })
    }
}

/// Batch-local execution state. Dropped without effect if the batch fails.
struct Scratch {
    next_id: u128,
    slots: Vec<Slot>,
    /// Copies of persisted universes mutated by this batch.
    touched: HashMap<ObjectId, UniverseObject>,
    /// Every object minted by this batch with its struct name.
    created: Vec<(ObjectId, &'static str)>,
}

impl Scratch {
    fn mint(&mut self, name: &'static str) -> ObjectId {
        self.next_id += 1;
        let id = ObjectId::from_u128(self.next_id);
        self.created.push((id.clone(), name));
        id
    }

    fn apply(&mut self, state: &LedgerState, op: &Operation) -> Result<Slot, String> {
        let args = &op.arguments;
        match op.function {
            Function::CreateUniverse => Ok(Slot::Universe(UniverseObject {
                id: self.mint("Universe"),
                version: 1,
                galaxies: Vec::new(),
            })),
            Function::NewGalaxy => Ok(Slot::Galaxy(GalaxyObject {
                name: pure_string(&args[0])?,
                id: self.mint("Galaxy"),
                stars: Vec::new(),
            })),
            Function::NewStar => Ok(Slot::Star(StarObject {
                name: pure_string(&args[0])?,
                orbit: pure_u8(&args[1])?,
                id: self.mint("Star"),
                alive: true,
                planets: Vec::new(),
            })),
            Function::NewPlanet => Ok(Slot::Planet(PlanetObject {
                name: pure_string(&args[0])?,
                orbit: pure_u8(&args[1])?,
                id: self.mint("Planet"),
            })),
            Function::AddPlanetOnStar => {
                let planet = match self.take(&args[1])? {
                    Slot::Planet(p) => p,
                    other => return Err(mismatch("Planet", &other)),
                };
                match self.borrow_mut(&args[0])? {
                    Slot::Star(star) => star.planets.push(planet),
                    other => return Err(mismatch("Star", other)),
                }
                Ok(Slot::Unit)
            }
            Function::AddStarOnGalaxy => {
                let star = match self.take(&args[1])? {
                    Slot::Star(s) => s,
                    other => return Err(mismatch("Star", &other)),
                };
                match self.borrow_mut(&args[0])? {
                    Slot::Galaxy(galaxy) => galaxy.stars.push(star),
                    other => return Err(mismatch("Galaxy", other)),
                }
                Ok(Slot::Unit)
            }
            Function::AddGalaxyOnUniverse => {
                let galaxy = match self.take(&args[1])? {
                    Slot::Galaxy(g) => g,
                    other => return Err(mismatch("Galaxy", &other)),
                };
                match &args[0] {
                    Argument::Object(id) => {
                        if !self.touched.contains_key(id) {
                            let persisted = state
                                .universes
                                .get(id)
                                .ok_or_else(|| format!("object {} does not exist", id))?;
                            self.touched.insert(id.clone(), persisted.clone());
                        }
                        if let Some(universe) = self.touched.get_mut(id) {
                            universe.galaxies.push(galaxy);
                        }
                    }
                    arg => match self.borrow_mut(arg)? {
                        Slot::Universe(universe) => universe.galaxies.push(galaxy),
                        other => return Err(mismatch("Universe", other)),
                    },
                }
                Ok(Slot::Unit)
            }
        }
    }

    /// Move a value out of its slot.
    fn take(&mut self, arg: &Argument) -> Result<Slot, String> {
        let index = result_index(arg)?;
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| format!("result #{} does not exist yet", index))?;
        match std::mem::replace(slot, Slot::Moved) {
            Slot::Moved => Err(format!("result #{} was already moved", index)),
            value => Ok(value),
        }
    }

    fn borrow_mut(&mut self, arg: &Argument) -> Result<&mut Slot, String> {
        let index = result_index(arg)?;
        self.slots
            .get_mut(index)
            .ok_or_else(|| format!("result #{} does not exist yet", index))
    }
}

fn result_index(arg: &Argument) -> Result<usize, String> {
    arg.handle()
        .map(|h| h.index())
        .ok_or_else(|| format!("expected a batch result, got {}", arg))
}

fn pure_string(arg: &Argument) -> Result<String, String> {
    match arg {
        Argument::Pure(PureValue::String(s)) => Ok(s.clone()),
        other => Err(format!("expected string, got {}", other)),
    }
}

fn pure_u8(arg: &Argument) -> Result<u8, String> {
    match arg {
        Argument::Pure(PureValue::U8(n)) => Ok(*n),
        other => Err(format!("expected u8, got {}", other)),
    }
}

fn mismatch(expected: &str, found: &Slot) -> String {
    format!("expected {}, found {}", expected, found.describe())
}

#[async_trait]
impl LedgerService for MemoryLedger {
    async fn execute(
        &self,
        sender: &Address,
        sequence: &OperationSequence,
    ) -> Result<ExecutionReceipt, ServiceError> {
        let mut state = self.state.lock().expect("ledger lock poisoned");
        self.run_batch(&mut state, sender, sequence)
    }

    async fn get_object(&self, id: &ObjectId) -> Result<Value, ServiceError> {
        let state = self.state.lock().expect("ledger lock poisoned");
        if let Some(raw) = state.raw_objects.get(id) {
            return Ok(raw.clone());
        }
        Ok(match state.universes.get(id) {
            Some(universe) => self.render_object(universe),
            None => json!({ "error": { "code": "notExists", "object_id": id } }),
        })
    }

    async fn query_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, ServiceError> {
        let mut state = self.state.lock().expect("ledger lock poisoned");
        if state.faults.failing_queries > 0 {
            state.faults.failing_queries -= 1;
            return Err(ServiceError::Unavailable(
                "history query timed out".to_string(),
            ));
        }

        let mine: Vec<&TransactionBlock> = state
            .history
            .iter()
            .filter(|(sender, _)| sender == &query.sender)
            .map(|(_, block)| block)
            .collect();

        let start = match &query.cursor {
            Some(cursor) => mine
                .iter()
                .position(|b| &b.digest == cursor)
                .map(|i| i + 1)
                .ok_or_else(|| ServiceError::Rpc {
                    code: -32602,
                    message: format!("unknown cursor {}", cursor),
                })?,
            None => 0,
        };

        let limit = query.limit.max(1);
        let data: Vec<TransactionBlock> = mine
            .iter()
            .skip(start)
            .take(limit)
            .map(|b| (*b).clone())
            .collect();
        let has_next_page = start + data.len() < mine.len();

        Ok(TransactionPage {
            next_cursor: data.last().map(|b| b.digest.clone()),
            has_next_page,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GalaxyDef, PlanetDef, StarDef, UniverseRef};
    use crate::plan::{OperationHandle, Planner};

    fn target() -> MoveTarget {
        MoveTarget::new(ObjectId::from_u128(0x2a), "universe")
    }

    fn sender() -> Address {
        Address::from_u128(0xa11ce)
    }

    #[tokio::test]
    async fn commits_new_universe_with_full_tree() {
        let ledger = MemoryLedger::new(target());
        let galaxy = GalaxyDef::new("Andromeda").with_star(
            StarDef::new("Sun", 1).with_planet(PlanetDef::new("Earth", 3)),
        );
        let seq = Planner::new(target()).build(UniverseRef::New, galaxy).unwrap();

        let receipt = ledger.execute(&sender(), &seq).await.unwrap();

        // universe, galaxy, star, planet
        assert_eq!(receipt.object_changes.len(), 4);
        let universe_type = target().universe_type();
        let ids: Vec<_> = receipt.created_of_type(&universe_type).cloned().collect();
        assert_eq!(ledger.universe_ids(), ids);
        assert_eq!(ledger.history_len(), 1);
    }

    #[tokio::test]
    async fn reusing_a_moved_value_aborts_everything() {
        let ledger = MemoryLedger::new(target());
        let t = target();
        let seq = OperationSequence::from_operations(
            UniverseRef::New,
            vec![
                Operation::call(&t, Function::CreateUniverse, vec![]),
                Operation::call(&t, Function::NewGalaxy, vec![Argument::string("G")]),
                Operation::call(
                    &t,
                    Function::AddGalaxyOnUniverse,
                    vec![
                        Argument::Result(OperationHandle::new(0)),
                        Argument::Result(OperationHandle::new(1)),
                    ],
                ),
                Operation::call(
                    &t,
                    Function::AddGalaxyOnUniverse,
                    vec![
                        Argument::Result(OperationHandle::new(0)),
                        Argument::Result(OperationHandle::new(1)),
                    ],
                ),
            ],
        )
        .unwrap();

        let err = ledger.execute(&sender(), &seq).await.unwrap_err();

        assert!(err.to_string().contains("already moved"));
        assert!(ledger.universe_ids().is_empty());
        assert_eq!(ledger.history_len(), 0);
    }

    #[tokio::test]
    async fn dangling_values_are_rejected() {
        let ledger = MemoryLedger::new(target());
        let t = target();
        let seq = OperationSequence::from_operations(
            UniverseRef::Existing(ObjectId::from_u128(0x1000)),
            vec![Operation::call(
                &t,
                Function::NewGalaxy,
                vec![Argument::string("Orphan")],
            )],
        )
        .unwrap();

        let err = ledger.execute(&sender(), &seq).await.unwrap_err();
        assert!(err.to_string().contains("unused Galaxy"));
    }

    #[tokio::test]
    async fn missing_object_reports_not_exists() {
        let ledger = MemoryLedger::new(target());
        let value = ledger.get_object(&ObjectId::from_u128(7)).await.unwrap();
        assert_eq!(value["error"]["code"], "notExists");
    }

    #[tokio::test]
    async fn history_pages_follow_cursor() {
        let ledger = MemoryLedger::new(target());
        let planner = Planner::new(target());
        for _ in 0..3 {
            let seq = planner.build_universe().unwrap();
            ledger.execute(&sender(), &seq).await.unwrap();
        }

        let first = ledger
            .query_transactions(&TransactionQuery {
                sender: sender(),
                cursor: None,
                limit: 2,
            })
            .await
            .unwrap();
        assert_eq!(first.data.len(), 2);
        assert!(first.has_next_page);

        let second = ledger
            .query_transactions(&TransactionQuery {
                sender: sender(),
                cursor: first.next_cursor,
                limit: 2,
            })
            .await
            .unwrap();
        assert_eq!(second.data.len(), 1);
        assert!(!second.has_next_page);
    }
}
