//! Ownership discovery.
//!
//! The ledger keeps no index of the universes an account created, so it is
//! inferred from the account's transaction history: every transaction that
//! called `create_universe` on the configured module contributes the universe
//! objects it created. Results are best effort and re-derived on every call.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::{DEFAULT_MAX_PAGES, DEFAULT_PAGE_LIMIT};
use crate::ledger::{ChangeKind, LedgerService, TransactionBlock, TransactionQuery};
use crate::models::{Address, ObjectId};
use crate::plan::{Function, MoveTarget};

pub struct OwnershipDiscovery {
    ledger: Arc<dyn LedgerService>,
    target: MoveTarget,
    page_limit: usize,
    max_pages: usize,
}

impl OwnershipDiscovery {
    pub fn new(ledger: Arc<dyn LedgerService>, target: MoveTarget) -> Self {
        Self {
            ledger,
            target,
            page_limit: DEFAULT_PAGE_LIMIT,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Page size and page cap for the history scan. Both are at least 1.
    pub fn with_paging(mut self, page_limit: usize, max_pages: usize) -> Self {
        self.page_limit = page_limit.max(1);
        self.max_pages = max_pages.max(1);
        self
    }

    /// Universes created by `actor`, deduplicated.
    ///
    /// Never fails. A history query that errors ends the scan for this actor;
    /// pages read before it still count.
    pub async fn discover(&self, actor: &Address) -> HashSet<ObjectId> {
        let universe_type = self.target.universe_type();
        let mut found = HashSet::new();
        let mut cursor = None;

        for page_number in 0..self.max_pages {
            let query = TransactionQuery {
                sender: actor.clone(),
                cursor: cursor.take(),
                limit: self.page_limit,
            };
            let page = match self.ledger.query_transactions(&query).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(
                        actor = %actor,
                        page = page_number,
                        error = %e,
                        "History query failed, discovery result may be incomplete"
                    );
                    break;
                }
            };

            for block in page.data.iter().filter(|b| self.is_universe_creation(b)) {
                found.extend(created_of_type(block, &universe_type));
            }

            match page.next_cursor {
                Some(next) if page.has_next_page => cursor = Some(next),
                _ => break,
            }
            if page_number + 1 == self.max_pages {
                tracing::warn!(
                    actor = %actor,
                    pages = self.max_pages,
                    "History scan stopped at page cap"
                );
            }
        }

        tracing::debug!(actor = %actor, universes = found.len(), "Discovery finished");
        found
    }

    /// Union of [`discover`](Self::discover) over several actors. Each actor
    /// degrades on its own.
    pub async fn discover_many(&self, actors: &[Address]) -> HashSet<ObjectId> {
        let mut found = HashSet::new();
        for actor in actors {
            found.extend(self.discover(actor).await);
        }
        found
    }

    /// Whether any command in the block is exactly `create_universe` on our module.
    fn is_universe_creation(&self, block: &TransactionBlock) -> bool {
        block.move_calls().any(|call| {
            call.package == self.target.package
                && call.module == self.target.module
                && call.function == Function::CreateUniverse.as_str()
        })
    }
}

/// Ids created by the block whose reported type is exactly `object_type`.
///
/// Ids come from both the effects and the change list; an id with no type
/// information anywhere in the block is skipped.
fn created_of_type(block: &TransactionBlock, object_type: &str) -> HashSet<ObjectId> {
    let from_changes = block
        .object_changes
        .iter()
        .filter(|c| c.kind == ChangeKind::Created)
        .map(|c| &c.object_id);

    block
        .created_ids()
        .chain(from_changes)
        .filter(|id| block.object_type_of(id) == Some(object_type))
        .cloned()
        .collect()
}
