//! Submission coordinator.
//!
//! Sends a planned batch as one atomic request and re-reads the affected
//! universe afterwards. A session allows a single outstanding submission; a
//! second call while one is pending fails immediately instead of queueing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::ledger::{ExecutionReceipt, LedgerService, ServiceError};
use crate::models::{Address, ObjectId, Universe};
use crate::plan::{BuildError, OperationSequence};
use crate::reconstruct::{Lookup, Reconstructor};

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Invalid operation sequence: {0}")]
    Build(#[from] BuildError),

    #[error("A submission is already in flight")]
    AlreadyPending,

    /// The service refused or failed the batch. Nothing was committed.
    #[error("Submission failed: {0}")]
    Rejected(#[source] ServiceError),
}

/// Outcome of a committed batch.
#[derive(Debug, Clone)]
pub struct CommitResult {
    pub receipt: ExecutionReceipt,
    /// The universe that received the new objects, when it can be identified.
    pub universe: Option<ObjectId>,
    /// The universe as re-read after the commit. `None` if the refresh failed.
    pub snapshot: Option<Universe>,
}

/// Clears the in-flight flag when the submission ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Per-session submission driver.
pub struct Coordinator {
    ledger: Arc<dyn LedgerService>,
    reconstructor: Reconstructor,
    sender: Address,
    in_flight: AtomicBool,
}

impl Coordinator {
    pub fn new(
        ledger: Arc<dyn LedgerService>,
        reconstructor: Reconstructor,
        sender: Address,
    ) -> Self {
        Self {
            ledger,
            reconstructor,
            sender,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn sender(&self) -> &Address {
        &self.sender
    }

    pub fn is_pending(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Submit `sequence` as one atomic batch.
    ///
    /// There is no idempotency token. Resubmitting after an ambiguous failure
    /// (for example a timeout) may create the objects twice.
    pub async fn submit(
        &self,
        sequence: &OperationSequence,
    ) -> Result<CommitResult, SubmissionError> {
        sequence.validate()?;

        let _guard = InFlight::acquire(&self.in_flight).ok_or(SubmissionError::AlreadyPending)?;

        tracing::debug!(
            sender = %self.sender,
            root = %sequence.root(),
            operations = sequence.len(),
            "Submitting batch"
        );

        let receipt = match self.ledger.execute(&self.sender, sequence).await {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::error!(
                    sender = %self.sender,
                    operations = sequence.len(),
                    error = %e,
                    "Batch rejected"
                );
                return Err(SubmissionError::Rejected(e));
            }
        };

        let universe_type = self.reconstructor.target().universe_type();
        let universe = match sequence.root().existing_id() {
            Some(id) => Some(id.clone()),
            None => receipt.created_of_type(&universe_type).next().cloned(),
        };

        tracing::info!(
            digest = %receipt.digest,
            universe = ?universe.as_ref().map(ObjectId::as_str),
            operations = sequence.len(),
            "Batch committed"
        );

        let snapshot = match &universe {
            Some(id) => self.refresh(id).await,
            None => None,
        };

        Ok(CommitResult {
            receipt,
            universe,
            snapshot,
        })
    }

    /// Re-read after a commit. Failures here do not undo the commit, so they
    /// are logged and reported as a missing snapshot.
    async fn refresh(&self, id: &ObjectId) -> Option<Universe> {
        match self.reconstructor.fetch(id).await {
            Ok(Lookup::Found(universe)) => Some(universe),
            Ok(other) => {
                tracing::warn!(
                    universe = %id,
                    lookup = ?other,
                    "Refresh after commit found no universe"
                );
                None
            }
            Err(e) => {
                tracing::warn!(universe = %id, error = %e, "Refresh after commit failed");
                None
            }
        }
    }
}
