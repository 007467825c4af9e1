//! Transactions
//!
//! A transaction buffers writes to destinations and applies them, in the
//! order they were added, when it commits. Abort and timeout discard the
//! buffer. Commit is not atomic across destinations: if a write fails the
//! earlier writes stay applied and the transaction ends aborted.

mod destination;
mod manager;


use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};

pub use destination::{Destination, DestinationError, MemoryDestination};
pub use manager::{TransactionManager, TransactionManagerStatus};

use crate::config::TransactionConfig;
use crate::message::Message;

static NEXT_INTERNAL_ID: AtomicU64 = AtomicU64::new(1);

/// Transaction errors
#[derive(Debug)]
pub enum TransactionError {
    /// Committed, aborted or timed out
    AlreadyClosed(String),
    /// A commit is applying the buffered writes
    CommitInProgress(String),
    /// A transaction with this id is already registered
    DuplicateId(String),
    /// The write buffer is full
    TooManyWrites { id: String, limit: usize },
    /// A destination failed during commit
    Destination {
        id: String,
        source: DestinationError,
    },
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyClosed(id) => write!(f, "transaction '{}' has already been completed", id),
            Self::CommitInProgress(id) => write!(f, "transaction '{}' is committing", id),
            Self::DuplicateId(id) => write!(f, "transaction '{}' already exists", id),
            Self::TooManyWrites { id, limit } => {
                write!(f, "transaction '{}' exceeds {} buffered writes", id, limit)
            }
            Self::Destination { id, source } => {
                write!(f, "commit of transaction '{}' failed: {}", id, source)
            }
        }
    }
}

impl std::error::Error for TransactionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Destination { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committing,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_closed(self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

struct BufferedWrite {
    destination: Arc<dyn Destination>,
    message: Message,
}

struct Inner {
    state: TransactionState,
    writes: Vec<BufferedWrite>,
}

pub struct Transaction {
    id: Arc<str>,
    internal_id: u64,
    created_at: Instant,
    /// `None` when the expiry is too far out to represent
    expiry_at: Option<Instant>,
    max_writes: usize,
    inner: Mutex<Inner>,
    manager: OnceLock<Weak<TransactionManager>>,
}

impl Transaction {
    /// A transaction not yet registered with any manager
    pub fn new(id: impl Into<Arc<str>>, config: &TransactionConfig) -> Self {
        let created_at = Instant::now();
        Self {
            id: id.into(),
            internal_id: NEXT_INTERNAL_ID.fetch_add(1, Ordering::Relaxed),
            created_at,
            expiry_at: created_at.checked_add(config.expiry),
            max_writes: config.max_buffered_writes,
            inner: Mutex::new(Inner {
                state: TransactionState::Open,
                writes: Vec::new(),
            }),
            manager: OnceLock::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn shared_id(&self) -> Arc<str> {
        self.id.clone()
    }

    /// Process-unique id, distinct from the protocol level id
    pub fn internal_id(&self) -> u64 {
        self.internal_id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn expiry_at(&self) -> Option<Instant> {
        self.expiry_at
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expiry_at.is_some_and(|expiry| expiry <= now)
    }

    pub fn state(&self) -> TransactionState {
        self.inner.lock().state
    }

    pub fn pending_writes(&self) -> usize {
        self.inner.lock().writes.len()
    }

    /// Distinct destination names in first-write order
    pub fn destinations(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut names: Vec<String> = Vec::new();
        for write in &inner.writes {
            let name = write.destination.name();
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    pub(crate) fn attach(&self, manager: Weak<TransactionManager>) {
        let _ = self.manager.set(manager);
    }

    fn deregister(&self) {
        if let Some(manager) = self.manager.get().and_then(Weak::upgrade) {
            manager.remove(self);
        }
    }

    fn closed_error(&self, state: TransactionState) -> TransactionError {
        match state {
            TransactionState::Committing => TransactionError::CommitInProgress(self.id.to_string()),
            _ => TransactionError::AlreadyClosed(self.id.to_string()),
        }
    }

    /// Buffer a write; nothing reaches the destination until commit
    pub fn add(
        &self,
        destination: Arc<dyn Destination>,
        message: Message,
    ) -> Result<(), TransactionError> {
        let mut inner = self.inner.lock();
        if inner.state != TransactionState::Open {
            return Err(self.closed_error(inner.state));
        }
        if self.max_writes > 0 && inner.writes.len() >= self.max_writes {
            return Err(TransactionError::TooManyWrites {
                id: self.id.to_string(),
                limit: self.max_writes,
            });
        }
        inner.writes.push(BufferedWrite {
            destination,
            message,
        });
        Ok(())
    }

    /// Apply the buffered writes in insertion order; returns how many were written
    pub async fn commit(&self) -> Result<usize, TransactionError> {
        let writes = {
            let mut inner = self.inner.lock();
            if inner.state != TransactionState::Open {
                return Err(self.closed_error(inner.state));
            }
            inner.state = TransactionState::Committing;
            std::mem::take(&mut inner.writes)
        };

        let total = writes.len();
        let mut guard = CommitGuard {
            transaction: self,
            armed: true,
        };
        for (written, write) in writes.into_iter().enumerate() {
            let destination = write.destination.name().to_string();
            if let Err(source) = write.destination.store_message(write.message).await {
                guard.finish(TransactionState::Aborted);
                warn!(
                    transaction = %self.id,
                    destination = %destination,
                    written,
                    total,
                    error = %source,
                    "commit failed"
                );
                return Err(TransactionError::Destination {
                    id: self.id.to_string(),
                    source,
                });
            }
        }

        guard.finish(TransactionState::Committed);
        debug!(transaction = %self.id, writes = total, "transaction committed");
        Ok(total)
    }

    /// Discard the buffered writes
    pub fn abort(&self) -> Result<(), TransactionError> {
        let discarded = {
            let mut inner = self.inner.lock();
            if inner.state != TransactionState::Open {
                return Err(self.closed_error(inner.state));
            }
            inner.state = TransactionState::Aborted;
            std::mem::take(&mut inner.writes).len()
        };
        self.deregister();
        debug!(transaction = %self.id, discarded, "transaction aborted");
        Ok(())
    }

    /// Abort if still open, then deregister. Closing an already closed
    /// transaction succeeds; closing one mid-commit fails.
    pub fn close(&self) -> Result<(), TransactionError> {
        match self.state() {
            TransactionState::Open => match self.abort() {
                Err(TransactionError::AlreadyClosed(_)) => {
                    self.deregister();
                    Ok(())
                }
                result => result,
            },
            TransactionState::Committing => Err(self.closed_error(TransactionState::Committing)),
            TransactionState::Committed | TransactionState::Aborted => {
                self.deregister();
                Ok(())
            }
        }
    }
}

/// Ends a commit. If the commit future is dropped mid-write, the
/// transaction is aborted and deregistered instead of staying `Committing`.
struct CommitGuard<'a> {
    transaction: &'a Transaction,
    armed: bool,
}

impl CommitGuard<'_> {
    fn finish(&mut self, state: TransactionState) {
        self.armed = false;
        self.transaction.inner.lock().state = state;
        self.transaction.deregister();
    }
}

impl Drop for CommitGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(transaction = %self.transaction.id, "commit cancelled, transaction aborted");
            self.finish(TransactionState::Aborted);
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("internal_id", &self.internal_id)
            .field("state", &inner.state)
            .field("pending_writes", &inner.writes.len())
            .finish()
    }
}
