//! Transaction registry and expiry reaper
//!
//! Open transactions are registered by id. A single background task scans
//! the registry on a fixed interval and closes every transaction whose
//! expiry has passed, so a client that opens transactions and never
//! finishes them cannot accumulate buffered writes without bound.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use ahash::AHashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{Transaction, TransactionError};
use crate::config::TransactionConfig;

/// Floor for the reaper period; a zero period would spin
const MIN_REAPER_INTERVAL: Duration = Duration::from_millis(1);

struct Reaper {
    handle: JoinHandle<()>,
    shutdown: broadcast::Sender<()>,
}

/// Point-in-time manager status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionManagerStatus {
    pub active: usize,
    pub reaper_running: bool,
}

pub struct TransactionManager {
    config: TransactionConfig,
    transactions: Mutex<AHashMap<Arc<str>, Arc<Transaction>>>,
    reaper: Mutex<Option<Reaper>>,
}

impl TransactionManager {
    pub fn new(config: TransactionConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            transactions: Mutex::new(AHashMap::new()),
            reaper: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Create and register a transaction
    pub fn start_transaction(
        self: &Arc<Self>,
        id: &str,
    ) -> Result<Arc<Transaction>, TransactionError> {
        let transaction = Arc::new(Transaction::new(id, &self.config));
        self.add(transaction.clone())?;
        Ok(transaction)
    }

    /// Register an existing transaction under its id
    pub fn add(self: &Arc<Self>, transaction: Arc<Transaction>) -> Result<(), TransactionError> {
        let mut transactions = self.transactions.lock();
        if transactions.contains_key(transaction.id()) {
            return Err(TransactionError::DuplicateId(transaction.id().to_string()));
        }
        transaction.attach(Arc::downgrade(self));
        debug!(
            transaction = %transaction.id(),
            internal_id = transaction.internal_id(),
            "transaction started"
        );
        transactions.insert(transaction.shared_id(), transaction);
        Ok(())
    }

    pub fn find(&self, id: &str) -> Option<Arc<Transaction>> {
        self.transactions.lock().get(id).cloned()
    }

    /// Deregister `transaction`; a different transaction registered under
    /// the same id is left alone
    pub fn remove(&self, transaction: &Transaction) -> bool {
        let mut transactions = self.transactions.lock();
        let matches = transactions
            .get(transaction.id())
            .is_some_and(|registered| registered.internal_id() == transaction.internal_id());
        if matches {
            transactions.remove(transaction.id());
        }
        matches
    }

    pub fn len(&self) -> usize {
        self.transactions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.lock().is_empty()
    }

    /// Close every expired transaction; returns how many were closed.
    ///
    /// A transaction that fails to close is logged and retried next scan.
    pub fn reap_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<Arc<Transaction>> = self
            .transactions
            .lock()
            .values()
            .filter(|transaction| transaction.is_expired(now))
            .cloned()
            .collect();

        let mut closed = 0;
        for transaction in expired {
            match transaction.close() {
                Ok(()) => {
                    info!(transaction = %transaction.id(), "transaction timed out");
                    closed += 1;
                }
                Err(e) => {
                    warn!(
                        transaction = %transaction.id(),
                        error = %e,
                        "failed to close expired transaction"
                    );
                }
            }
        }
        closed
    }

    /// Start the reaper task. Must be called from within a tokio runtime;
    /// calling it while the reaper is running does nothing.
    pub fn start(self: &Arc<Self>) {
        let mut reaper = self.reaper.lock();
        if reaper.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return;
        }

        let interval = self.config.reaper_interval.max(MIN_REAPER_INTERVAL);
        let manager: Weak<Self> = Arc::downgrade(self);
        let (shutdown, mut shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        let closed = manager.reap_expired();
                        if closed > 0 {
                            debug!(closed, remaining = manager.len(), "reaper pass");
                        }
                    }
                }
            }
        });

        info!(interval = ?interval, "transaction reaper started");
        *reaper = Some(Reaper { handle, shutdown });
    }

    /// Stop the reaper task
    pub fn stop(&self) {
        if let Some(reaper) = self.reaper.lock().take() {
            let _ = reaper.shutdown.send(());
            info!("transaction reaper stopped");
        }
    }

    pub fn status(&self) -> TransactionManagerStatus {
        TransactionManagerStatus {
            active: self.len(),
            reaper_running: self
                .reaper
                .lock()
                .as_ref()
                .is_some_and(|r| !r.handle.is_finished()),
        }
    }
}

impl Drop for TransactionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("config", &self.config)
            .field("active", &self.len())
            .finish()
    }
}
