//! Credit managers
//!
//! Credit bounds how many messages a subscription may have in flight.
//! None of the operations block; the acknowledgement controller turns the
//! credit state into a `can_send` answer the caller polls before sending.

use serde::{Deserialize, Serialize};

/// Per-subscription credit bookkeeping
pub trait CreditManager: Send + std::fmt::Debug {
    /// A message was sent
    fn decrement(&mut self);

    /// An outstanding message was acknowledged or rolled back
    fn increment(&mut self);

    /// Administrative resize, e.g. a new receive maximum or peer credit grant
    fn set_current_credit(&mut self, credit: i32);

    fn current_credit(&self) -> i32;

    /// Whether one more message may be sent with `outstanding` unacknowledged
    fn can_send(&self, outstanding: usize) -> bool {
        usize::try_from(self.current_credit()).is_ok_and(|credit| outstanding < credit)
    }
}

/// A fixed in-flight window; only `set_current_credit` changes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedCreditManager {
    window: i32,
}

impl FixedCreditManager {
    pub fn new(window: i32) -> Self {
        Self {
            window: window.max(0),
        }
    }
}

impl CreditManager for FixedCreditManager {
    fn decrement(&mut self) {}

    fn increment(&mut self) {}

    fn set_current_credit(&mut self, credit: i32) {
        self.window = credit.max(0);
    }

    fn current_credit(&self) -> i32 {
        self.window
    }
}

/// Credit granted by the peer. Every send consumes a unit; only a new
/// grant through `set_current_credit` replenishes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCreditManager {
    credit: i32,
}

impl ClientCreditManager {
    pub fn new(initial: i32) -> Self {
        Self {
            credit: initial.max(0),
        }
    }
}

impl CreditManager for ClientCreditManager {
    fn decrement(&mut self) {
        if self.credit > 0 {
            self.credit -= 1;
        }
    }

    fn increment(&mut self) {}

    fn set_current_credit(&mut self, credit: i32) {
        self.credit = credit.max(0);
    }

    fn current_credit(&self) -> i32 {
        self.credit
    }

    fn can_send(&self, _outstanding: usize) -> bool {
        self.credit > 0
    }
}

/// Which credit manager a subscription uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditHandler {
    #[default]
    Fixed,
    Client,
}

impl CreditHandler {
    pub fn create(self, initial: i32) -> Box<dyn CreditManager> {
        match self {
            CreditHandler::Fixed => Box::new(FixedCreditManager::new(initial)),
            CreditHandler::Client => Box::new(ClientCreditManager::new(initial)),
        }
    }
}
