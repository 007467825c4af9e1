//! Acknowledgement controller
//!
//! Tracks the messages a subscription has sent but not yet had
//! acknowledged, keyed by message id in publish order. Acknowledgements
//! and rollbacks for ids the controller does not know are ignored: they
//! legitimately arrive late or twice under at-least-once transports.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::credit::CreditManager;
use crate::message::Message;

/// How acknowledgements complete outstanding messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckMode {
    /// `ack(n)` completes every outstanding id up to and including `n`
    #[default]
    Cumulative,
    /// `ack(n)` completes exactly `n`
    Individual,
    /// The transport completing a send completes the oldest outstanding message
    Auto,
}

/// Snapshot entry of an unacknowledged message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutstandingEntry {
    pub message_id: u64,
    pub priority: u8,
}

#[derive(Debug)]
struct State {
    outstanding: BTreeMap<u64, u8>,
    /// Highest id ever passed to `sent`; acks above it name unsent messages
    highest_sent: Option<u64>,
    credit: Box<dyn CreditManager>,
}

impl State {
    /// Remove the entries an ack for `message_id` covers; returns how many
    fn complete(&mut self, mode: AckMode, message_id: u64) -> usize {
        let removed = match mode {
            AckMode::Individual => usize::from(self.outstanding.remove(&message_id).is_some()),
            AckMode::Cumulative | AckMode::Auto
                if self.highest_sent.map_or(true, |highest| message_id > highest) =>
            {
                0
            }
            AckMode::Cumulative | AckMode::Auto => match message_id.checked_add(1) {
                Some(split) => {
                    let kept = self.outstanding.split_off(&split);
                    std::mem::replace(&mut self.outstanding, kept).len()
                }
                None => std::mem::take(&mut self.outstanding).len(),
            },
        };
        for _ in 0..removed {
            self.credit.increment();
        }
        removed
    }
}

/// Per-subscription outstanding-message bookkeeping
#[derive(Debug)]
pub struct AcknowledgementController {
    mode: AckMode,
    state: Mutex<State>,
}

impl AcknowledgementController {
    pub fn new(mode: AckMode, credit: Box<dyn CreditManager>) -> Self {
        Self {
            mode,
            state: Mutex::new(State {
                outstanding: BTreeMap::new(),
                highest_sent: None,
                credit,
            }),
        }
    }

    pub fn mode(&self) -> AckMode {
        self.mode
    }

    /// Record that `message` was handed to the transport.
    ///
    /// Callers serialize `sent` per subscription so ids arrive in publish order.
    pub fn sent(&self, message: &Message) {
        let mut state = self.state.lock();
        if !message.qos().is_fire_and_forget() {
            state.outstanding.insert(message.id(), message.priority());
        }
        state.highest_sent = state.highest_sent.max(Some(message.id()));
        state.credit.decrement();
        trace!(
            message_id = message.id(),
            outstanding = state.outstanding.len(),
            "message sent"
        );
    }

    /// Acknowledge `message_id`; returns the number of entries completed
    pub fn ack(&self, message_id: u64) -> usize {
        let removed = self.state.lock().complete(self.mode, message_id);
        trace!(message_id, removed, "ack");
        removed
    }

    /// Negative acknowledgement. Bookkeeping is the same as `ack`; redelivery
    /// is up to the caller.
    pub fn rollback(&self, message_id: u64) -> usize {
        let removed = self.state.lock().complete(self.mode, message_id);
        trace!(message_id, removed, "rollback");
        removed
    }

    /// In `Auto` mode, complete the oldest outstanding message once the
    /// transport reports it written; returns its id for the caller to commit.
    pub fn message_sent(&self) -> Option<u64> {
        if self.mode != AckMode::Auto {
            return None;
        }
        let mut state = self.state.lock();
        let (message_id, _) = state.outstanding.pop_first()?;
        state.credit.increment();
        trace!(message_id, "auto acknowledged");
        Some(message_id)
    }

    pub fn can_send(&self) -> bool {
        let state = self.state.lock();
        state.credit.can_send(state.outstanding.len())
    }

    /// Outstanding entries in publish order
    pub fn outstanding(&self) -> Vec<OutstandingEntry> {
        self.state
            .lock()
            .outstanding
            .iter()
            .map(|(&message_id, &priority)| OutstandingEntry {
                message_id,
                priority,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().outstanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().outstanding.is_empty()
    }

    pub fn current_credit(&self) -> i32 {
        self.state.lock().credit.current_credit()
    }

    /// Resize credit; returns `can_send` after the resize
    pub fn set_max_outstanding(&self, max: i32) -> bool {
        let mut state = self.state.lock();
        state.credit.set_current_credit(max);
        let can_send = state.credit.can_send(state.outstanding.len());
        debug!(max, can_send, "credit resized");
        can_send
    }

    /// Drop all outstanding bookkeeping without redelivering anything
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let dropped = state.outstanding.len();
        state.outstanding.clear();
        if dropped > 0 {
            debug!(dropped, "outstanding messages cleared");
        }
    }

    pub fn close(&self) {
        self.clear();
    }
}
