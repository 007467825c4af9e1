//! Subscriptions: a selector plus an acknowledgement controller

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use compact_str::CompactString;
use tracing::debug;

use super::ack::{AckMode, AcknowledgementController, OutstandingEntry};
use super::credit::CreditHandler;
use crate::config::DeliveryConfig;
use crate::message::Message;
use crate::selector::{CompileError, CompiledSelector, SelectorCache};

/// Outcome of offering a message to a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Selected and recorded as sent
    Deliver,
    /// Rejected by the selector
    Filtered,
    /// Selected but the subscription has no credit
    NoCredit,
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    pub sent: u64,
    pub filtered: u64,
    pub acked: u64,
    pub rolled_back: u64,
    pub outstanding: usize,
}

#[derive(Debug)]
pub struct Subscription {
    id: CompactString,
    /// `None` selects everything
    selector: Option<Arc<CompiledSelector>>,
    controller: AcknowledgementController,
    sent: AtomicU64,
    filtered: AtomicU64,
    acked: AtomicU64,
    rolled_back: AtomicU64,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn selector(&self) -> Option<&Arc<CompiledSelector>> {
        self.selector.as_ref()
    }

    pub fn controller(&self) -> &AcknowledgementController {
        &self.controller
    }

    /// Whether the selector selects `message`, ignoring credit
    pub fn matches(&self, message: &Message) -> bool {
        self.selector
            .as_ref()
            .map_or(true, |selector| selector.evaluate(message))
    }

    /// Filter, then check credit, then record the send
    pub fn offer(&self, message: &Message) -> Delivery {
        if !self.matches(message) {
            self.filtered.fetch_add(1, Ordering::Relaxed);
            return Delivery::Filtered;
        }
        if !self.controller.can_send() {
            return Delivery::NoCredit;
        }
        self.controller.sent(message);
        self.sent.fetch_add(1, Ordering::Relaxed);
        Delivery::Deliver
    }

    pub fn ack_received(&self, message_id: u64) -> usize {
        let removed = self.controller.ack(message_id);
        self.acked.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn rollback_received(&self, message_id: u64) -> usize {
        let removed = self.controller.rollback(message_id);
        self.rolled_back.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Transport finished writing a message (auto-ack mode)
    pub fn message_sent(&self) -> Option<u64> {
        let completed = self.controller.message_sent();
        if completed.is_some() {
            self.acked.fetch_add(1, Ordering::Relaxed);
        }
        completed
    }

    /// New credit from the client or configuration; returns `can_send`
    pub fn update_credit(&self, credit: i32) -> bool {
        self.controller.set_max_outstanding(credit)
    }

    /// Outstanding messages for redelivery on resume
    pub fn outstanding(&self) -> Vec<OutstandingEntry> {
        self.controller.outstanding()
    }

    pub fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            sent: self.sent.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
            outstanding: self.controller.len(),
        }
    }

    pub fn close(&self) {
        debug!(subscription = %self.id, "subscription closed");
        self.controller.close();
    }
}

/// Builds a `Subscription` from client and destination settings
#[derive(Debug, Clone)]
pub struct SubscriptionBuilder {
    id: CompactString,
    selector: Option<String>,
    destination_selector: Option<String>,
    ack_mode: AckMode,
    credit_handler: CreditHandler,
    receive_maximum: i32,
}

impl SubscriptionBuilder {
    pub fn new(id: impl Into<CompactString>) -> Self {
        Self::from_config(id, &DeliveryConfig::default())
    }

    pub fn from_config(id: impl Into<CompactString>, config: &DeliveryConfig) -> Self {
        Self {
            id: id.into(),
            selector: None,
            destination_selector: None,
            ack_mode: config.ack_mode,
            credit_handler: config.credit_handler,
            receive_maximum: config.receive_maximum,
        }
    }

    /// Client supplied selector
    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    /// Selector attached to the destination itself
    pub fn destination_selector(mut self, selector: impl Into<String>) -> Self {
        self.destination_selector = Some(selector.into());
        self
    }

    pub fn ack_mode(mut self, mode: AckMode) -> Self {
        self.ack_mode = mode;
        self
    }

    pub fn credit_handler(mut self, handler: CreditHandler) -> Self {
        self.credit_handler = handler;
        self
    }

    pub fn receive_maximum(mut self, receive_maximum: i32) -> Self {
        self.receive_maximum = receive_maximum;
        self
    }

    /// The selector text the subscription filters on, if any
    fn combined_selector(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.selector, &self.destination_selector]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
            .collect();
        match parts.as_slice() {
            [] => None,
            [single] => Some(single.to_string()),
            [client, destination] => Some(format!("({}) AND ({})", client, destination)),
            _ => None,
        }
    }

    /// Compile the selector through `cache` and build the subscription.
    ///
    /// Fails if the selector does not compile; the subscribe must be rejected.
    pub fn build(self, cache: &SelectorCache) -> Result<Subscription, CompileError> {
        let selector = match self.combined_selector() {
            Some(text) => {
                let compiled = cache.get_or_compile(&text)?;
                if compiled.is_always_true() {
                    None
                } else {
                    Some(compiled)
                }
            }
            None => None,
        };

        debug!(
            subscription = %self.id,
            selector = ?selector.as_ref().map(|s| s.to_string()),
            ack_mode = ?self.ack_mode,
            credit_handler = ?self.credit_handler,
            receive_maximum = self.receive_maximum,
            "subscription built"
        );

        Ok(Subscription {
            id: self.id,
            selector,
            controller: AcknowledgementController::new(
                self.ack_mode,
                self.credit_handler.create(self.receive_maximum),
            ),
            sent: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            acked: AtomicU64::new(0),
            rolled_back: AtomicU64::new(0),
        })
    }
}
