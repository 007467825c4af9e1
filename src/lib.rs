//! VibeMQ delivery core
//!
//! Message selection and delivery guarantees for the broker:
//! a selector expression language compiled to canonical trees, identifier
//! resolution over message fields and JSON payloads, per-subscription credit
//! and acknowledgement tracking, and transactional writes with expiry.

pub mod config;
pub mod delivery;
pub mod message;
pub mod resolver;
pub mod selector;
pub mod transaction;

pub use config::Config;
pub use delivery::{
    AckMode, AcknowledgementController, CreditHandler, CreditManager, Delivery, Subscription,
    SubscriptionBuilder,
};
pub use message::{Message, MessageBuilder, QoS};
pub use resolver::{HeaderResolver, IdentifierResolver, JsonResolver};
pub use selector::{compile, CompileError, CompiledSelector, SelectorCache, SelectorCompiler, Value};
pub use transaction::{
    Destination, DestinationError, Transaction, TransactionError, TransactionManager,
    TransactionState,
};
