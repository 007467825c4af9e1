//! Delivery flow control
//!
//! Credit managers bound the in-flight window, the acknowledgement
//! controller tracks what is outstanding, and `Subscription` ties both to
//! a compiled selector.

mod ack;
mod credit;
mod subscription;


pub use ack::{AckMode, AcknowledgementController, OutstandingEntry};
pub use credit::{ClientCreditManager, CreditHandler, CreditManager, FixedCreditManager};
pub use subscription::{Delivery, Subscription, SubscriptionBuilder, SubscriptionStats};
