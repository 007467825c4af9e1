//! Write targets for committed transactions

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::message::Message;

/// Errors a destination can report while storing a message
#[derive(Debug)]
pub enum DestinationError {
    /// The destination is closed or not reachable
    Unavailable(String),
    /// The destination refused the message
    Rejected(String),
    /// IO error in the underlying store
    Io(std::io::Error),
}

impl fmt::Display for DestinationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(e) => write!(f, "destination unavailable: {}", e),
            Self::Rejected(e) => write!(f, "message rejected: {}", e),
            Self::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for DestinationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DestinationError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// A message store a transaction commits into
#[async_trait]
pub trait Destination: Send + Sync {
    fn name(&self) -> &str;

    /// Store a message, returning the sequence number it was assigned
    async fn store_message(&self, message: Message) -> Result<u64, DestinationError>;
}

/// In-memory destination
pub struct MemoryDestination {
    name: String,
    sequence: AtomicU64,
    messages: Mutex<Vec<Message>>,
}

impl MemoryDestination {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sequence: AtomicU64::new(0),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Stored messages in arrival order
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    fn name(&self) -> &str {
        &self.name
    }

    async fn store_message(&self, message: Message) -> Result<u64, DestinationError> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        self.messages.lock().push(message.with_id(sequence));
        Ok(sequence)
    }
}

impl fmt::Debug for MemoryDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDestination")
            .field("name", &self.name)
            .field("stored", &self.len())
            .finish()
    }
}
