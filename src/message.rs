//! Messages as seen by selectors, acknowledgement tracking and transactions

use std::sync::OnceLock;

use ahash::AHashMap;
use bytes::Bytes;
use compact_str::CompactString;

use crate::resolver::{IdentifierResolver, JsonResolver};
use crate::selector::Value;

/// Delivery quality of service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum QoS {
    /// Fire and forget, never acknowledged
    #[default]
    AtMostOnce = 0,
    /// Acknowledged, may be redelivered
    AtLeastOnce = 1,
    /// Acknowledged exactly once
    ExactlyOnce = 2,
}

impl QoS {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }

    /// No acknowledgement will ever arrive for this level
    pub fn is_fire_and_forget(self) -> bool {
        self == QoS::AtMostOnce
    }
}

/// How the opaque payload is structured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadFormat {
    #[default]
    Opaque,
    /// Payload fields are addressable by plain identifiers
    Json,
}

/// A message with typed data fields, string metadata and a payload.
///
/// As an `IdentifierResolver` it looks a name up in the data map, then the
/// metadata, then (for JSON payloads) the parsed payload.
#[derive(Debug, Default)]
pub struct Message {
    id: u64,
    priority: u8,
    qos: QoS,
    data: AHashMap<CompactString, Value>,
    meta: AHashMap<CompactString, CompactString>,
    payload: Bytes,
    format: PayloadFormat,
    parsed: OnceLock<Option<serde_json::Value>>,
}

impl Clone for Message {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            priority: self.priority,
            qos: self.qos,
            data: self.data.clone(),
            meta: self.meta.clone(),
            payload: self.payload.clone(),
            format: self.format,
            parsed: OnceLock::new(),
        }
    }
}

impl Message {
    pub fn builder(id: u64) -> MessageBuilder {
        MessageBuilder::new(id)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn qos(&self) -> QoS {
        self.qos
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    pub fn data(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(CompactString::as_str)
    }

    /// Same message under a new identifier, as assigned by a store
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    fn parsed_payload(&self) -> Option<&serde_json::Value> {
        self.parsed
            .get_or_init(|| match self.format {
                PayloadFormat::Json => serde_json::from_slice(&self.payload).ok(),
                PayloadFormat::Opaque => None,
            })
            .as_ref()
    }
}

impl IdentifierResolver for Message {
    fn resolve(&self, path: &str) -> Value {
        if let Some(value) = self.data.get(path) {
            return value.clone();
        }
        if let Some(value) = self.meta.get(path) {
            return Value::Text(value.clone());
        }
        match self.parsed_payload() {
            Some(document) => JsonResolver::new(document).resolve(path),
            None => Value::Absent,
        }
    }

    fn opaque_data(&self) -> Option<&[u8]> {
        if self.payload.is_empty() {
            None
        } else {
            Some(&self.payload)
        }
    }
}

/// Fluent `Message` construction
#[derive(Debug, Default)]
pub struct MessageBuilder {
    message: Message,
}

impl MessageBuilder {
    pub fn new(id: u64) -> Self {
        Self {
            message: Message {
                id,
                ..Message::default()
            },
        }
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.message.priority = priority;
        self
    }

    pub fn qos(mut self, qos: QoS) -> Self {
        self.message.qos = qos;
        self
    }

    pub fn data(mut self, key: impl Into<CompactString>, value: impl Into<Value>) -> Self {
        self.message.data.insert(key.into(), value.into());
        self
    }

    pub fn meta(mut self, key: impl Into<CompactString>, value: impl Into<CompactString>) -> Self {
        self.message.meta.insert(key.into(), value.into());
        self
    }

    pub fn payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.message.payload = payload.into();
        self
    }

    /// JSON payload whose fields are visible to plain identifiers
    pub fn json_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.message.payload = payload.into();
        self.message.format = PayloadFormat::Json;
        self
    }

    pub fn build(self) -> Message {
        self.message
    }
}
