//! Structured-payload parser extensions
//!
//! Extensions let a selector reach into the opaque payload of a message,
//! e.g. `PARSER('json', 'sensor.temperature') > 40` or the short form
//! `json('sensor.temperature') > 40`. Which extension names are accepted
//! is decided by configuration when the compiler is built.

use std::fmt;

use compact_str::CompactString;

use super::value::Value;
use crate::resolver::{IdentifierResolver, JsonResolver};

/// Built-in payload parsers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParserKind {
    /// Payload is a JSON document
    Json,
}

impl ParserKind {
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("json") {
            Some(ParserKind::Json)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParserKind::Json => "json",
        }
    }

    fn extract(self, payload: &[u8], path: &str) -> Value {
        match self {
            ParserKind::Json => match serde_json::from_slice::<serde_json::Value>(payload) {
                Ok(document) => JsonResolver::new(&document).resolve(path),
                Err(_) => Value::Absent,
            },
        }
    }
}

/// Set of parser extensions a compiler accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRegistry {
    enabled: Vec<ParserKind>,
}

impl ExtensionRegistry {
    /// Registry with no extensions
    pub fn empty() -> Self {
        Self { enabled: vec![] }
    }

    /// Build a registry from configured names; returns the first unknown name on failure
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, String> {
        let mut enabled = Vec::with_capacity(names.len());
        for name in names {
            let kind = ParserKind::from_name(name.as_ref())
                .ok_or_else(|| name.as_ref().to_string())?;
            if !enabled.contains(&kind) {
                enabled.push(kind);
            }
        }
        Ok(Self { enabled })
    }

    pub fn lookup(&self, name: &str) -> Option<ParserKind> {
        ParserKind::from_name(name).filter(|kind| self.enabled.contains(kind))
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self {
            enabled: vec![ParserKind::Json],
        }
    }
}

/// How the parser for a call is chosen
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParserSource {
    /// Fixed at compile time
    Named(ParserKind),
    /// Read from a message field at evaluation time
    Field(CompactString),
}

/// A parser extension call node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExtensionCall {
    source: ParserSource,
    path: CompactString,
}

impl ExtensionCall {
    pub fn new(source: ParserSource, path: CompactString) -> Self {
        Self { source, path }
    }

    pub fn source(&self) -> &ParserSource {
        &self.source
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Extract the configured path from the resolver's opaque payload.
    ///
    /// A field-selected parser must name an extension this build knows;
    /// anything else is unknown rather than an error.
    pub fn evaluate(&self, resolver: &dyn IdentifierResolver) -> Value {
        let kind = match &self.source {
            ParserSource::Named(kind) => *kind,
            ParserSource::Field(field) => match resolver.resolve(field) {
                Value::Text(name) => match ParserKind::from_name(&name) {
                    Some(kind) => kind,
                    None => return Value::Absent,
                },
                _ => return Value::Absent,
            },
        };

        match resolver.opaque_data() {
            Some(payload) if !payload.is_empty() => kind.extract(payload, &self.path),
            _ => Value::Absent,
        }
    }
}

impl fmt::Display for ExtensionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            ParserSource::Named(kind) => write!(f, "PARSER('{}', ", kind.as_str())?,
            ParserSource::Field(field) => write!(f, "PARSER({}, ", field)?,
        }
        write!(f, "'{}')", self.path.replace('\'', "''"))
    }
}
