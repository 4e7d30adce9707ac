//! Dynamic value types for dictionary entries.
//!
//! Defines [`Value`], the closed tagged union stored under every dictionary
//! key, along with [`ValueKind`] (the tag), [`Timestamp`], and [`ObjectRef`].
//! Mixed-kind dictionaries are permitted; there is no per-collection type
//! constraint.
//!
//! # Equality
//!
//! A value's tag determines its comparison rules. Equality is deep
//! (tag + content). `Float` compares by IEEE-754 bit pattern so that
//! equality is deterministic: `NaN == NaN` and `0.0 != -0.0`. This is what
//! change tracking relies on to decide whether a rewrite is a modification
//! or a no-op.
//!
//! # Serialization
//!
//! Serializes to `MsgPack` via `rmp-serde`. Durable encoding is delegated to
//! whatever transactional backend embeds the store; this crate only fixes
//! the logical representation.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A point in time with nanosecond precision.
///
/// Stored as seconds since the Unix epoch plus a sub-second nanosecond
/// component in `0..1_000_000_000`. Ordering is seconds first, then nanos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Whole seconds since the Unix epoch. May be negative.
    pub seconds: i64,
    /// Sub-second nanoseconds, always in `0..1_000_000_000`.
    pub nanos: u32,
}

impl Timestamp {
    /// Creates a timestamp from seconds and nanoseconds.
    #[must_use]
    pub fn new(seconds: i64, nanos: u32) -> Self {
        Self { seconds, nanos }
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.seconds
            .cmp(&other.seconds)
            .then_with(|| self.nanos.cmp(&other.nanos))
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Reference to an object living outside the dictionary.
///
/// Used by both [`Value::Embedded`] (the referenced object is owned by the
/// dictionary entry) and [`Value::Link`] (a plain cross-reference). The
/// store treats both as opaque identifiers; resolution is the embedding
/// layer's concern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Name of the table or class the target object belongs to.
    pub table: String,
    /// Primary key of the target object within its table.
    pub key: String,
}

impl ObjectRef {
    /// Creates an object reference from a table name and primary key.
    #[must_use]
    pub fn new(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
        }
    }
}

/// Dynamically-typed dictionary value.
///
/// Closed tagged union; the tag is exposed as [`ValueKind`] via
/// [`Value::kind`]. See the module docs for equality and serialization
/// rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Absent-but-present value (distinct from a missing key).
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit IEEE 754 floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Opaque binary payload.
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    /// Point in time with nanosecond precision.
    Timestamp(Timestamp),
    /// Reference to an embedded object owned by this entry.
    Embedded(ObjectRef),
    /// Link to an independent object.
    Link(ObjectRef),
}

/// The tag of a [`Value`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    String,
    Bytes,
    Timestamp,
    Embedded,
    Link,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Timestamp => "timestamp",
            Self::Embedded => "embedded",
            Self::Link => "link",
        };
        f.write_str(name)
    }
}

impl Value {
    /// Returns the tag of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::String(_) => ValueKind::String,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Timestamp(_) => ValueKind::Timestamp,
            Self::Embedded(_) => ValueKind::Embedded,
            Self::Link(_) => ValueKind::Link,
        }
    }

    /// Returns the boolean payload, or `None` if the tag differs.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer payload, or `None` if the tag differs.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the float payload, or `None` if the tag differs.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the string payload, or `None` if the tag differs.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the binary payload, or `None` if the tag differs.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the timestamp payload, or `None` if the tag differs.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            // Bit-pattern comparison: deterministic under NaN and signed zero.
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::Embedded(a), Self::Embedded(b)) | (Self::Link(a), Self::Link(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Self::Timestamp(v)
    }
}
