use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::ItemError;

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// A point in time, as understood by the trapper protocol.
///
/// `clock` is the number of whole seconds since the Unix epoch, and `ns` is the nanosecond-of-second remainder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    /// Seconds since the Unix epoch.
    pub clock: i64,

    /// Nanoseconds within the second.
    pub ns: u32,
}

impl Timestamp {
    /// Creates a `Timestamp` from the given seconds and nanoseconds.
    pub const fn new(clock: i64, ns: u32) -> Self {
        Self { clock, ns }
    }

    /// Returns the current wall-clock time.
    ///
    /// Clocks set before the Unix epoch are clamped to the epoch itself.
    pub fn now() -> Self {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| Self::new(d.as_secs() as i64, d.subsec_nanos()))
            .unwrap_or(Self::new(0, 0))
    }
}

/// An item value.
///
/// The trapper accepts both strings and numbers, so values are serialized as whichever JSON type they were created
/// from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A signed integer.
    Int(i64),

    /// An unsigned integer.
    UInt(u64),

    /// A floating-point number.
    Float(f64),

    /// A string.
    Str(String),
}

macro_rules! impl_value_from {
    ($variant:ident, $target:ty, $($t:ty),+) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(<$target>::from(v))
                }
            }
        )+
    };
}

impl_value_from!(Int, i64, i8, i16, i32, i64);
impl_value_from!(UInt, u64, u8, u16, u32, u64);
impl_value_from!(Float, f64, f32, f64);
impl_value_from!(Str, String, &str, String);

/// A single value for a trapper item.
///
/// Items are addressed by `host` and `key`. When no host is set, the sender's `items_host` is filled in when the item
/// is added to the backlog. The optional `clock`/`ns` pair records when the value was observed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    key: String,
    value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    clock: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ns: Option<u32>,
}

impl Item {
    /// Creates a new `Item` for the given key and value.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self { host: None, key: key.into(), value: value.into(), clock: None, ns: None }
    }

    /// Sets the host this item belongs to.
    #[must_use]
    pub fn with_host<H: Into<String>>(mut self, host: H) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the clock, in seconds since the Unix epoch, at which the value was observed.
    #[must_use]
    pub fn with_clock(mut self, clock: i64) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets both the clock and the nanosecond-of-second at which the value was observed.
    #[must_use]
    pub fn with_timestamp(mut self, ts: Timestamp) -> Self {
        self.clock = Some(ts.clock);
        self.ns = Some(ts.ns);
        self
    }

    /// Returns the host, if set.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Returns the key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Returns the clock, if set.
    pub fn clock(&self) -> Option<i64> {
        self.clock
    }

    /// Returns the nanosecond-of-second, if set.
    pub fn ns(&self) -> Option<u32> {
        self.ns
    }

    pub(crate) fn validate(&self) -> Result<(), ItemError> {
        if self.key.is_empty() {
            return Err(ItemError::EmptyKey);
        }

        match self.ns {
            Some(ns) if ns >= NANOS_PER_SEC => Err(ItemError::NanosecondsOutOfRange(ns)),
            _ => Ok(()),
        }
    }

    pub(crate) fn fill_host(&mut self, host: &str) {
        if !matches!(self.host.as_deref(), Some(h) if !h.is_empty()) {
            self.host = Some(host.to_string());
        }
    }

    /// Stamps the item with `ts`, replacing any clock it already carries.
    pub(crate) fn stamp(&mut self, ts: Timestamp, with_ns: bool) {
        self.clock = Some(ts.clock);
        self.ns = with_ns.then_some(ts.ns);
    }
}
