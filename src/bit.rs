//! The record model
//!
//! A `Bit` is a single time-series record: an epoch-ms timestamp, a numeric
//! value and a set of string-keyed dimensions. Values are a tagged sum so a
//! schema can pin which variant a field may carry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// The type a field is pinned to by a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// 64-bit signed integer
    Long,
    /// 64-bit float
    Double,
    /// UTF-8 string
    Str,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Long => write!(f, "LONG"),
            ValueType::Double => write!(f, "DOUBLE"),
            ValueType::Str => write!(f, "STRING"),
        }
    }
}

/// A dynamically typed scalar carried by records and dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NsdbValue {
    Long(i64),
    Double(f64),
    Str(String),
}

impl NsdbValue {
    /// The schema type of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            NsdbValue::Long(_) => ValueType::Long,
            NsdbValue::Double(_) => ValueType::Double,
            NsdbValue::Str(_) => ValueType::Str,
        }
    }

    /// Numeric view, when the value is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NsdbValue::Long(v) => Some(*v as f64),
            NsdbValue::Double(v) => Some(*v),
            NsdbValue::Str(_) => None,
        }
    }
}

// Double equality is bitwise so that record identity is hashable and the
// shard index can deduplicate appends.
impl PartialEq for NsdbValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NsdbValue::Long(a), NsdbValue::Long(b)) => a == b,
            (NsdbValue::Double(a), NsdbValue::Double(b)) => a.to_bits() == b.to_bits(),
            (NsdbValue::Str(a), NsdbValue::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for NsdbValue {}

impl Hash for NsdbValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            NsdbValue::Long(v) => {
                0u8.hash(state);
                v.hash(state);
            }
            NsdbValue::Double(v) => {
                1u8.hash(state);
                v.to_bits().hash(state);
            }
            NsdbValue::Str(v) => {
                2u8.hash(state);
                v.hash(state);
            }
        }
    }
}

impl fmt::Display for NsdbValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NsdbValue::Long(v) => write!(f, "{v}"),
            // Keep a decimal point so the rendering lexes as a float again.
            NsdbValue::Double(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            NsdbValue::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for NsdbValue {
    fn from(v: i64) -> Self {
        NsdbValue::Long(v)
    }
}

impl From<f64> for NsdbValue {
    fn from(v: f64) -> Self {
        NsdbValue::Double(v)
    }
}

impl From<&str> for NsdbValue {
    fn from(v: &str) -> Self {
        NsdbValue::Str(v.to_string())
    }
}

impl From<String> for NsdbValue {
    fn from(v: String) -> Self {
        NsdbValue::Str(v)
    }
}

/// A single time-series record.
///
/// Identity is the full `(timestamp, value, dimensions)` triple; two records
/// that agree on all three are the same record, which is what the shard
/// index deduplicates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bit {
    /// Event time, epoch-ms. Never negative.
    pub timestamp: i64,
    /// The measured value.
    pub value: NsdbValue,
    /// String-keyed dimensions.
    pub dimensions: BTreeMap<String, NsdbValue>,
}

impl Bit {
    /// Create a record with no dimensions.
    pub fn new(timestamp: i64, value: impl Into<NsdbValue>) -> Self {
        Self {
            timestamp,
            value: value.into(),
            dimensions: BTreeMap::new(),
        }
    }

    /// Attach a dimension.
    pub fn with_dimension(mut self, name: impl Into<String>, value: impl Into<NsdbValue>) -> Self {
        self.dimensions.insert(name.into(), value.into());
        self
    }
}
