//! Per-metric schemas
//!
//! A schema maps field names to the value type each field is pinned to,
//! with the distinguished `value` and `timestamp` fields always present.
//! Schemas are monotone: they grow by field addition only, and a field's
//! type never changes once set.

mod actor;

pub use actor::{SchemaActor, SchemaHandle};

use crate::bit::{Bit, ValueType};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field name of the record value.
pub const VALUE_FIELD: &str = "value";
/// Field name of the record timestamp. Always `Long`.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// A metric's field-name → value-type mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: BTreeMap<String, ValueType>,
}

impl Schema {
    /// Derive the candidate schema of a record: the value's type plus every
    /// dimension's inferred type.
    pub fn from_record(bit: &Bit) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(TIMESTAMP_FIELD.to_string(), ValueType::Long);
        fields.insert(VALUE_FIELD.to_string(), bit.value.value_type());
        for (name, value) in &bit.dimensions {
            fields.insert(name.clone(), value.value_type());
        }
        Self { fields }
    }

    /// Union with a candidate schema.
    ///
    /// Fields present in both must agree on type; fields only in the
    /// candidate are added; fields only in `self` are retained. A type
    /// mismatch fails with the full list of offending fields.
    pub fn union(&self, candidate: &Schema) -> Result<Schema> {
        let conflicts: Vec<String> = candidate
            .fields
            .iter()
            .filter(|(name, candidate_type)| {
                self.fields
                    .get(*name)
                    .is_some_and(|existing| existing != *candidate_type)
            })
            .map(|(name, _)| name.clone())
            .collect();

        if !conflicts.is_empty() {
            return Err(Error::SchemaConflict { fields: conflicts });
        }

        let mut fields = self.fields.clone();
        for (name, value_type) in &candidate.fields {
            fields.insert(name.clone(), *value_type);
        }
        Ok(Schema { fields })
    }

    /// The pinned type of a field, if the field exists.
    pub fn field_type(&self, name: &str) -> Option<ValueType> {
        self.fields.get(name).copied()
    }

    /// Whether a field exists in this schema.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// All fields, sorted by name.
    pub fn fields(&self) -> impl Iterator<Item = (&str, ValueType)> {
        self.fields.iter().map(|(name, t)| (name.as_str(), *t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bit::NsdbValue;

    #[test]
    fn test_schema_from_record() {
        let bit = Bit::new(10, 0.5)
            .with_dimension("city", "rome")
            .with_dimension("age", 32i64);
        let schema = Schema::from_record(&bit);

        assert_eq!(schema.field_type(TIMESTAMP_FIELD), Some(ValueType::Long));
        assert_eq!(schema.field_type(VALUE_FIELD), Some(ValueType::Double));
        assert_eq!(schema.field_type("city"), Some(ValueType::Str));
        assert_eq!(schema.field_type("age"), Some(ValueType::Long));
    }

    #[test]
    fn test_union_adds_new_fields_and_keeps_old() {
        let first = Schema::from_record(&Bit::new(1, 1i64).with_dimension("city", "rome"));
        let second = Schema::from_record(&Bit::new(2, 2i64).with_dimension("country", "italy"));

        let merged = first.union(&second).unwrap();
        assert!(merged.has_field("city"));
        assert!(merged.has_field("country"));
    }

    #[test]
    fn test_union_rejects_type_conflicts() {
        let first = Schema::from_record(&Bit::new(1, 1i64).with_dimension("age", 32i64));
        let second = Schema::from_record(&Bit::new(2, 2.5).with_dimension("age", "thirty"));

        let err = first.union(&second).unwrap_err();
        match err {
            Error::SchemaConflict { fields } => {
                assert_eq!(fields, vec!["age".to_string(), "value".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_long_value_conflicts_with_double_value() {
        let first = Schema::from_record(&Bit::new(1, 1i64));
        let second = Schema::from_record(&Bit::new(2, NsdbValue::Double(2.0)));
        assert!(first.union(&second).is_err());
    }
}
