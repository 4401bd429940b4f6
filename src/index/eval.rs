//! Statement evaluation over indexed records
//!
//! WHERE trees match records with numeric coercion between longs and
//! doubles; range endpoints are inclusive. Select evaluation projects,
//! groups, aggregates, orders and limits.

use crate::bit::{Bit, NsdbValue, ValueType};
use crate::schema::{Schema, TIMESTAMP_FIELD, VALUE_FIELD};
use crate::sql::{
    Aggregation, ComparisonOperator, Expression, OrderDirection, SelectStatement, SelectionFields,
};
use crate::{Error, Result};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// The value a record carries for a field name, `timestamp` and `value`
/// included.
fn field_value(bit: &Bit, name: &str) -> Option<NsdbValue> {
    match name {
        TIMESTAMP_FIELD => Some(NsdbValue::Long(bit.timestamp)),
        VALUE_FIELD => Some(bit.value.clone()),
        dimension => bit.dimensions.get(dimension).cloned(),
    }
}

/// Whether a record satisfies a condition tree. Records lacking a referenced
/// dimension never match the leaf.
pub(crate) fn matches(condition: &Expression, bit: &Bit) -> bool {
    match condition {
        Expression::Equality { dimension, value } => {
            field_value(bit, dimension).is_some_and(|field| values_equal(&field, value))
        }
        Expression::Comparison {
            dimension,
            operator,
            value,
        } => field_value(bit, dimension)
            .and_then(|field| field.as_f64())
            .is_some_and(|field| {
                let value = *value as f64;
                match operator {
                    ComparisonOperator::Greater => field > value,
                    ComparisonOperator::GreaterOrEqual => field >= value,
                    ComparisonOperator::Less => field < value,
                    ComparisonOperator::LessOrEqual => field <= value,
                }
            }),
        Expression::Range {
            dimension,
            from,
            to,
        } => field_value(bit, dimension)
            .and_then(|field| field.as_f64())
            .is_some_and(|field| field >= *from as f64 && field <= *to as f64),
        Expression::UnaryLogical { expression } => !matches(expression, bit),
        Expression::TupledLogical {
            left,
            operator,
            right,
        } => match operator {
            crate::sql::LogicalOperator::And => matches(left, bit) && matches(right, bit),
            crate::sql::LogicalOperator::Or => matches(left, bit) || matches(right, bit),
        },
    }
}

/// Equality with numeric coercion: a long and a double are equal when they
/// denote the same number.
fn values_equal(a: &NsdbValue, b: &NsdbValue) -> bool {
    match (a, b) {
        (NsdbValue::Str(a), NsdbValue::Str(b)) => a == b,
        (NsdbValue::Str(_), _) | (_, NsdbValue::Str(_)) => false,
        _ => a.as_f64() == b.as_f64(),
    }
}

/// Ordering used by ORDER BY: numerics compare numerically, strings
/// lexically, and a missing field sorts first.
pub(crate) fn compare_field(a: &Bit, b: &Bit, field: &str) -> Ordering {
    match (field_value(a, field), field_value(b, field)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (&a, &b) {
            (NsdbValue::Str(a), NsdbValue::Str(b)) => a.cmp(b),
            _ => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            },
        },
    }
}

/// Evaluate a select statement over the metric's indexed records.
pub(crate) fn execute_select(
    statement: &SelectStatement,
    schema: &Schema,
    bits: Vec<Bit>,
) -> Result<Vec<Bit>> {
    let mut matched: Vec<Bit> = match &statement.condition {
        Some(condition) => bits
            .into_iter()
            .filter(|bit| matches(condition, bit))
            .collect(),
        None => bits,
    };
    // Deterministic base order before projection and grouping.
    matched.sort_by_key(|bit| bit.timestamp);

    let aggregation = match &statement.fields {
        SelectionFields::List(fields) => {
            for field in fields {
                if !schema.has_field(&field.name) {
                    return Err(Error::SelectFailed(format!(
                        "unknown field {} for metric {}",
                        field.name, statement.metric
                    )));
                }
            }
            fields
                .iter()
                .find_map(|field| field.aggregation.map(|agg| (field.name.clone(), agg)))
        }
        SelectionFields::All => None,
    };

    let mut rows = match (&statement.group_by, aggregation) {
        (Some(group_by), aggregation) => {
            let (field, agg) =
                aggregation.ok_or_else(|| {
                    Error::SelectFailed(format!(
                        "GROUP BY {group_by} requires an aggregated field"
                    ))
                })?;
            check_aggregable(schema, &field, agg)?;
            let mut groups: BTreeMap<String, Vec<Bit>> = BTreeMap::new();
            for bit in matched {
                let Some(group_value) = bit.dimensions.get(group_by).map(|v| v.to_string()) else {
                    continue;
                };
                groups.entry(group_value).or_default().push(bit);
            }
            groups
                .into_iter()
                .map(|(group_value, group)| {
                    let timestamp = group.iter().map(|b| b.timestamp).max().unwrap_or(0);
                    let value = aggregate(&field, agg, &group, schema);
                    Bit::new(timestamp, value).with_dimension(group_by.clone(), group_value)
                })
                .collect()
        }
        (None, Some((field, agg))) => {
            check_aggregable(schema, &field, agg)?;
            if matched.is_empty() && agg != Aggregation::Count {
                Vec::new()
            } else {
                let timestamp = matched.iter().map(|b| b.timestamp).max().unwrap_or(0);
                let value = aggregate(&field, agg, &matched, schema);
                vec![Bit::new(timestamp, value)]
            }
        }
        (None, None) => match &statement.fields {
            SelectionFields::All => matched,
            SelectionFields::List(fields) => {
                let keep: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
                matched
                    .into_iter()
                    .map(|mut bit| {
                        bit.dimensions.retain(|name, _| keep.contains(&name.as_str()));
                        bit
                    })
                    .collect()
            }
        },
    };

    if let Some(order_by) = &statement.order_by {
        rows.sort_by(|a, b| {
            let ordering = compare_field(a, b, &order_by.dimension);
            match order_by.direction {
                OrderDirection::Asc => ordering,
                OrderDirection::Desc => ordering.reverse(),
            }
        });
    }

    if let Some(limit) = statement.limit {
        rows.truncate(limit as usize);
    }

    Ok(rows)
}

fn check_aggregable(schema: &Schema, field: &str, agg: Aggregation) -> Result<()> {
    if agg == Aggregation::Count {
        return Ok(());
    }
    match schema.field_type(field) {
        Some(ValueType::Long) | Some(ValueType::Double) => Ok(()),
        _ => Err(Error::SelectFailed(format!(
            "{agg} requires a numeric field, {field} is not"
        ))),
    }
}

fn aggregate(field: &str, agg: Aggregation, group: &[Bit], schema: &Schema) -> NsdbValue {
    if agg == Aggregation::Count {
        return NsdbValue::Long(group.len() as i64);
    }

    let values: Vec<f64> = group
        .iter()
        .filter_map(|bit| field_value(bit, field).and_then(|v| v.as_f64()))
        .collect();
    let result = match agg {
        Aggregation::Sum => values.iter().sum(),
        Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Aggregation::Count => unreachable!("handled above"),
    };

    // The schema pins the variant the aggregate reports.
    match schema.field_type(field) {
        Some(ValueType::Long) => NsdbValue::Long(result as i64),
        _ => NsdbValue::Double(result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{LogicalOperator, OrderClause, SelectField};

    fn sample_bits() -> Vec<Bit> {
        vec![
            Bit::new(10, 1.0)
                .with_dimension("city", "rome")
                .with_dimension("age", 30i64),
            Bit::new(20, 2.0)
                .with_dimension("city", "rome")
                .with_dimension("age", 40i64),
            Bit::new(30, 3.0)
                .with_dimension("city", "paris")
                .with_dimension("age", 50i64),
        ]
    }

    fn sample_schema() -> Schema {
        Schema::from_record(&sample_bits()[0])
    }

    fn select(fields: SelectionFields) -> SelectStatement {
        SelectStatement {
            namespace: "ns".to_string(),
            metric: "people".to_string(),
            fields,
            condition: None,
            group_by: None,
            order_by: None,
            limit: None,
        }
    }

    #[test]
    fn test_equality_coerces_numerics() {
        let bit = Bit::new(1, 1i64).with_dimension("age", 30i64);
        let condition = Expression::Equality {
            dimension: "age".to_string(),
            value: NsdbValue::Double(30.0),
        };
        assert!(matches(&condition, &bit));
    }

    #[test]
    fn test_missing_dimension_never_matches() {
        let bit = Bit::new(1, 1i64);
        let condition = Expression::Equality {
            dimension: "city".to_string(),
            value: NsdbValue::from("rome"),
        };
        assert!(!matches(&condition, &bit));
        assert!(matches(&Expression::not(condition), &bit));
    }

    #[test]
    fn test_tupled_and_or() {
        let bit = Bit::new(1, 1i64).with_dimension("city", "rome");
        let rome = Expression::Equality {
            dimension: "city".to_string(),
            value: NsdbValue::from("rome"),
        };
        let recent = Expression::Comparison {
            dimension: "timestamp".to_string(),
            operator: ComparisonOperator::Greater,
            value: 100,
        };
        assert!(!matches(
            &Expression::tupled(rome.clone(), LogicalOperator::And, recent.clone()),
            &bit
        ));
        assert!(matches(
            &Expression::tupled(rome, LogicalOperator::Or, recent),
            &bit
        ));
    }

    #[test]
    fn test_select_all_filters_and_orders_by_timestamp() {
        let mut stmt = select(SelectionFields::All);
        stmt.condition = Some(Expression::Range {
            dimension: "timestamp".to_string(),
            from: 10,
            to: 20,
        });
        let rows = execute_select(&stmt, &sample_schema(), sample_bits()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp, 10);
        assert_eq!(rows[1].timestamp, 20);
    }

    #[test]
    fn test_projection_keeps_only_named_dimensions() {
        let stmt = select(SelectionFields::List(vec![SelectField::plain("city")]));
        let rows = execute_select(&stmt, &sample_schema(), sample_bits()).unwrap();
        assert!(rows.iter().all(|bit| bit.dimensions.len() == 1));
        assert!(rows.iter().all(|bit| bit.dimensions.contains_key("city")));
    }

    #[test]
    fn test_unknown_projection_field_fails() {
        let stmt = select(SelectionFields::List(vec![SelectField::plain("country")]));
        let err = execute_select(&stmt, &sample_schema(), sample_bits()).unwrap_err();
        assert!(matches!(err, Error::SelectFailed(_)));
    }

    #[test]
    fn test_group_by_with_sum() {
        let mut stmt = select(SelectionFields::List(vec![SelectField::aggregated(
            "value",
            Aggregation::Sum,
        )]));
        stmt.group_by = Some("city".to_string());
        let rows = execute_select(&stmt, &sample_schema(), sample_bits()).unwrap();

        assert_eq!(rows.len(), 2);
        let by_city: BTreeMap<String, NsdbValue> = rows
            .into_iter()
            .map(|bit| (bit.dimensions["city"].to_string(), bit.value))
            .collect();
        assert_eq!(by_city["rome"], NsdbValue::Double(3.0));
        assert_eq!(by_city["paris"], NsdbValue::Double(3.0));
    }

    #[test]
    fn test_ungrouped_count() {
        let stmt = select(SelectionFields::List(vec![SelectField::aggregated(
            "value",
            Aggregation::Count,
        )]));
        let rows = execute_select(&stmt, &sample_schema(), sample_bits()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, NsdbValue::Long(3));

        let empty = execute_select(&stmt, &sample_schema(), Vec::new()).unwrap();
        assert_eq!(empty[0].value, NsdbValue::Long(0));
    }

    #[test]
    fn test_order_by_desc_with_limit() {
        let mut stmt = select(SelectionFields::All);
        stmt.order_by = Some(OrderClause {
            dimension: "age".to_string(),
            direction: OrderDirection::Desc,
        });
        stmt.limit = Some(2);
        let rows = execute_select(&stmt, &sample_schema(), sample_bits()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].dimensions["age"], NsdbValue::Long(50));
        assert_eq!(rows[1].dimensions["age"], NsdbValue::Long(40));
    }
}
