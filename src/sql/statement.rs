//! Statement AST
//!
//! The typed representation produced by the parser and consumed by the
//! coordinators. `Display` renders a statement back to query text that
//! parses to an equal AST.

use crate::bit::NsdbValue;
use std::collections::BTreeMap;
use std::fmt;

/// A parsed statement, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Delete(DeleteStatement),
    Drop(DropStatement),
}

impl Statement {
    /// The context namespace the statement was parsed against.
    pub fn namespace(&self) -> &str {
        match self {
            Statement::Select(s) => &s.namespace,
            Statement::Insert(s) => &s.namespace,
            Statement::Delete(s) => &s.namespace,
            Statement::Drop(s) => &s.namespace,
        }
    }

    /// The metric the statement targets.
    pub fn metric(&self) -> &str {
        match self {
            Statement::Select(s) => &s.metric,
            Statement::Insert(s) => &s.metric,
            Statement::Delete(s) => &s.metric,
            Statement::Drop(s) => &s.metric,
        }
    }
}

/// Aggregation applied to a selected field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Min,
    Max,
    Count,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Sum => write!(f, "SUM"),
            Aggregation::Min => write!(f, "MIN"),
            Aggregation::Max => write!(f, "MAX"),
            Aggregation::Count => write!(f, "COUNT"),
        }
    }
}

/// One entry of a select list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectField {
    pub name: String,
    pub aggregation: Option<Aggregation>,
}

impl SelectField {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aggregation: None,
        }
    }

    pub fn aggregated(name: impl Into<String>, aggregation: Aggregation) -> Self {
        Self {
            name: name.into(),
            aggregation: Some(aggregation),
        }
    }
}

impl fmt::Display for SelectField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.aggregation {
            Some(agg) => write!(f, "{agg}({})", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// The projected fields of a SELECT. `*` excludes mixing with named fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionFields {
    All,
    List(Vec<SelectField>),
}

impl fmt::Display for SelectionFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionFields::All => write!(f, "*"),
            SelectionFields::List(fields) => {
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                Ok(())
            }
        }
    }
}

/// Comparison operators over long-typed fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonOperator::Greater => write!(f, ">"),
            ComparisonOperator::GreaterOrEqual => write!(f, ">="),
            ComparisonOperator::Less => write!(f, "<"),
            ComparisonOperator::LessOrEqual => write!(f, "<="),
        }
    }
}

/// Binary logical connectives. Chains are left-associative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOperator::And => write!(f, "AND"),
            LogicalOperator::Or => write!(f, "OR"),
        }
    }
}

/// A WHERE condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `dim = literal`
    Equality { dimension: String, value: NsdbValue },
    /// `dim <op> timestamp`
    Comparison {
        dimension: String,
        operator: ComparisonOperator,
        value: i64,
    },
    /// `dim IN (from, to)` over epoch-ms endpoints
    Range {
        dimension: String,
        from: i64,
        to: i64,
    },
    /// `NOT expr` — binds the whole remaining expression
    UnaryLogical { expression: Box<Expression> },
    /// `left AND/OR right`
    TupledLogical {
        left: Box<Expression>,
        operator: LogicalOperator,
        right: Box<Expression>,
    },
}

impl Expression {
    pub fn not(expression: Expression) -> Self {
        Expression::UnaryLogical {
            expression: Box::new(expression),
        }
    }

    pub fn tupled(left: Expression, operator: LogicalOperator, right: Expression) -> Self {
        Expression::TupledLogical {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Equality { dimension, value } => match value {
                NsdbValue::Str(s) => write!(f, "{dimension} = '{s}'"),
                other => write!(f, "{dimension} = {other}"),
            },
            Expression::Comparison {
                dimension,
                operator,
                value,
            } => write!(f, "{dimension} {operator} {value}"),
            Expression::Range {
                dimension,
                from,
                to,
            } => write!(f, "{dimension} IN ({from}, {to})"),
            Expression::UnaryLogical { expression } => write!(f, "NOT {expression}"),
            Expression::TupledLogical {
                left,
                operator,
                right,
            } => write!(f, "{left} {operator} {right}"),
        }
    }
}

/// Ordering direction of an ORDER BY clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// ORDER BY clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderClause {
    pub dimension: String,
    pub direction: OrderDirection,
}

impl fmt::Display for OrderClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ORDER BY {}", self.dimension)?;
        if self.direction == OrderDirection::Desc {
            write!(f, " DESC")?;
        }
        Ok(())
    }
}

/// `SELECT fields FROM metric [WHERE ...] [GROUP BY ...] [ORDER BY ...] [LIMIT n]`
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub namespace: String,
    pub metric: String,
    pub fields: SelectionFields,
    pub condition: Option<Expression>,
    pub group_by: Option<String>,
    pub order_by: Option<OrderClause>,
    pub limit: Option<u64>,
}

impl fmt::Display for SelectStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT {} FROM {}", self.fields, self.metric)?;
        if let Some(condition) = &self.condition {
            write!(f, " WHERE {condition}")?;
        }
        if let Some(group_by) = &self.group_by {
            write!(f, " GROUP BY {group_by}")?;
        }
        if let Some(order_by) = &self.order_by {
            write!(f, " {order_by}")?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        Ok(())
    }
}

/// `INSERT INTO metric [TS = ts] [DIM (...)] VAL = value`
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub namespace: String,
    pub metric: String,
    pub timestamp: Option<i64>,
    pub dimensions: BTreeMap<String, NsdbValue>,
    pub value: NsdbValue,
}

impl fmt::Display for InsertStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "INSERT INTO {}", self.metric)?;
        if let Some(ts) = self.timestamp {
            write!(f, " TS = {ts}")?;
        }
        if !self.dimensions.is_empty() {
            write!(f, " DIM (")?;
            for (i, (name, value)) in self.dimensions.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                match value {
                    NsdbValue::Str(s) => write!(f, "{name} = '{s}'")?,
                    other => write!(f, "{name} = {other}")?,
                }
            }
            write!(f, ")")?;
        }
        write!(f, " VAL = {}", self.value)
    }
}

/// `DELETE FROM metric WHERE expr`
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub namespace: String,
    pub metric: String,
    pub condition: Expression,
}

impl fmt::Display for DeleteStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DELETE FROM {} WHERE {}", self.metric, self.condition)
    }
}

/// `DROP metric`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropStatement {
    pub namespace: String,
    pub metric: String,
}

impl fmt::Display for DropStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DROP {}", self.metric)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Select(s) => write!(f, "{s}"),
            Statement::Insert(s) => write!(f, "{s}"),
            Statement::Delete(s) => write!(f, "{s}"),
            Statement::Drop(s) => write!(f, "{s}"),
        }
    }
}
