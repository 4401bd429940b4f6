//! SQL front-end
//!
//! Converts query text into a typed statement AST for SELECT, INSERT,
//! DELETE and DROP against a context namespace. `NOW` is resolved to
//! epoch-ms at parse time.

mod lexer;
mod parser;
mod statement;

pub use parser::SqlParser;
pub use statement::{
    Aggregation, ComparisonOperator, DeleteStatement, DropStatement, Expression, InsertStatement,
    LogicalOperator, OrderClause, OrderDirection, SelectField, SelectStatement, SelectionFields,
    Statement,
};
