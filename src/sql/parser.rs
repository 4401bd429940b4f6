//! Statement parser
//!
//! Hand-written recursive descent over the token stream. The `expr`
//! alternation is ordered (range, unary NOT, left-associative AND/OR
//! folding, comparison, equality) so the grammar's left recursion never
//! materializes. `NOW` resolves against the crate clock at parse time.
//!
//! `ts`, `dim` and `val` are soft keywords: they introduce INSERT clauses
//! but remain usable as ordinary identifiers everywhere else.

use super::lexer::{Lexer, Token, TokenKind};
use super::statement::{
    Aggregation, ComparisonOperator, DeleteStatement, DropStatement, Expression, InsertStatement,
    LogicalOperator, OrderClause, OrderDirection, SelectField, SelectStatement, SelectionFields,
    Statement,
};
use crate::bit::NsdbValue;
use crate::clock::MonotonicClock;
use crate::{Error, Result};
use std::collections::BTreeMap;

const MILLIS_PER_HOUR: i64 = 3_600_000;
const MILLIS_PER_MINUTE: i64 = 60_000;
const MILLIS_PER_SECOND: i64 = 1_000;

/// Parser for the NSDb SQL dialect.
#[derive(Debug, Default)]
pub struct SqlParser {
    clock: MonotonicClock,
}

impl SqlParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `input` against the context `namespace`, resolving `NOW` from
    /// the wall clock.
    pub fn parse(&self, namespace: &str, input: &str) -> Result<Statement> {
        Self::parse_at(namespace, input, self.clock.now_millis())
    }

    /// Parse with a pinned `NOW`, for deterministic tests.
    pub fn parse_at(namespace: &str, input: &str, now_ms: i64) -> Result<Statement> {
        let tokens = Lexer::tokenize(input).map_err(|e| Error::Parse {
            message: e.message,
            remaining: input[e.offset.min(input.len())..].to_string(),
        })?;
        let mut ctx = ParseContext {
            tokens,
            pos: 0,
            input,
            namespace,
            now_ms,
        };
        let statement = ctx.parse_statement()?;
        ctx.eat(&TokenKind::Semicolon);
        if ctx.peek() != &TokenKind::Eof {
            return Err(ctx.error(format!(
                "unexpected {} after end of statement",
                ctx.peek().describe()
            )));
        }
        Ok(statement)
    }
}

struct ParseContext<'a> {
    tokens: Vec<Token>,
    pos: usize,
    input: &'a str,
    namespace: &'a str,
    now_ms: i64,
}

impl ParseContext<'_> {
    fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .map_or(&TokenKind::Eof, |t| &t.kind)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}, found {}", self.peek().describe())))
        }
    }

    /// Consume an identifier matching `word` case-insensitively.
    fn eat_soft_keyword(&mut self, word: &str) -> bool {
        if let TokenKind::Ident(text) = self.peek() {
            if text.eq_ignore_ascii_case(word) {
                self.pos += 1;
                return true;
            }
        }
        false
    }

    fn error(&self, message: impl Into<String>) -> Error {
        let offset = self
            .tokens
            .get(self.pos)
            .map_or(self.input.len(), |t| t.offset);
        Error::Parse {
            message: message.into(),
            remaining: self.input[offset..].to_string(),
        }
    }

    // ── Statements ─────────────────────────────────────────────────────

    fn parse_statement(&mut self) -> Result<Statement> {
        match self.peek() {
            TokenKind::Select => self.parse_select().map(Statement::Select),
            TokenKind::Insert => self.parse_insert().map(Statement::Insert),
            TokenKind::Delete => self.parse_delete().map(Statement::Delete),
            TokenKind::Drop => self.parse_drop().map(Statement::Drop),
            other => Err(self.error(format!(
                "expected SELECT, INSERT, DELETE or DROP, found {}",
                other.describe()
            ))),
        }
    }

    fn parse_select(&mut self) -> Result<SelectStatement> {
        self.expect(&TokenKind::Select, "SELECT")?;
        let fields = self.parse_fields()?;
        self.expect(&TokenKind::From, "FROM")?;
        let metric = self.parse_metric_name()?;

        let condition = if self.eat(&TokenKind::Where) {
            Some(self.parse_expression()?)
        } else {
            None
        };

        let group_by = if self.eat(&TokenKind::Group) {
            self.expect(&TokenKind::By, "BY")?;
            Some(self.parse_identifier()?)
        } else {
            None
        };

        let order_by = if self.eat(&TokenKind::Order) {
            self.expect(&TokenKind::By, "BY")?;
            let dimension = self.parse_identifier()?;
            let direction = if self.eat(&TokenKind::Desc) {
                OrderDirection::Desc
            } else {
                OrderDirection::Asc
            };
            Some(OrderClause {
                dimension,
                direction,
            })
        } else {
            None
        };

        let limit = if self.eat(&TokenKind::Limit) {
            match self.advance() {
                TokenKind::Long(n) => Some(n as u64),
                other => {
                    return Err(self.error(format!(
                        "expected an integer limit, found {}",
                        other.describe()
                    )));
                }
            }
        } else {
            None
        };

        Ok(SelectStatement {
            namespace: self.namespace.to_string(),
            metric,
            fields,
            condition,
            group_by,
            order_by,
            limit,
        })
    }

    fn parse_fields(&mut self) -> Result<SelectionFields> {
        if self.eat(&TokenKind::Star) {
            return Ok(SelectionFields::All);
        }
        let mut fields = vec![self.parse_field()?];
        while self.eat(&TokenKind::Comma) {
            fields.push(self.parse_field()?);
        }
        Ok(SelectionFields::List(fields))
    }

    fn parse_field(&mut self) -> Result<SelectField> {
        let aggregation = match self.peek() {
            TokenKind::Sum => Some(Aggregation::Sum),
            TokenKind::Min => Some(Aggregation::Min),
            TokenKind::Max => Some(Aggregation::Max),
            TokenKind::Count => Some(Aggregation::Count),
            _ => None,
        };
        if let Some(aggregation) = aggregation {
            self.advance();
            self.expect(&TokenKind::LParen, "(")?;
            let name = self.parse_identifier()?;
            self.expect(&TokenKind::RParen, ")")?;
            Ok(SelectField {
                name,
                aggregation: Some(aggregation),
            })
        } else {
            Ok(SelectField::plain(self.parse_identifier()?))
        }
    }

    fn parse_insert(&mut self) -> Result<InsertStatement> {
        self.expect(&TokenKind::Insert, "INSERT")?;
        self.expect(&TokenKind::Into, "INTO")?;
        let metric = self.parse_metric_name()?;

        let timestamp = if self.eat_soft_keyword("ts") {
            self.expect(&TokenKind::Eq, "=")?;
            Some(self.parse_timestamp()?)
        } else {
            None
        };

        let mut dimensions = BTreeMap::new();
        if self.eat_soft_keyword("dim") {
            self.expect(&TokenKind::LParen, "(")?;
            loop {
                let name = self.parse_identifier()?;
                self.expect(&TokenKind::Eq, "=")?;
                let value = self.parse_literal()?;
                dimensions.insert(name, value);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen, ")")?;
        }

        if !self.eat_soft_keyword("val") {
            return Err(self.error(format!("expected VAL, found {}", self.peek().describe())));
        }
        self.expect(&TokenKind::Eq, "=")?;
        let value = match self.advance() {
            TokenKind::Long(v) => NsdbValue::Long(v),
            TokenKind::Double(v) => NsdbValue::Double(v),
            other => {
                return Err(self.error(format!(
                    "expected a numeric value, found {}",
                    other.describe()
                )));
            }
        };

        Ok(InsertStatement {
            namespace: self.namespace.to_string(),
            metric,
            timestamp,
            dimensions,
            value,
        })
    }

    fn parse_delete(&mut self) -> Result<DeleteStatement> {
        self.expect(&TokenKind::Delete, "DELETE")?;
        self.expect(&TokenKind::From, "FROM")?;
        let metric = self.parse_metric_name()?;
        self.expect(&TokenKind::Where, "WHERE")?;
        let condition = self.parse_expression()?;
        Ok(DeleteStatement {
            namespace: self.namespace.to_string(),
            metric,
            condition,
        })
    }

    fn parse_drop(&mut self) -> Result<DropStatement> {
        self.expect(&TokenKind::Drop, "DROP")?;
        let metric = self.parse_metric_name()?;
        Ok(DropStatement {
            namespace: self.namespace.to_string(),
            metric,
        })
    }

    // ── Expressions ────────────────────────────────────────────────────

    /// `expr` with ordered alternatives. A leading NOT binds the whole
    /// remaining expression; AND/OR chains fold left-associatively.
    fn parse_expression(&mut self) -> Result<Expression> {
        let mut expr = if self.eat(&TokenKind::Not) {
            Expression::not(self.parse_expression()?)
        } else {
            self.parse_term_expression()?
        };

        loop {
            let operator = match self.peek() {
                TokenKind::And => LogicalOperator::And,
                TokenKind::Or => LogicalOperator::Or,
                _ => break,
            };
            self.advance();
            let right = if self.eat(&TokenKind::Not) {
                Expression::not(self.parse_expression()?)
            } else {
                self.parse_term_expression()?
            };
            expr = Expression::tupled(expr, operator, right);
        }

        Ok(expr)
    }

    /// `termExpr ::= range | comparison | equality`, dispatched on the
    /// operator following the dimension.
    fn parse_term_expression(&mut self) -> Result<Expression> {
        let dimension = self.parse_identifier()?;

        match self.peek() {
            TokenKind::In => {
                self.advance();
                self.expect(&TokenKind::LParen, "(")?;
                let from = self.parse_timestamp()?;
                self.expect(&TokenKind::Comma, ",")?;
                let to = self.parse_timestamp()?;
                self.expect(&TokenKind::RParen, ")")?;
                Ok(Expression::Range {
                    dimension,
                    from,
                    to,
                })
            }
            TokenKind::Gt | TokenKind::GtEq | TokenKind::Lt | TokenKind::LtEq => {
                let operator = match self.advance() {
                    TokenKind::Gt => ComparisonOperator::Greater,
                    TokenKind::GtEq => ComparisonOperator::GreaterOrEqual,
                    TokenKind::Lt => ComparisonOperator::Less,
                    TokenKind::LtEq => ComparisonOperator::LessOrEqual,
                    _ => unreachable!("operator token checked above"),
                };
                let value = self.parse_timestamp()?;
                Ok(Expression::Comparison {
                    dimension,
                    operator,
                    value,
                })
            }
            TokenKind::Eq => {
                self.advance();
                let value = self.parse_literal()?;
                Ok(Expression::Equality { dimension, value })
            }
            other => Err(self.error(format!(
                "expected IN, a comparison operator or =, found {}",
                other.describe()
            ))),
        }
    }

    /// `STRING | FLOAT | timestamp`
    fn parse_literal(&mut self) -> Result<NsdbValue> {
        match self.peek() {
            TokenKind::Str(_) => match self.advance() {
                TokenKind::Str(s) => Ok(NsdbValue::Str(s)),
                _ => unreachable!("string token checked above"),
            },
            TokenKind::Double(_) => match self.advance() {
                TokenKind::Double(v) => Ok(NsdbValue::Double(v)),
                _ => unreachable!("float token checked above"),
            },
            _ => Ok(NsdbValue::Long(self.parse_timestamp()?)),
        }
    }

    /// `timestamp ::= NOW [("+"|"-") LONG ("h"|"m"|"s")] | LONG`
    fn parse_timestamp(&mut self) -> Result<i64> {
        if self.eat(&TokenKind::Now) {
            let sign = if self.eat(&TokenKind::Plus) {
                1
            } else if self.eat(&TokenKind::Minus) {
                -1
            } else {
                return Ok(self.now_ms);
            };
            let amount = match self.advance() {
                TokenKind::Long(n) => n,
                other => {
                    return Err(self.error(format!(
                        "expected a delta amount after NOW, found {}",
                        other.describe()
                    )));
                }
            };
            let unit = match self.advance() {
                TokenKind::Ident(u) if u.eq_ignore_ascii_case("h") => MILLIS_PER_HOUR,
                TokenKind::Ident(u) if u.eq_ignore_ascii_case("m") => MILLIS_PER_MINUTE,
                TokenKind::Ident(u) if u.eq_ignore_ascii_case("s") => MILLIS_PER_SECOND,
                other => {
                    return Err(self.error(format!(
                        "expected a delta unit (h, m or s), found {}",
                        other.describe()
                    )));
                }
            };
            Ok(self.now_ms + sign * amount * unit)
        } else {
            match self.advance() {
                TokenKind::Long(n) => Ok(n),
                other => Err(self.error(format!(
                    "expected a timestamp, found {}",
                    other.describe()
                ))),
            }
        }
    }

    // ── Identifiers ────────────────────────────────────────────────────

    fn parse_identifier(&mut self) -> Result<String> {
        match self.peek() {
            TokenKind::Ident(_) => match self.advance() {
                TokenKind::Ident(name) => Ok(name),
                _ => unreachable!("identifier token checked above"),
            },
            TokenKind::Now => Err(self.error("NOW is reserved and cannot be used as identifier")),
            other => Err(self.error(format!(
                "expected an identifier, found {}",
                other.describe()
            ))),
        }
    }

    /// Metric names must start with a letter.
    fn parse_metric_name(&mut self) -> Result<String> {
        let start = self.pos;
        let name = self.parse_identifier()?;
        if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
            self.pos = start;
            return Err(self.error(format!("invalid metric name {name:?}")));
        }
        Ok(name)
    }
}
