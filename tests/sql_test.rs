//! Integration tests for the SQL front-end, including the pretty-print
//! round-trip over generated statements.

use nsdb::bit::NsdbValue;
use nsdb::sql::{
    Aggregation, ComparisonOperator, DeleteStatement, DropStatement, Expression, InsertStatement,
    LogicalOperator, OrderClause, OrderDirection, SelectField, SelectStatement, SelectionFields,
    SqlParser, Statement,
};
use std::collections::BTreeMap;

const NOW: i64 = 1_700_000_000_000;

fn parse(input: &str) -> Statement {
    SqlParser::parse_at("registry", input, NOW)
        .unwrap_or_else(|e| panic!("failed to parse {input:?}: {e}"))
}

#[test]
fn select_star_with_limit() {
    let statement = parse("SELECT * FROM people LIMIT 1");
    assert_eq!(
        statement,
        Statement::Select(SelectStatement {
            namespace: "registry".to_string(),
            metric: "people".to_string(),
            fields: SelectionFields::All,
            condition: None,
            group_by: None,
            order_by: None,
            limit: Some(1),
        })
    );
}

#[test]
fn select_with_relative_time_range() {
    let statement = parse("SELECT value FROM x WHERE ts IN (NOW-1h, NOW)");
    let Statement::Select(select) = statement else {
        panic!("expected a select");
    };
    assert_eq!(
        select.condition,
        Some(Expression::Range {
            dimension: "ts".to_string(),
            from: NOW - 3_600_000,
            to: NOW,
        })
    );
}

#[test]
fn relative_deltas_convert_to_milliseconds() {
    for (input, expected) in [
        ("SELECT * FROM m WHERE a > NOW+1h", NOW + 3_600_000),
        ("SELECT * FROM m WHERE a > NOW-2m", NOW - 120_000),
        ("SELECT * FROM m WHERE a > NOW+30s", NOW + 30_000),
    ] {
        let Statement::Select(select) = parse(input) else {
            panic!("expected a select");
        };
        assert_eq!(
            select.condition,
            Some(Expression::Comparison {
                dimension: "a".to_string(),
                operator: ComparisonOperator::Greater,
                value: expected,
            }),
            "input: {input}"
        );
    }
}

#[test]
fn statements_accept_a_trailing_semicolon() {
    parse("DROP people;");
    parse("SELECT * FROM people;");
}

// ── Pretty-print round-trip ─────────────────────────────────────────────

/// Deterministic xorshift generator, so failures reproduce.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.next() % bound
    }

    fn coin(&mut self) -> bool {
        self.next() % 2 == 0
    }
}

const METRICS: &[&str] = &["people", "cpu", "speed", "requests"];
const DIMENSIONS: &[&str] = &["city", "age", "host", "region", "timestamp", "value"];
const STRINGS: &[&str] = &["rome", "paris", "server-1", "eu_west"];

fn gen_ident(rng: &mut Rng, pool: &[&str]) -> String {
    pool[rng.below(pool.len() as u64) as usize].to_string()
}

fn gen_literal(rng: &mut Rng) -> NsdbValue {
    match rng.below(3) {
        0 => NsdbValue::Long(rng.below(1_000_000) as i64),
        // Quarters are exact in binary, so the rendering re-parses bit-equal.
        1 => NsdbValue::Double(rng.below(4_000) as f64 / 4.0),
        _ => NsdbValue::Str(gen_ident(rng, STRINGS)),
    }
}

fn gen_term(rng: &mut Rng) -> Expression {
    match rng.below(3) {
        0 => Expression::Range {
            dimension: gen_ident(rng, DIMENSIONS),
            from: rng.below(1_000_000) as i64,
            to: rng.below(1_000_000) as i64,
        },
        1 => Expression::Comparison {
            dimension: gen_ident(rng, DIMENSIONS),
            operator: match rng.below(4) {
                0 => ComparisonOperator::Greater,
                1 => ComparisonOperator::GreaterOrEqual,
                2 => ComparisonOperator::Less,
                _ => ComparisonOperator::LessOrEqual,
            },
            value: rng.below(1_000_000) as i64,
        },
        _ => Expression::Equality {
            dimension: gen_ident(rng, DIMENSIONS),
            value: gen_literal(rng),
        },
    }
}

fn gen_logical_op(rng: &mut Rng) -> LogicalOperator {
    if rng.coin() {
        LogicalOperator::And
    } else {
        LogicalOperator::Or
    }
}

/// Generate only parser-reachable trees: AND/OR spines fold left over term
/// expressions, and NOT appears only where it binds the whole remaining
/// expression (top level, or as the rightmost operand).
fn gen_expr(rng: &mut Rng, depth: u64) -> Expression {
    if depth == 0 || rng.below(3) == 0 {
        return gen_term(rng);
    }
    if rng.below(4) == 0 {
        return Expression::not(gen_expr(rng, depth - 1));
    }
    let mut expr = gen_term(rng);
    for _ in 0..=rng.below(2) {
        expr = Expression::tupled(expr, gen_logical_op(rng), gen_term(rng));
    }
    if rng.below(3) == 0 {
        expr = Expression::tupled(expr, gen_logical_op(rng), Expression::not(gen_expr(rng, depth - 1)));
    }
    expr
}

fn gen_fields(rng: &mut Rng) -> SelectionFields {
    if rng.coin() {
        return SelectionFields::All;
    }
    let mut fields = Vec::new();
    if rng.coin() {
        let aggregation = match rng.below(4) {
            0 => Aggregation::Sum,
            1 => Aggregation::Min,
            2 => Aggregation::Max,
            _ => Aggregation::Count,
        };
        fields.push(SelectField::aggregated("value", aggregation));
    }
    for _ in 0..rng.below(3) {
        fields.push(SelectField::plain(gen_ident(rng, DIMENSIONS)));
    }
    if fields.is_empty() {
        fields.push(SelectField::plain(gen_ident(rng, DIMENSIONS)));
    }
    SelectionFields::List(fields)
}

fn gen_statement(rng: &mut Rng) -> Statement {
    let metric = gen_ident(rng, METRICS);
    match rng.below(4) {
        0 => Statement::Select(SelectStatement {
            namespace: "registry".to_string(),
            metric,
            fields: gen_fields(rng),
            condition: rng.coin().then(|| gen_expr(rng, 3)),
            group_by: rng.coin().then(|| gen_ident(rng, DIMENSIONS)),
            order_by: rng.coin().then(|| OrderClause {
                dimension: gen_ident(rng, DIMENSIONS),
                direction: if rng.coin() {
                    OrderDirection::Asc
                } else {
                    OrderDirection::Desc
                },
            }),
            limit: rng.coin().then(|| rng.below(100) + 1),
        }),
        1 => {
            let mut dimensions = BTreeMap::new();
            for _ in 0..rng.below(4) {
                dimensions.insert(gen_ident(rng, DIMENSIONS), gen_literal(rng));
            }
            Statement::Insert(InsertStatement {
                namespace: "registry".to_string(),
                metric,
                timestamp: rng.coin().then(|| rng.below(1_000_000_000) as i64),
                dimensions,
                value: if rng.coin() {
                    NsdbValue::Long(rng.below(1_000) as i64)
                } else {
                    NsdbValue::Double(rng.below(4_000) as f64 / 4.0)
                },
            })
        }
        2 => Statement::Delete(DeleteStatement {
            namespace: "registry".to_string(),
            metric,
            condition: gen_expr(rng, 3),
        }),
        _ => Statement::Drop(DropStatement {
            namespace: "registry".to_string(),
            metric,
        }),
    }
}

#[test]
fn pretty_printed_statements_parse_back_to_the_same_ast() {
    let mut rng = Rng(0x5eed_cafe_f00d_0001);

    for case in 0..500 {
        let statement = gen_statement(&mut rng);
        let rendered = statement.to_string();
        let reparsed = SqlParser::parse_at("registry", &rendered, NOW)
            .unwrap_or_else(|e| panic!("case {case}: failed to parse {rendered:?}: {e}"));
        assert_eq!(
            reparsed, statement,
            "case {case}: round-trip mismatch for {rendered:?}"
        );
    }
}
