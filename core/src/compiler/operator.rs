//! Operator-prefix grammar: decodes an operator-prefixed string
//! scalar and renders one comparison clause.

use compact_str::CompactString;

use crate::error::Result;
use crate::sql::{Sql, Token};
use crate::value::{PropertyType, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combiner {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    IsNull,
    IsNotNull,
    Contains,
    StartsWith,
}

impl Operator {
    /// How multiple values of this operator combine with siblings on the
    /// same path.
    pub fn combiner(self) -> Combiner {
        match self {
            Operator::Lt
            | Operator::Le
            | Operator::Gt
            | Operator::Ge
            | Operator::Ne
            | Operator::IsNotNull => Combiner::And,
            Operator::Eq | Operator::IsNull | Operator::Contains | Operator::StartsWith => {
                Combiner::Or
            }
        }
    }
}

/// Splits an operator-prefixed string into `(operator, remaining value)`.
/// `remaining` is empty for `IsNull`/`IsNotNull`. Longer prefixes (`<=`,
/// `>=`, `!null`) are checked before their single-character counterparts.
pub fn decode(raw: &str) -> (Operator, &str) {
    if raw == "null" {
        return (Operator::IsNull, "");
    }
    if raw == "!null" {
        return (Operator::IsNotNull, "");
    }
    if let Some(rest) = raw.strip_prefix("<=") {
        return (Operator::Le, rest);
    }
    if let Some(rest) = raw.strip_prefix(">=") {
        return (Operator::Ge, rest);
    }
    if let Some(rest) = raw.strip_prefix('<') {
        return (Operator::Lt, rest);
    }
    if let Some(rest) = raw.strip_prefix('>') {
        return (Operator::Gt, rest);
    }
    if let Some(rest) = raw.strip_prefix('!') {
        return (Operator::Ne, rest);
    }
    if let Some(rest) = raw.strip_prefix('~') {
        return (Operator::Contains, rest);
    }
    if let Some(rest) = raw.strip_prefix('^') {
        return (Operator::StartsWith, rest);
    }
    (Operator::Eq, raw)
}

/// Renders `alias.column OP ?` (or `IS [NOT] NULL`, no parameter),
/// coercing `raw` to `target_type`.
pub fn render_clause(
    alias: &str,
    column: &str,
    target_type: PropertyType,
    op: Operator,
    raw: &str,
) -> Result<Sql> {
    let lhs = Sql::raw(format!("{alias}.{column}"));
    Ok(match op {
        Operator::IsNull => lhs.push(Token::Is).push(Token::Null),
        Operator::IsNotNull => lhs.push(Token::Is).push(Token::Not).push(Token::Null),
        Operator::Eq => lhs.push(Token::Eq).append(Sql::param(Value::coerce(raw, target_type, column)?)),
        Operator::Ne => lhs.push(Token::Ne).append(Sql::param(Value::coerce(raw, target_type, column)?)),
        Operator::Lt => lhs.push(Token::Lt).append(Sql::param(Value::coerce(raw, target_type, column)?)),
        Operator::Le => lhs.push(Token::Le).append(Sql::param(Value::coerce(raw, target_type, column)?)),
        Operator::Gt => lhs.push(Token::Gt).append(Sql::param(Value::coerce(raw, target_type, column)?)),
        Operator::Ge => lhs.push(Token::Ge).append(Sql::param(Value::coerce(raw, target_type, column)?)),
        Operator::Contains => {
            let pattern = if raw.contains('%') {
                raw.to_string()
            } else {
                format!("%{raw}%")
            };
            lhs.push(Token::Like)
                .append(Sql::param(Value::Text(CompactString::from(pattern))))
        }
        Operator::StartsWith => {
            let pattern = format!("{raw}%");
            lhs.push(Token::Like)
                .append(Sql::param(Value::Text(CompactString::from(pattern))))
        }
    })
}

/// `CreateSqlPredicate(alias, columnName, targetType, values)` (spec
/// §4.5): wraps in parentheses and emits per-value clauses separated by
/// `OR`/`AND` per [`Operator::combiner`].
pub fn create_sql_predicate(
    alias: &str,
    column: &str,
    target_type: PropertyType,
    values: &[CompactString],
) -> Result<Sql> {
    let mut or_clauses = Vec::new();
    let mut and_clauses = Vec::new();
    for raw in values {
        let (op, value_str) = decode(raw);
        let clause = render_clause(alias, column, target_type, op, value_str)?;
        match op.combiner() {
            Combiner::Or => or_clauses.push(clause),
            Combiner::And => and_clauses.push(clause),
        }
    }

    let mut parts = Vec::new();
    if !or_clauses.is_empty() {
        let needs_parens = or_clauses.len() > 1 && !and_clauses.is_empty();
        let or_group = Sql::join(or_clauses, Token::Or);
        parts.push(if needs_parens { or_group.parens() } else { or_group });
    }
    parts.extend(and_clauses);

    Ok(Sql::join(parts, Token::And).parens())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_checks_longer_prefixes_first() {
        assert_eq!(decode("<=5").0, Operator::Le);
        assert_eq!(decode("<5").0, Operator::Lt);
        assert_eq!(decode(">=5").0, Operator::Ge);
        assert_eq!(decode(">5").0, Operator::Gt);
        assert_eq!(decode("!5").0, Operator::Ne);
        assert_eq!(decode("!null").0, Operator::IsNotNull);
        assert_eq!(decode("null").0, Operator::IsNull);
        assert_eq!(decode("~abc").0, Operator::Contains);
        assert_eq!(decode("^abc").0, Operator::StartsWith);
        assert_eq!(decode("abc").0, Operator::Eq);
    }

    #[test]
    fn multi_value_equality_ors_together() {
        let values: Vec<CompactString> = vec!["A".into(), "B".into()];
        let sql = create_sql_predicate("cd_tbl", "mnemonic", PropertyType::Text, &values).unwrap();
        let (text, args) = sql.sql(&crate::dialect::SqliteDialect);
        assert_eq!(text, "(cd_tbl.mnemonic = ? OR cd_tbl.mnemonic = ?)");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn range_ands_together() {
        let values: Vec<CompactString> = vec![">=5".into(), "<10".into()];
        let sql = create_sql_predicate("t", "value", PropertyType::Integer, &values).unwrap();
        let (text, _) = sql.sql(&crate::dialect::SqliteDialect);
        assert_eq!(text, "(t.value >= ? AND t.value < ?)");
    }

    #[test]
    fn null_check_has_no_parameter() {
        let values: Vec<CompactString> = vec!["null".into()];
        let sql = create_sql_predicate("t", "obsoletionTime", PropertyType::Text, &values).unwrap();
        let (text, args) = sql.sql(&crate::dialect::SqliteDialect);
        assert_eq!(text, "(t.obsoletionTime IS NULL)");
        assert!(args.is_empty());
    }
}
