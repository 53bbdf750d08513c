//! SQL builder: the mutable fluent wrapper around a [`Sql`]
//! fragment chain. Where [`Sql`] itself only knows how to splice and flatten
//! chunks, `StatementBuilder` knows SQL statement *shape* — `SELECT … FROM
//! …`, at most one `WHERE`, at most one `ORDER BY`, a dialect-checked
//! `LIMIT`/`OFFSET` pair — and tracks each clause in its own field so it can
//! be located and removed without a text scan.
//!
//! Clauses are plain fields rather than a typestate-parameterized struct:
//! the join graph and predicate set are only known at the call site, so
//! there's no compile-time clause state worth encoding (see `compiler/mod.rs`'s
//! module docs for the same tradeoff). Calling `order_by`/`limit`/`offset`
//! more than once is well-defined instead of a typestate error: `order_by`
//! appends a comma-separated term, `limit`/`offset` overwrite.

use compact_str::CompactString;

use crate::dialect::{DialectDriver, DialectFeatures};
use crate::error::{CompileError, Result};
use crate::schema::{ColumnDescriptor, TableDescriptor};
use crate::sql::{Sql, Token};

/// Sort direction for [`StatementBuilder::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn token(self) -> Token {
        match self {
            Direction::Asc => Token::Asc,
            Direction::Desc => Token::Desc,
        }
    }
}

/// The mutable SQL builder. Every method
/// takes `self` by value and returns a new `StatementBuilder`, mirroring the
/// immutability of the [`Sql`] chain it wraps — "mutable" here describes the
/// ergonomics (fluent chaining without explicit threading), not interior
/// mutability.
#[derive(Debug, Clone)]
pub struct StatementBuilder<'d> {
    dialect: &'d dyn DialectDriver,
    select: Sql,
    from: Sql,
    where_clause: Sql,
    order_by: Option<Sql>,
    limit: Option<u64>,
    offset: Option<u64>,
    /// The alias of the statement this builder currently describes, if any
    /// — consulted by [`Self::wrap_as_subquery`] to derive the next `SAn`.
    current_alias: Option<CompactString>,
}

impl<'d> StatementBuilder<'d> {
    /// `SELECT * FROM table AS alias`, one
    /// `FROM`/`JOIN` term per table, in order. At least one table is
    /// required; joins between them are added separately via
    /// [`Self::inner_join`].
    pub fn select_from(dialect: &'d dyn DialectDriver, tables: &[(&TableDescriptor, &str)]) -> Self {
        let select = Sql::token(Token::Select).push(Token::Star);
        Self::from_tables(dialect, select, tables)
    }

    /// Explicit column list, used by
    /// callers who need to avoid duplicate-column failures in dialects that
    /// forbid them in sub-selects.
    pub fn select_from_columns(
        dialect: &'d dyn DialectDriver,
        tables: &[(&TableDescriptor, &str)],
        columns: &[(&str, &ColumnDescriptor)],
    ) -> Self {
        let parts: Vec<Sql> = columns
            .iter()
            .map(|(alias, col)| Sql::qualified(alias, &col.name))
            .collect();
        let select = Sql::token(Token::Select).append(Sql::join(parts, Token::Comma));
        Self::from_tables(dialect, select, tables)
    }

    fn from_tables(dialect: &'d dyn DialectDriver, select: Sql, tables: &[(&TableDescriptor, &str)]) -> Self {
        let mut from = Sql::empty();
        for (i, (table, alias)) in tables.iter().enumerate() {
            let term = Sql::ident(table.table_name.clone()).push(Token::As).append(Sql::ident(*alias));
            from = if i == 0 {
                Sql::token(Token::From).append(term)
            } else {
                from.push(Token::Comma).append(term)
            };
        }
        StatementBuilder {
            dialect,
            select,
            from,
            where_clause: Sql::empty(),
            order_by: None,
            limit: None,
            offset: None,
            current_alias: tables.first().map(|(_, alias)| CompactString::from(*alias)),
        }
    }

    /// `INNER
    /// JOIN right AS rightAlias ON (leftAlias.leftCol = rightAlias.rightCol)`.
    pub fn inner_join(
        mut self,
        left_alias: &str,
        left_column: &ColumnDescriptor,
        right_table: &TableDescriptor,
        right_alias: &str,
        right_column: &ColumnDescriptor,
    ) -> Self {
        let on = Sql::raw(format!("{left_alias}.{}", left_column.name))
            .push(Token::Eq)
            .append(Sql::raw(format!("{right_alias}.{}", right_column.name)));
        self.from = self
            .from
            .push(Token::Inner)
            .push(Token::Join)
            .append(Sql::ident(right_table.table_name.clone()))
            .push(Token::As)
            .append(Sql::ident(right_alias))
            .push(Token::On)
            .append(on.parens());
        self
    }

    /// Smart prefix selection — if the WHERE
    /// fragment is still empty, this introduces it bare; otherwise it reads
    /// as [`Self::and`].
    pub fn where_clause(self, clause: Sql) -> Self {
        if self.where_clause.is_empty() {
            self.set_where(clause)
        } else {
            self.and(clause)
        }
    }

    /// Builds the clause from the
    /// statement-so-far, for callers whose predicate depends on what's
    /// already been assembled (e.g. referencing `self`'s current alias).
    pub fn where_with(self, build: impl FnOnce(&Self) -> Sql) -> Self {
        let clause = build(&self);
        self.where_clause(clause)
    }

    /// Suppresses the `AND` token if the WHERE
    /// fragment is empty or already ends in `WHERE`/`AND`/`OR`.
    pub fn and(mut self, clause: Sql) -> Self {
        self.where_clause = if self.needs_bare_conjunction() {
            self.set_where_inner(clause)
        } else {
            self.where_clause.push(Token::And).append(clause)
        };
        self
    }

    /// Same prefix suppression as [`Self::and`], with
    /// `OR` as the joining token.
    pub fn or(mut self, clause: Sql) -> Self {
        self.where_clause = if self.needs_bare_conjunction() {
            self.set_where_inner(clause)
        } else {
            self.where_clause.push(Token::Or).append(clause)
        };
        self
    }

    fn needs_bare_conjunction(&self) -> bool {
        self.where_clause.is_empty() || self.where_clause.ends_with("AND", false) || self.where_clause.ends_with("OR", false)
    }

    fn set_where(mut self, clause: Sql) -> Self {
        self.where_clause = self.set_where_inner(clause);
        self
    }

    fn set_where_inner(&self, clause: Sql) -> Sql {
        if self.where_clause.is_empty() {
            clause
        } else {
            self.where_clause.clone().append(clause)
        }
    }

    /// Prepends `ORDER BY` on first
    /// use, appends a comma-separated term on subsequent calls.
    pub fn order_by(mut self, alias: &str, column: &ColumnDescriptor, dir: Direction) -> Self {
        let term = Sql::qualified(alias, &column.name).push(dir.token());
        self.order_by = Some(match self.order_by {
            None => term,
            Some(existing) => existing.push(Token::Comma).append(term),
        });
        self
    }

    /// Dialect-aware — requires `LimitOffset` or
    /// `FetchOffset`, else `DialectUnsupported`. The actual `LIMIT`/`FETCH
    /// FIRST` syntax is chosen at [`Self::build`] time once both `limit`
    /// and `offset` are known (Firebird's `FETCH FIRST n ROWS ONLY OFFSET m
    /// ROW` interleaves the two).
    pub fn limit(mut self, n: u64) -> Result<Self> {
        self.require_limit_feature()?;
        self.limit = Some(n);
        Ok(self)
    }

    /// Same dialect gate as [`Self::limit`].
    pub fn offset(mut self, n: u64) -> Result<Self> {
        self.require_limit_feature()?;
        self.offset = Some(n);
        Ok(self)
    }

    fn require_limit_feature(&self) -> Result<()> {
        let features = self.dialect.features();
        if features.contains(DialectFeatures::LIMIT_OFFSET) || features.contains(DialectFeatures::FETCH_OFFSET) {
            Ok(())
        } else {
            Err(CompileError::DialectUnsupported {
                dialect: self.dialect.invariant_name().into(),
                feature: "LIMIT/OFFSET",
            })
        }
    }

    /// Extracts and returns the removed limit.
    pub fn remove_limit(mut self) -> (Self, Option<u64>) {
        let removed = self.limit.take();
        (self, removed)
    }

    /// Extracts and returns the removed offset.
    pub fn remove_offset(mut self) -> (Self, Option<u64>) {
        let removed = self.offset.take();
        (self, removed)
    }

    /// Extracts and returns the removed
    /// `ORDER BY` fragment (without the `ORDER BY` keyword itself).
    pub fn remove_order_by(mut self) -> (Self, Option<Sql>) {
        let removed = self.order_by.take();
        (self, removed)
    }

    /// Wraps the statement built so
    /// far as `SELECT cols FROM (…) AS SAn`, where `n` increases from the
    /// current alias if it already matches `SAN` (or starts at `SA0`
    /// otherwise). Deliberately independent of the compiler's `sqN` sibling
    /// sequence so nested
    /// builder wrapping never collides with predicate-compiler aliases.
    pub fn wrap_as_subquery(self, columns: &[&str]) -> Self {
        let next = next_sa_alias(self.current_alias.as_deref());
        let inner = self.build();
        let select = if columns.is_empty() {
            Sql::token(Token::Select).push(Token::Star)
        } else {
            let parts: Vec<Sql> = columns.iter().map(|c| Sql::qualified(&next, c)).collect();
            Sql::token(Token::Select).append(Sql::join(parts, Token::Comma))
        };
        let from = Sql::token(Token::From)
            .append(inner.parens())
            .push(Token::As)
            .append(Sql::ident(next.clone()));
        StatementBuilder {
            dialect: self.dialect,
            select,
            from,
            where_clause: Sql::empty(),
            order_by: None,
            limit: None,
            offset: None,
            current_alias: Some(next),
        }
    }

    /// Collapses the builder into a single [`Sql`] fragment:
    /// `SELECT … FROM … [WHERE …] [ORDER BY …] [LIMIT/OFFSET or FETCH …]`.
    pub fn build(self) -> Sql {
        let mut stmt = self.select.append(self.from);
        if !self.where_clause.is_empty() {
            stmt = stmt.push(Token::Where).append(self.where_clause);
        }
        if let Some(order_by) = self.order_by {
            stmt = stmt.push(Token::OrderBy).append(order_by);
        }
        stmt.append(self.render_limit_offset())
    }

    fn render_limit_offset(&self) -> Sql {
        let features = self.dialect.features();
        match (self.limit, self.offset) {
            (None, None) => Sql::empty(),
            (limit, offset) if features.contains(DialectFeatures::LIMIT_OFFSET) => {
                let mut frag = Sql::empty();
                if let Some(n) = limit {
                    frag = frag.push(Token::Limit).append(Sql::raw(n.to_string()));
                }
                if let Some(n) = offset {
                    frag = frag.push(Token::Offset).append(Sql::raw(n.to_string()));
                }
                frag
            }
            (limit, offset) if features.contains(DialectFeatures::FETCH_OFFSET) => {
                let mut frag = Sql::empty();
                if let Some(n) = offset {
                    frag = Sql::token(Token::Offset).append(Sql::raw(n.to_string())).push(Token::OffsetRow);
                }
                if let Some(n) = limit {
                    let fetch = Sql::token(Token::FetchFirst).append(Sql::raw(n.to_string())).push(Token::RowsOnly);
                    frag = if frag.is_empty() { fetch } else { frag.append(fetch) };
                }
                frag
            }
            _ => Sql::empty(),
        }
    }
}

fn next_sa_alias(current: Option<&str>) -> CompactString {
    if let Some(n) = current.and_then(|a| a.strip_prefix("SA")).and_then(|rest| rest.parse::<u32>().ok()) {
        return format!("SA{}", n + 1).into();
    }
    CompactString::new("SA0")
}
