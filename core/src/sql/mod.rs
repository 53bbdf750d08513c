//! Immutable SQL fragment model.
//!
//! A flat,
//! `SmallVec`-backed chain of chunks that every mutating method returns as a
//! *new* value rather than mutating in place. The
//! [`SqlChunk::Segment`] variant holds a whole nested fragment embedded as a
//! single locatable node, used for `ORDER BY` / `LIMIT` / `OFFSET` / `WITH`
//! clauses so they can be found, extracted, and removed as a unit.

mod chunk;
mod token;

pub use chunk::{Param, SqlChunk};
pub use token::Token;

use regex::Regex;
use smallvec::SmallVec;

use crate::dialect::DialectDriver;
use crate::error::{CompileError, Result};
use crate::value::Value;

/// An immutable SQL fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sql {
    chunks: SmallVec<[SqlChunk; 8]>,
}

impl Sql {
    // ==================== constructors ====================

    pub fn empty() -> Self {
        Sql {
            chunks: SmallVec::new(),
        }
    }

    pub fn token(t: Token) -> Self {
        Sql {
            chunks: smallvec::smallvec![SqlChunk::Token(t)],
        }
    }

    pub fn ident(name: impl Into<compact_str::CompactString>) -> Self {
        Sql {
            chunks: smallvec::smallvec![SqlChunk::ident(name)],
        }
    }

    pub fn raw(text: impl Into<compact_str::CompactString>) -> Self {
        Sql {
            chunks: smallvec::smallvec![SqlChunk::raw(text)],
        }
    }

    pub fn param(value: impl Into<Value>) -> Self {
        Sql {
            chunks: smallvec::smallvec![SqlChunk::param(value)],
        }
    }

    /// A qualified column reference: `"alias"."column"`.
    pub fn qualified(alias: &str, column: &str) -> Self {
        Sql::raw(format!("\"{alias}\".\"{column}\""))
    }

    /// Wraps `segment` as a single, locatable node (see module docs).
    fn segment(segment: Sql) -> SqlChunk {
        SqlChunk::Segment(Box::new(segment))
    }

    // ==================== builder methods ====================

    /// Flat concatenation — chunks of `other` are spliced into `self`.
    /// Use [`Sql::append_as_segment`] when the
    /// appended fragment should remain individually locatable/removable.
    pub fn append(mut self, other: impl Into<Sql>) -> Self {
        let other = other.into();
        self.chunks.extend(other.chunks);
        self
    }

    /// Appends `other` as a single node, preserved through `reduce`/`prepare`
    /// flattening until explicitly removed via [`Sql::remove_matching`] or one
    /// of the `remove_*` helpers.
    pub fn append_as_segment(mut self, other: Sql) -> Self {
        if !other.is_empty() {
            self.chunks.push(Self::segment(other));
        }
        self
    }

    pub fn push(mut self, chunk: impl Into<SqlChunk>) -> Self {
        self.chunks.push(chunk.into());
        self
    }

    pub fn parens(self) -> Self {
        Sql::token(Token::LParen).append(self).push(Token::RParen)
    }

    /// Joins fragments with `separator` between them (teacher's `SQL::join`).
    pub fn join(parts: impl IntoIterator<Item = Sql>, separator: Token) -> Sql {
        let mut iter = parts.into_iter();
        let Some(first) = iter.next() else {
            return Sql::empty();
        };
        let mut result = first;
        for part in iter {
            result = result.push(separator).append(part);
        }
        result
    }

    // ==================== introspection ====================

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn last(&self) -> Option<&SqlChunk> {
        self.chunks.last()
    }

    pub fn remove_last(mut self) -> Self {
        self.chunks.pop();
        self
    }

    /// Case-sensitive or case-insensitive suffix check against the
    /// flattened, rendered text (no placeholders substituted).
    pub fn ends_with(&self, s: &str, case_insensitive: bool) -> bool {
        let rendered = self.render_text_only();
        if case_insensitive {
            rendered.to_ascii_uppercase().ends_with(&s.to_ascii_uppercase())
        } else {
            rendered.ends_with(s)
        }
    }

    pub fn contains(&self, s: &str) -> bool {
        self.render_text_only().contains(s)
    }

    /// Drops empty nodes (empty `Raw`/`Ident` text and empty `Segment`s)
    /// while preserving order. Idempotent: `reduce(reduce(s)) == reduce(s)`.
    pub fn reduce(self) -> Self {
        let chunks = self
            .chunks
            .into_iter()
            .filter(|c| match c {
                SqlChunk::Raw(s) | SqlChunk::Ident(s) => !s.is_empty(),
                SqlChunk::Segment(s) => !s.is_empty(),
                SqlChunk::Token(_) | SqlChunk::Param(_) => true,
            })
            .collect();
        Sql { chunks }
    }

    /// Excises the first node (a `Raw` chunk or a `Segment`) whose rendered
    /// text matches `re`, returning the reduced fragment and the removed
    /// node (if any).
    pub fn remove_matching(self, re: &Regex) -> (Sql, Option<Sql>) {
        let mut chunks = self.chunks;
        let mut removed = None;
        if let Some(idx) = chunks.iter().position(|c| match c {
            SqlChunk::Raw(s) => re.is_match(s),
            SqlChunk::Segment(s) => re.is_match(&s.render_text_only()),
            SqlChunk::Token(_) | SqlChunk::Ident(_) | SqlChunk::Param(_) => false,
        }) {
            removed = Some(match chunks.remove(idx) {
                SqlChunk::Segment(s) => *s,
                SqlChunk::Raw(s) => Sql::raw(s),
                _ => unreachable!("position() only matched Raw/Segment"),
            });
        }
        (Sql { chunks }, removed)
    }

    /// Collapses any nested `Segment` nodes into flat chunks, strips SQL
    /// line/block comments, and folds carriage returns to spaces (spec
    /// §4.2's `Prepare`). Asserts placeholder/argument arity.
    pub fn prepare(self) -> Result<Sql> {
        fn flatten_into(sql: Sql, out: &mut SmallVec<[SqlChunk; 8]>) {
            for chunk in sql.chunks {
                match chunk {
                    SqlChunk::Segment(inner) => flatten_into(*inner, out),
                    SqlChunk::Raw(text) => {
                        let cleaned = strip_comments_and_fold(&text);
                        out.push(SqlChunk::Raw(cleaned.into()));
                    }
                    other => out.push(other),
                }
            }
        }

        let mut chunks = SmallVec::new();
        flatten_into(self, &mut chunks);
        let prepared = Sql { chunks };

        let placeholders: usize = prepared
            .chunks
            .iter()
            .map(|c| match c {
                SqlChunk::Param(_) => 1,
                SqlChunk::Raw(text) => text.matches('?').count(),
                _ => 0,
            })
            .sum();
        let args = prepared.params().count();
        if placeholders != args {
            return Err(CompileError::ArityError {
                placeholders,
                args,
            });
        }
        Ok(prepared)
    }

    pub fn params(&self) -> impl Iterator<Item = &Value> {
        self.chunks.iter().flat_map(|c| match c {
            SqlChunk::Param(p) => Box::new(core::iter::once(&p.value)) as Box<dyn Iterator<Item = &Value>>,
            SqlChunk::Segment(s) => Box::new(s.params()),
            _ => Box::new(core::iter::empty()),
        })
    }

    /// Tracing-only literal rendering — substitutes `?` with quoted argument
    /// values. Never used for statements that are actually executed.
    pub fn to_literal(&self) -> String {
        let mut buf = String::new();
        for (i, chunk) in self.chunks.iter().enumerate() {
            match chunk {
                SqlChunk::Param(p) => buf.push_str(&p.value.to_literal()),
                SqlChunk::Segment(s) => buf.push_str(&s.to_literal()),
                other => other.write(&mut buf, || String::new()),
            }
            if self.needs_space(i) {
                buf.push(' ');
            }
        }
        buf
    }

    /// Renders dialect-appropriate SQL text and collects bound parameters in
    /// placeholder order.
    pub fn sql(&self, dialect: &dyn DialectDriver) -> (String, Vec<Value>) {
        let mut buf = String::new();
        let mut index = 1usize;
        self.write_to(&mut buf, dialect, &mut index);
        (buf, self.params().cloned().collect())
    }

    fn write_to(&self, buf: &mut String, dialect: &dyn DialectDriver, index: &mut usize) {
        for (i, chunk) in self.chunks.iter().enumerate() {
            match chunk {
                SqlChunk::Param(_) => {
                    buf.push_str(&dialect.render_placeholder(*index));
                    *index += 1;
                }
                SqlChunk::Segment(s) => s.write_to(buf, dialect, index),
                other => other.write(buf, || String::new()),
            }
            if self.needs_space(i) {
                buf.push(' ');
            }
        }
    }

    fn render_text_only(&self) -> String {
        let mut buf = String::new();
        for (i, chunk) in self.chunks.iter().enumerate() {
            match chunk {
                SqlChunk::Param(_) => buf.push('?'),
                SqlChunk::Segment(s) => buf.push_str(&s.render_text_only()),
                other => other.write(&mut buf, || String::new()),
            }
            if self.needs_space(i) {
                buf.push(' ');
            }
        }
        buf
    }

    fn needs_space(&self, index: usize) -> bool {
        let Some(next) = self.chunks.get(index + 1) else {
            return false;
        };
        chunk_needs_space(&self.chunks[index], next)
    }
}

fn strip_comments_and_fold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => out.push(' '),
            '-' if chars.peek() == Some(&'-') => {
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        break;
                    }
                }
            }
            c => out.push(c),
        }
    }
    out
}

fn chunk_needs_space(current: &SqlChunk, next: &SqlChunk) -> bool {
    if let SqlChunk::Raw(text) = current {
        if text.ends_with(' ') {
            return false;
        }
    }
    if let SqlChunk::Raw(text) = next {
        if text.starts_with(' ') {
            return false;
        }
    }

    match (current, next) {
        (_, SqlChunk::Token(Token::RParen | Token::Comma | Token::Semi | Token::Dot)) => false,
        (SqlChunk::Token(Token::LParen | Token::Dot), _) => false,
        (SqlChunk::Token(Token::Comma), _) => true,
        (SqlChunk::Token(Token::RParen), next) => next.is_word_like(),
        (current, SqlChunk::Token(Token::LParen)) => current.is_word_like(),
        (SqlChunk::Token(t), _) if t.is_operator() => true,
        (_, SqlChunk::Token(t)) if t.is_operator() => true,
        _ => current.is_word_like() && next.is_word_like(),
    }
}

impl From<Token> for Sql {
    fn from(value: Token) -> Self {
        Sql::token(value)
    }
}
