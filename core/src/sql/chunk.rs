//! A single node of a [`super::Sql`] fragment chain.
//!
//! An owned, runtime-schema-driven enum: table/column references are
//! rendered as plain qualified identifiers resolved by the compiler up
//! front, since this crate's catalog is data (`schema::TableDescriptor`)
//! rather than a `&'static dyn Trait` the compiler could embed directly in
//! a chunk.

use compact_str::CompactString;

use super::Token;
use crate::value::Value;

/// A bound parameter: a value paired with its rendered placeholder position.
/// There is no named-placeholder variant —
/// every parameter this compiler emits is positional, since the fragment
/// contract only requires `?`-counting, never named binds.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub value: Value,
}

/// A single chunk of a SQL fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlChunk {
    /// A keyword/operator/punctuation token.
    Token(Token),
    /// A quoted identifier (table name, column name, alias).
    Ident(CompactString),
    /// Unquoted raw SQL text — function names, already-qualified column
    /// references (`alias.column`), sub-expressions.
    Raw(CompactString),
    /// A bound parameter.
    Param(Param),
    /// A whole nested fragment, kept as a single locatable/removable node.
    /// See the module docs on [`super::Sql`] for why this exists.
    Segment(Box<super::Sql>),
}

impl SqlChunk {
    pub fn ident(name: impl Into<CompactString>) -> Self {
        SqlChunk::Ident(name.into())
    }

    pub fn raw(text: impl Into<CompactString>) -> Self {
        SqlChunk::Raw(text.into())
    }

    pub fn param(value: impl Into<Value>) -> Self {
        SqlChunk::Param(Param {
            value: value.into(),
        })
    }

    pub(crate) fn write(&self, buf: &mut String, placeholder: impl FnOnce() -> String) {
        match self {
            SqlChunk::Token(t) => buf.push_str(t.as_str()),
            SqlChunk::Ident(name) => {
                buf.push('"');
                buf.push_str(name);
                buf.push('"');
            }
            SqlChunk::Raw(text) => buf.push_str(text),
            SqlChunk::Param(_) => buf.push_str(&placeholder()),
            SqlChunk::Segment(s) => buf.push_str(&s.render_text_only()),
        }
    }

    pub(crate) fn is_word_like(&self) -> bool {
        match self {
            SqlChunk::Token(t) => t.is_word_like(),
            SqlChunk::Ident(_) | SqlChunk::Raw(_) | SqlChunk::Param(_) => true,
            SqlChunk::Segment(_) => true,
        }
    }
}

impl From<Token> for SqlChunk {
    fn from(value: Token) -> Self {
        SqlChunk::Token(value)
    }
}
