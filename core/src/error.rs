//! Error types for the query compiler.

use compact_str::CompactString;
use thiserror::Error;

/// Errors surfaced by schema introspection, path parsing, compilation, and
/// result materialization. Nothing in this enum is retried internally —
/// every variant is fatal for the request that produced it.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A predicate path does not resolve to a known property on the model
    /// type being compiled against.
    #[error("unknown path `{path}` on model `{model}`")]
    PathError {
        model: &'static str,
        path: CompactString,
    },

    /// No column, row, or association could be found to satisfy a join
    /// (including a missing always-join route, a missing associative table,
    /// or a requested table/column that the catalog has never seen).
    #[error("schema error: {0}")]
    SchemaError(CompactString),

    /// Placeholder count and bound-argument count disagreed after
    /// [`crate::sql::Sql::prepare`]. This is a programmer error in the
    /// compiler itself and is never expected to surface from well-formed
    /// input — fail fast rather than emit malformed SQL.
    #[error("arity mismatch: {placeholders} placeholders but {args} arguments")]
    ArityError { placeholders: usize, args: usize },

    /// A predicate's string value could not be coerced to the target
    /// property's declared type.
    #[error("cannot coerce `{value}` to {target_type} for column `{column}`")]
    TypeCoercionError {
        column: CompactString,
        target_type: CompactString,
        value: CompactString,
    },

    /// The active dialect does not advertise a feature the compiler needed
    /// to emit (e.g. no `LIMIT`/`OFFSET` and no `FETCH FIRST` support).
    #[error("dialect `{dialect}` does not support `{feature}`")]
    DialectUnsupported {
        dialect: CompactString,
        feature: &'static str,
    },

    /// The composite-row materializer could not read a named column from a
    /// result row.
    #[error("missing field `{table}.{column}` in result row")]
    MissingField {
        table: CompactString,
        column: CompactString,
    },
}

pub type Result<T> = core::result::Result<T, CompileError>;
