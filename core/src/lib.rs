//! Relforge Core - query-predicate-to-SQL compiler
//!
//! Takes an ordered `(path, value)` predicate list against a declared
//! [`schema::Model`] and lowers it to a dialect-portable [`sql::Sql`]
//! statement: hierarchy joins, collection/reference navigation as
//! `EXISTS`/`NOT EXISTS` sub-queries, operator-prefixed value decoding,
//! polymorphic casts, and a first-refusal rewrite-hook extension point.
//!
//! ```toml
//! relforge-core = "0.1"
//! ```

pub mod builder;
pub mod compiler;
pub mod dialect;
pub mod error;
pub mod hooks;
pub mod materialize;
pub mod path;
pub mod predicate;
pub mod schema;
pub mod sql;
pub mod value;

// Re-export the surface most callers need without reaching into submodules.
pub use builder::{Direction, StatementBuilder};
pub use compiler::{QueryCompiler, QueryRequest};
pub use dialect::{DialectDriver, DialectFeatures, FirebirdDialect, PostgresDialect, SqliteDialect};
pub use error::{CompileError, Result};
pub use hooks::{HookContext, HookOutcome, HookRegistry, RewriteHook};
pub use materialize::{Composite, FromRow, Materialize, Row};
pub use path::PredicatePath;
pub use predicate::{PathExpr, Predicate, QueryValue};
pub use schema::{
    AssociativeLink, Catalog, ColumnDescriptor, ColumnFlags, ColumnSpec, ForeignKey, JoinFilter,
    Model, NavigationKind, NavigationSpec, TableDescriptor,
};
pub use sql::{Sql, SqlChunk, Token};
pub use value::{PropertyType, Value};
