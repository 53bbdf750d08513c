//! Composite-row materializer: parses a single result row into
//! `k ∈ 1..=4` typed objects via per-type column sets obtained from the
//! catalog.
//!
//! Unlike tuple composition that reads tuple members at increasing
//! *offsets* into a single row, this materializer is keyed by column
//! *name*: every tuple member reads
//! its own named columns out of the same row independently, so there is no
//! offset bookkeeping to thread through the macro.

use core::fmt;
use std::sync::Arc;

use crate::error::{CompileError, Result};
use crate::schema::{Catalog, Model, TableDescriptor};
use crate::value::Value;

/// A single result row: an order-preserving mapping from column name to
/// value, specialized here to the
/// strongly-typed case — BI-style arbitrary-column rows are out of scope.
pub trait Row {
    fn get(&self, column: &str) -> Option<&Value>;
}

impl fmt::Debug for dyn Row + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn Row")
    }
}

/// A type that can be constructed from a result row by reading its
/// declared columns. Implementors are constructed via [`Default`]
/// and apply column values through [`Materialize::set_field`]
/// rather than a dynamic factory.
pub trait Materialize: Model + Default + Sized + 'static {
    /// Applies `value`, read from the column declaring `property`, to
    /// `self`. Implementations typically match on `property` and assign
    /// the corresponding field.
    fn set_field(&mut self, property: &str, value: Value) -> Result<()>;

    /// Builds `Self` from `row` by iterating `TableOf(Self).columns`,
    /// reading `row[col.name]`, and assigning via `set_field`.
    fn materialize(row: &dyn Row, catalog: &Catalog) -> Result<Self> {
        let table: Arc<TableDescriptor> = catalog.table_of::<Self>()?;
        let mut obj = Self::default();
        for col in &table.columns {
            let value = row.get(&col.name).ok_or_else(|| CompileError::MissingField {
                table: table.table_name.clone(),
                column: col.name.clone(),
            })?;
            obj.set_field(&col.property, value.clone())?;
        }
        Ok(obj)
    }
}

/// A type readable from a row, either directly ([`Materialize`]) or as a
/// tuple of such types.
pub trait FromRow: Sized {
    fn from_row(row: &dyn Row, catalog: &Catalog) -> Result<Self>;
}

impl<T: Materialize> FromRow for T {
    fn from_row(row: &dyn Row, catalog: &Catalog) -> Result<Self> {
        T::materialize(row, catalog)
    }
}

macro_rules! impl_from_row_tuple {
    ($($T:ident),+) => {
        impl<$($T: FromRow),+> FromRow for ($($T,)+) {
            fn from_row(row: &dyn Row, catalog: &Catalog) -> Result<Self> {
                Ok(($($T::from_row(row, catalog)?,)+))
            }
        }
    };
}

impl_from_row_tuple!(T1);
impl_from_row_tuple!(T1, T2);
impl_from_row_tuple!(T1, T2, T3);
impl_from_row_tuple!(T1, T2, T3, T4);

/// A parsed row of `k ∈ 1..=4` typed objects, exposed through
/// positional accessors `object1()`…`object4()`.
#[derive(Debug, Clone)]
pub struct Composite<T>(T);

impl<T: FromRow> Composite<T> {
    pub fn read(row: &dyn Row, catalog: &Catalog) -> Result<Self> {
        Ok(Composite(T::from_row(row, catalog)?))
    }
}

impl<T1> Composite<(T1,)> {
    pub fn object1(&self) -> &T1 {
        &self.0.0
    }
}

impl<T1, T2> Composite<(T1, T2)> {
    pub fn object1(&self) -> &T1 {
        &self.0.0
    }
    pub fn object2(&self) -> &T2 {
        &self.0.1
    }
}

impl<T1, T2, T3> Composite<(T1, T2, T3)> {
    pub fn object1(&self) -> &T1 {
        &self.0.0
    }
    pub fn object2(&self) -> &T2 {
        &self.0.1
    }
    pub fn object3(&self) -> &T3 {
        &self.0.2
    }
}

impl<T1, T2, T3, T4> Composite<(T1, T2, T3, T4)> {
    pub fn object1(&self) -> &T1 {
        &self.0.0
    }
    pub fn object2(&self) -> &T2 {
        &self.0.1
    }
    pub fn object3(&self) -> &T3 {
        &self.0.2
    }
    pub fn object4(&self) -> &T4 {
        &self.0.3
    }
}
