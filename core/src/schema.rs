//! Schema catalog: reflective descriptors of model types, cached
//! process-wide for the life of the process.
//!
//! Rust has no runtime reflection, so a `Model` publishes its column list
//! as plain data; the catalog scans it once per type and memoizes the
//! result by `TypeId` rather than by a language-level type handle.

use core::any::{Any, TypeId};
use std::sync::{Arc, OnceLock, RwLock};

use compact_str::CompactString;
use hashbrown::HashMap;

use crate::error::{CompileError, Result};
use crate::sql::Sql;

/// Attributes a column may carry: primary-key, auto-generated, unique,
/// not-null, secret, always-join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnFlags(u8);

impl ColumnFlags {
    pub const PRIMARY_KEY: ColumnFlags = ColumnFlags(1 << 0);
    pub const AUTO_GENERATED: ColumnFlags = ColumnFlags(1 << 1);
    pub const UNIQUE: ColumnFlags = ColumnFlags(1 << 2);
    pub const NOT_NULL: ColumnFlags = ColumnFlags(1 << 3);
    pub const SECRET: ColumnFlags = ColumnFlags(1 << 4);
    pub const ALWAYS_JOIN: ColumnFlags = ColumnFlags(1 << 5);

    pub const NONE: ColumnFlags = ColumnFlags(0);

    pub const fn union(self, other: ColumnFlags) -> ColumnFlags {
        ColumnFlags(self.0 | other.0)
    }

    pub const fn contains(self, flag: ColumnFlags) -> bool {
        self.0 & flag.0 == flag.0
    }
}

impl core::ops::BitOr for ColumnFlags {
    type Output = ColumnFlags;
    fn bitor(self, rhs: ColumnFlags) -> ColumnFlags {
        self.union(rhs)
    }
}

/// A foreign-key edge: `{target-table, target-column}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub target_table: CompactString,
    pub target_column: CompactString,
}

/// A join filter attached to an always-join column: an additional equality
/// the JOIN's `ON` clause must carry, e.g. restricting a shared hierarchy
/// table to a particular discriminator value.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinFilter {
    pub property: CompactString,
    pub value: crate::value::Value,
}

/// A column, as declared by a [`Model`] impl (no owning table yet — the
/// catalog fills that in when it builds the [`TableDescriptor`]).
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: CompactString,
    pub property: CompactString,
    pub prop_type: crate::value::PropertyType,
    pub flags: ColumnFlags,
    pub foreign_key: Option<ForeignKey>,
    pub join_filters: Vec<JoinFilter>,
    pub default: Option<crate::value::Value>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<CompactString>, property: impl Into<CompactString>) -> Self {
        ColumnSpec {
            name: name.into(),
            property: property.into(),
            prop_type: crate::value::PropertyType::Text,
            flags: ColumnFlags::NONE,
            foreign_key: None,
            join_filters: Vec::new(),
            default: None,
        }
    }

    pub fn prop_type(mut self, prop_type: crate::value::PropertyType) -> Self {
        self.prop_type = prop_type;
        self
    }

    pub fn flags(mut self, flags: ColumnFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn foreign_key(mut self, target_table: impl Into<CompactString>, target_column: impl Into<CompactString>) -> Self {
        self.foreign_key = Some(ForeignKey {
            target_table: target_table.into(),
            target_column: target_column.into(),
        });
        self
    }

    pub fn join_filter(mut self, property: impl Into<CompactString>, value: impl Into<crate::value::Value>) -> Self {
        self.join_filters.push(JoinFilter {
            property: property.into(),
            value: value.into(),
        });
        self
    }

    pub fn default_value(mut self, value: impl Into<crate::value::Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// A materialized column descriptor, owned by exactly one [`TableDescriptor`].
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    pub name: CompactString,
    pub property: CompactString,
    pub table: CompactString,
    pub prop_type: crate::value::PropertyType,
    pub flags: ColumnFlags,
    pub foreign_key: Option<ForeignKey>,
    pub join_filters: Vec<JoinFilter>,
    pub default: Option<crate::value::Value>,
}

impl ColumnDescriptor {
    /// The sentinel `"1"` projection placeholder, not bound to any table.
    pub fn one() -> ColumnDescriptor {
        ColumnDescriptor {
            name: CompactString::new("1"),
            property: CompactString::new(""),
            table: CompactString::new(""),
            prop_type: crate::value::PropertyType::Integer,
            flags: ColumnFlags::NONE,
            foreign_key: None,
            join_filters: Vec::new(),
            default: None,
        }
    }

    /// The sentinel `"*"` projection placeholder, not bound to any table.
    pub fn star() -> ColumnDescriptor {
        ColumnDescriptor {
            name: CompactString::new("*"),
            property: CompactString::new(""),
            table: CompactString::new(""),
            prop_type: crate::value::PropertyType::Text,
            flags: ColumnFlags::NONE,
            foreign_key: None,
            join_filters: Vec::new(),
            default: None,
        }
    }

    fn from_spec(spec: &ColumnSpec, table: &str) -> Self {
        ColumnDescriptor {
            name: spec.name.clone(),
            property: spec.property.clone(),
            table: table.into(),
            prop_type: spec.prop_type,
            flags: spec.flags,
            foreign_key: spec.foreign_key.clone(),
            join_filters: spec.join_filters.clone(),
            default: spec.default.clone(),
        }
    }
}

/// What a navigation property (one with no backing column of its own)
/// points to.
#[derive(Debug, Clone)]
pub enum NavigationKind {
    /// A to-many navigation; `element_table` is the table of the element
    /// type, `versioned` marks whether the link carries an
    /// `obsoleteVersionSequence` column to null-check.
    Collection {
        element_table: CompactString,
        versioned: bool,
    },
    /// A to-one navigation; `target_table` is the referenced type's table.
    Reference { target_table: CompactString },
}

/// A navigation property, as declared by a [`Model`] impl: a property with
/// no backing column, resolved by following a foreign key or associative
/// table instead of a column read.
#[derive(Debug, Clone)]
pub struct NavigationSpec {
    pub property: CompactString,
    pub kind: NavigationKind,
    /// For a guarded collection, the property on the element type that a
    /// guard value is translated to an equality against. `None` for
    /// unguarded navigations.
    pub classifier_property: Option<CompactString>,
}

impl NavigationSpec {
    pub fn collection(
        property: impl Into<CompactString>,
        element_table: impl Into<CompactString>,
    ) -> Self {
        NavigationSpec {
            property: property.into(),
            kind: NavigationKind::Collection {
                element_table: element_table.into(),
                versioned: false,
            },
            classifier_property: None,
        }
    }

    pub fn reference(
        property: impl Into<CompactString>,
        target_table: impl Into<CompactString>,
    ) -> Self {
        NavigationSpec {
            property: property.into(),
            kind: NavigationKind::Reference {
                target_table: target_table.into(),
            },
            classifier_property: None,
        }
    }

    pub fn versioned(mut self) -> Self {
        if let NavigationKind::Collection { versioned, .. } = &mut self.kind {
            *versioned = true;
        }
        self
    }

    pub fn classifier(mut self, property: impl Into<CompactString>) -> Self {
        self.classifier_property = Some(property.into());
        self
    }
}

/// Links `target_table` to an associative table realizing a many-to-many
/// relationship.
#[derive(Debug, Clone)]
pub struct AssociativeLink {
    pub target_table: CompactString,
    pub association_table: CompactString,
}

/// Table descriptor: model-type identity, physical table name, ordered
/// column list, name→index map, optional associative-table links.
#[derive(Debug)]
pub struct TableDescriptor {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub table_name: CompactString,
    pub columns: Vec<ColumnDescriptor>,
    pub index: HashMap<CompactString, usize>,
    pub associative_links: Vec<AssociativeLink>,
    pub navigations: Vec<NavigationSpec>,
    /// Gates the `skip_joins` + `obsoletionTime == null` pruning rule: only
    /// versioned types ever have `obsoletionTime` pruned from a predicate
    /// set or trigger a base-table retarget.
    pub versioned: bool,
}

impl TableDescriptor {
    fn build<M: Model + 'static>() -> Result<TableDescriptor> {
        let specs = M::columns();
        let table_name = M::table_name();
        let mut columns = Vec::with_capacity(specs.len());
        let mut index = HashMap::with_capacity(specs.len());
        for spec in &specs {
            if index.contains_key(&spec.name) {
                return Err(CompileError::SchemaError(
                    format!("duplicate column `{}` on table `{table_name}`", spec.name).into(),
                ));
            }
            index.insert(spec.name.clone(), columns.len());
            columns.push(ColumnDescriptor::from_spec(spec, table_name));
        }
        Ok(TableDescriptor {
            type_id: TypeId::of::<M>(),
            type_name: M::type_name(),
            table_name: table_name.into(),
            columns,
            index,
            associative_links: M::associative_links(),
            navigations: M::navigations(),
            versioned: M::versioned(),
        })
    }

    pub fn column_by_name(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    pub fn column_by_property(&self, property: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.property == property)
    }

    pub fn navigation_by_property(&self, property: &str) -> Option<&NavigationSpec> {
        self.navigations.iter().find(|n| n.property == property)
    }

    pub fn always_join_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns
            .iter()
            .filter(|c| c.flags.contains(ColumnFlags::ALWAYS_JOIN))
    }
}

/// Declares a model type's schema. Implemented by hand or by a derive macro
/// (out of scope here); the catalog calls these methods exactly once per
/// type and memoizes the result.
pub trait Model: Any {
    fn type_name() -> &'static str
    where
        Self: Sized;

    fn table_name() -> &'static str
    where
        Self: Sized;

    fn columns() -> Vec<ColumnSpec>
    where
        Self: Sized;

    fn associative_links() -> Vec<AssociativeLink>
    where
        Self: Sized,
    {
        Vec::new()
    }

    fn navigations() -> Vec<NavigationSpec>
    where
        Self: Sized,
    {
        Vec::new()
    }

    fn versioned() -> bool
    where
        Self: Sized,
    {
        false
    }
}

/// A cached FROM-clause fragment for a `(prefix, type)` pair, plus the set
/// of tables it brings into scope.
#[derive(Debug, Clone)]
pub struct JoinCacheEntry {
    pub from: Sql,
    pub scoped_tables: Vec<CompactString>,
}

/// Controls cache behaviour. Currently empty beyond the `reset` test hook
/// on [`Catalog`] itself; kept as a separate type so new knobs don't change
/// `Catalog`'s constructor signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogOptions {
    _private: (),
}

/// The process-wide schema and join caches. Readers are lock-free once
/// populated; population is serialized per-type via the `RwLock` write path.
#[derive(Debug, Default)]
pub struct Catalog {
    by_type: RwLock<HashMap<TypeId, Arc<TableDescriptor>>>,
    by_name: RwLock<HashMap<CompactString, Arc<TableDescriptor>>>,
    join_cache: RwLock<HashMap<(CompactString, TypeId), Arc<JoinCacheEntry>>>,
    #[allow(dead_code)]
    options: CatalogOptions,
}

fn global_catalog() -> &'static Catalog {
    static CATALOG: OnceLock<Catalog> = OnceLock::new();
    CATALOG.get_or_init(Catalog::default)
}

impl Catalog {
    /// The process-wide catalog instance.
    pub fn global() -> &'static Catalog {
        global_catalog()
    }

    /// Thread-safe memoized lookup: first call inspects `M`'s declarative
    /// columns; later calls hit the cache lock-free... in spirit — a read
    /// lock is still taken, but no population work runs.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self), fields(model = M::type_name())))]
    pub fn table_of<M: Model + 'static>(&self) -> Result<Arc<TableDescriptor>> {
        let type_id = TypeId::of::<M>();
        if let Some(existing) = self.by_type.read().unwrap().get(&type_id) {
            return Ok(existing.clone());
        }

        let descriptor = Arc::new(TableDescriptor::build::<M>()?);
        #[cfg(feature = "tracing")]
        tracing::debug!(table = %descriptor.table_name, columns = descriptor.columns.len(), "relforge.catalog.populate");

        self.by_type
            .write()
            .unwrap()
            .insert(type_id, descriptor.clone());
        self.by_name
            .write()
            .unwrap()
            .insert(descriptor.table_name.clone(), descriptor.clone());
        Ok(descriptor)
    }

    /// Reverse lookup over already-materialized descriptors only (never
    /// populates).
    pub fn table_of_name(&self, name: &str) -> Option<Arc<TableDescriptor>> {
        self.by_name.read().unwrap().get(name).cloned()
    }

    /// Looks up `property` on `table`; when `scan_hierarchy` is set and the
    /// property isn't found directly, recurses through `table`'s
    /// always-join edges to the base type(s).
    pub fn column_of(
        &self,
        table: &TableDescriptor,
        property: &str,
        scan_hierarchy: bool,
    ) -> Option<ColumnDescriptor> {
        if let Some(col) = table.column_by_property(property) {
            return Some(col.clone());
        }
        if !scan_hierarchy {
            return None;
        }
        for fk in table.always_join_columns() {
            let Some(fk_edge) = &fk.foreign_key else {
                continue;
            };
            let Some(parent) = self.table_of_name(&fk_edge.target_table) else {
                continue;
            };
            if let Some(col) = self.column_of(&parent, property, true) {
                return Some(col);
            }
        }
        None
    }

    /// Returns the associative table declared to link `a` and `b`, if any.
    pub fn association_between(
        &self,
        a: &TableDescriptor,
        b: &TableDescriptor,
    ) -> Option<Arc<TableDescriptor>> {
        a.associative_links
            .iter()
            .find(|link| link.target_table == b.table_name)
            .and_then(|link| self.table_of_name(&link.association_table))
    }

    /// Returns a descriptor using `original`'s columns intersected by name
    /// with `shadow`'s, retargeted to `shadow`'s table name — used when the
    /// same model type is physically stored in more than one table.
    pub fn redirect_mapping(
        &self,
        original: &TableDescriptor,
        shadow: &TableDescriptor,
    ) -> Result<TableDescriptor> {
        let mut columns = Vec::new();
        let mut index = HashMap::new();
        for col in &original.columns {
            if shadow.column_by_name(&col.name).is_none() {
                continue;
            }
            let mut redirected = col.clone();
            redirected.table = shadow.table_name.clone();
            index.insert(redirected.name.clone(), columns.len());
            columns.push(redirected);
        }
        if columns.is_empty() {
            return Err(CompileError::SchemaError(
                format!(
                    "no shared columns between `{}` and `{}` to redirect",
                    original.table_name, shadow.table_name
                )
                .into(),
            ));
        }
        Ok(TableDescriptor {
            type_id: original.type_id,
            type_name: original.type_name,
            table_name: shadow.table_name.clone(),
            columns,
            index,
            associative_links: original.associative_links.clone(),
            navigations: original.navigations.clone(),
            versioned: original.versioned,
        })
    }

    /// Returns the cached join-cache entry for `(prefix, type)`, populating
    /// it via `populate` on first use.
    pub fn get_or_populate_join(
        &self,
        prefix: &str,
        type_id: TypeId,
        populate: impl FnOnce() -> Result<JoinCacheEntry>,
    ) -> Result<Arc<JoinCacheEntry>> {
        let key = (CompactString::from(prefix), type_id);
        if let Some(existing) = self.join_cache.read().unwrap().get(&key) {
            return Ok(existing.clone());
        }
        let entry = Arc::new(populate()?);
        #[cfg(feature = "tracing")]
        tracing::debug!(prefix, scoped = entry.scoped_tables.len(), "relforge.joincache.populate");
        self.join_cache.write().unwrap().insert(key, entry.clone());
        Ok(entry)
    }

    /// Test-only hook: drops every cached descriptor and join-cache entry.
    pub fn reset(&self) {
        self.by_type.write().unwrap().clear();
        self.by_name.write().unwrap().clear();
        self.join_cache.write().unwrap().clear();
    }
}
