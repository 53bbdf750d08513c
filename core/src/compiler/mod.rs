//! Query compiler — the hardest subsystem. Given a model type
//! `T` and an ordered `(path, value)` list, emits a single
//! `SELECT … FROM … [joins] WHERE …` [`Sql`] fragment: hierarchy joins up a
//! hit table's always-join edges, `EXISTS`/`NOT EXISTS` sub-queries for
//! collection and reference navigations, polymorphic casts, guard-to-
//! classifier translation, and rewrite-hook first refusal.
//!
//! A runtime engine rather than a compile-time typestate builder: the
//! predicate set, join graph, and sub-query nesting here are only known at
//! the call site, not at compile time, so there's no type-level state
//! machine to build — the state lives in local variables threaded through
//! recursive calls instead.

pub mod operator;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use compact_str::CompactString;
use hashbrown::HashMap as FastMap;

use crate::dialect::{DialectDriver, DialectFeatures};
use crate::error::{CompileError, Result};
use crate::hooks::{HookContext, HookRegistry};
use crate::path::PredicatePath;
use crate::predicate::QueryValue;
use crate::schema::{Catalog, ColumnDescriptor, JoinCacheEntry, Model, NavigationKind, NavigationSpec, TableDescriptor};
use crate::sql::{Sql, Token};

/// The ordered `(path, value)` pairs a caller hands the compiler, plus
/// the optional explicit projection, alias prefix, and `skip_joins` hint.
pub struct QueryRequest {
    pub pairs: Vec<(CompactString, QueryValue)>,
    pub projection: Option<Vec<ColumnDescriptor>>,
    pub alias_prefix: CompactString,
    pub skip_joins: bool,
}

impl QueryRequest {
    pub fn new(pairs: Vec<(CompactString, QueryValue)>) -> Self {
        QueryRequest {
            pairs,
            projection: None,
            alias_prefix: CompactString::new(""),
            skip_joins: false,
        }
    }

    pub fn projection(mut self, columns: Vec<ColumnDescriptor>) -> Self {
        self.projection = Some(columns);
        self
    }

    pub fn alias_prefix(mut self, prefix: impl Into<CompactString>) -> Self {
        self.alias_prefix = prefix.into();
        self
    }

    pub fn skip_joins(mut self, skip: bool) -> Self {
        self.skip_joins = skip;
        self
    }
}

/// Sub-query alias generation: `"" -> "sq0"`,
/// `"sqN" -> "sq(N+1)"`, anything else resets to `"sq0"`.
fn next_alias(prefix: &str) -> CompactString {
    if prefix.is_empty() {
        return CompactString::new("sq0");
    }
    if let Some(n) = prefix.strip_prefix("sq").and_then(|rest| rest.parse::<u32>().ok()) {
        return format!("sq{}", n + 1).into();
    }
    CompactString::new("sq0")
}

fn alias_for(prefix: &str, table_name: &str) -> CompactString {
    format!("{prefix}{table_name}").into()
}

fn group_value_from_raw(raw: &[CompactString]) -> QueryValue {
    match raw {
        [] => QueryValue::Scalar(CompactString::new("")),
        [single] => QueryValue::Scalar(single.clone()),
        many => QueryValue::List(many.to_vec()),
    }
}

/// The query compiler. Holds no per-call state; predicate and
/// join-graph state lives in local variables threaded through recursion,
/// not on `self`.
pub struct QueryCompiler<'a> {
    catalog: &'a Catalog,
    dialect: &'a dyn DialectDriver,
    hooks: &'a HookRegistry,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(catalog: &'a Catalog, dialect: &'a dyn DialectDriver, hooks: &'a HookRegistry) -> Self {
        QueryCompiler { catalog, dialect, hooks }
    }

    /// Entry point. Only the explicit-parameter form is exposed — there is
    /// no convenience overload that silently defaults `skip_joins`.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, request), fields(model = M::type_name())))]
    pub fn compile<M: Model + 'static>(&self, request: QueryRequest) -> Result<Sql> {
        let table = self.catalog.table_of::<M>()?;
        self.compile_for_table(&table, request)
    }

    /// The recursive engine. Works entirely off [`TableDescriptor`] data —
    /// not a Rust generic — so collection/reference navigation can recurse
    /// into an element type known only by table name at the call site; the
    /// catalog is data, keyed by identity token, not a language-level type
    /// handle. Callers that navigate into a type must
    /// have already registered it with the catalog at least once via
    /// [`Catalog::table_of`].
    fn compile_for_table(&self, table0: &Arc<TableDescriptor>, request: QueryRequest) -> Result<Sql> {
        let QueryRequest {
            mut pairs,
            projection,
            alias_prefix,
            skip_joins,
        } = request;

        let mut base = table0.clone();

        // skip_joins + obsoletionTime retarget: gated on `versioned`,
        // never fires for non-versioned types.
        if skip_joins && base.versioned {
            let references_own_column = pairs.iter().any(|(k, _)| {
                let Some(p) = PredicatePath::parse(k) else {
                    return false;
                };
                p.path != "obsoletionTime" && base.column_by_property(&p.path).is_some()
            });
            if !references_own_column {
                if let Some(fk_col) = base.always_join_columns().next() {
                    let fk = fk_col.foreign_key.clone().ok_or_else(|| {
                        CompileError::SchemaError(
                            format!("always-join column `{}` has no foreign key", fk_col.name).into(),
                        )
                    })?;
                    let retargeted = self.catalog.table_of_name(&fk.target_table).ok_or_else(|| {
                        CompileError::SchemaError(format!("unknown table `{}`", fk.target_table).into())
                    })?;
                    base = retargeted;
                }
                pairs.retain(|(k, _)| {
                    PredicatePath::parse(k).map(|p| p.path != "obsoletionTime").unwrap_or(true)
                });
            }
        }

        // Step 3: FROM + hierarchy joins.
        let (from_sql, scoped_names) = if skip_joins {
            let alias = alias_for(&alias_prefix, &base.table_name);
            let from = Sql::token(Token::From)
                .append(Sql::ident(base.table_name.clone()))
                .push(Token::As)
                .append(Sql::ident(alias));
            (from, vec![base.table_name.clone()])
        } else {
            let entry = self.catalog.get_or_populate_join(&alias_prefix, base.type_id, || {
                self.build_hierarchy_join(&base, &alias_prefix)
            })?;
            (entry.from.clone(), entry.scoped_tables.clone())
        };

        let scoped_tables: Vec<Arc<TableDescriptor>> = scoped_names
            .iter()
            .filter_map(|name| self.catalog.table_of_name(name))
            .collect();

        // Step 4: projection.
        let select = self.emit_projection(&base, &scoped_tables, &alias_prefix, projection.as_deref());

        // Step 5: predicate processing.
        let mut where_clause = Sql::empty();
        let mut queue: VecDeque<(CompactString, QueryValue)> = pairs.into_iter().collect();
        while let Some((k, v)) = queue.pop_front() {
            let p = PredicatePath::parse(&k).ok_or_else(|| CompileError::PathError {
                model: base.type_name,
                path: k.clone(),
            })?;
            let sibling_key = p.sibling_key();

            let mut raw_values = Self::flatten_value(&v);
            let mut group_values = vec![v];
            let mut i = 0;
            while i < queue.len() {
                // Merge only entries that share guard and sub-path too, not
                // just `(path, cast)`: two differently-guarded collection
                // predicates on the same navigation property are distinct
                // sub-queries, not OR/AND siblings of one column comparison.
                let matches = PredicatePath::parse(&queue[i].0)
                    .map(|sp| sp.sibling_key() == sibling_key && sp.guard == p.guard && sp.sub_path == p.sub_path)
                    .unwrap_or(false);
                if matches {
                    let (_, sv) = queue.remove(i).unwrap();
                    raw_values.extend(Self::flatten_value(&sv));
                    group_values.push(sv);
                } else {
                    i += 1;
                }
            }

            let clause = self.compile_group(&base, &scoped_tables, &alias_prefix, &p, &raw_values, &group_values)?;
            if !clause.is_empty() {
                where_clause = Self::and_into(where_clause, clause);
            }
        }

        // Step 6 (compose): no path through this compiler ever accumulates a
        // CTE to prefix under WITH — collection/reference navigation always
        // lowers to a correlated EXISTS sub-query inline, never a named CTE
        // — so there is nothing to prefix here. See DESIGN.md's Open
        // Question resolutions.
        let mut stmt = select.append(from_sql);
        if !where_clause.is_empty() {
            stmt = stmt.push(Token::Where).append(where_clause);
        }
        Ok(stmt)
    }

    fn flatten_value(v: &QueryValue) -> Vec<CompactString> {
        match v {
            QueryValue::Scalar(s) => vec![s.clone()],
            QueryValue::List(vs) => vs.clone(),
        }
    }

    fn and_into(where_clause: Sql, clause: Sql) -> Sql {
        if where_clause.is_empty() {
            clause
        } else {
            where_clause.push(Token::And).append(clause)
        }
    }

    /// Attaches a correlated join predicate to an already-compiled
    /// `SELECT … FROM …[ WHERE …]` statement: `AND`s it in if the statement
    /// already has a `WHERE`, otherwise introduces one. Unlike
    /// [`Self::and_into`] (which combines two bare predicate fragments),
    /// `stmt` here may or may not already carry a `WHERE` keyword.
    fn attach_correlation(stmt: Sql, predicate: Sql) -> Sql {
        if stmt.contains("WHERE") {
            stmt.push(Token::And).append(predicate)
        } else {
            stmt.push(Token::Where).append(predicate)
        }
    }

    /// DFS through always-join edges from `base`, emitting `FROM base AS
    /// alias` followed by `INNER JOIN target AS alias ON (…)` for every
    /// edge, attaching join filters, and recording every visited table name.
    fn build_hierarchy_join(&self, base: &Arc<TableDescriptor>, prefix: &str) -> Result<JoinCacheEntry> {
        let base_alias = alias_for(prefix, &base.table_name);
        let mut from = Sql::token(Token::From)
            .append(Sql::ident(base.table_name.clone()))
            .push(Token::As)
            .append(Sql::ident(base_alias.clone()));

        let mut scoped = vec![base.table_name.clone()];
        let mut visited = HashSet::new();
        visited.insert(base.table_name.clone());

        self.walk_always_join(base, &base_alias, prefix, &mut from, &mut scoped, &mut visited)?;

        Ok(JoinCacheEntry {
            from,
            scoped_tables: scoped,
        })
    }

    fn walk_always_join(
        &self,
        owner: &Arc<TableDescriptor>,
        owner_alias: &str,
        prefix: &str,
        from: &mut Sql,
        scoped: &mut Vec<CompactString>,
        visited: &mut HashSet<CompactString>,
    ) -> Result<()> {
        for fk_col in owner.always_join_columns() {
            let fk = fk_col.foreign_key.as_ref().ok_or_else(|| {
                CompileError::SchemaError(format!("always-join column `{}` has no foreign key", fk_col.name).into())
            })?;
            if !visited.insert(fk.target_table.clone()) {
                continue;
            }
            let target = self.catalog.table_of_name(&fk.target_table).ok_or_else(|| {
                CompileError::SchemaError(format!("unknown always-join target `{}`", fk.target_table).into())
            })?;
            let target_alias = alias_for(prefix, &target.table_name);

            let on = Sql::raw(format!("{owner_alias}.{}", fk_col.name))
                .push(Token::Eq)
                .append(Sql::raw(format!("{target_alias}.{}", fk.target_column)));
            let on = self.append_join_filters(on, fk_col, &target, &target_alias)?;

            *from = from
                .clone()
                .push(Token::Inner)
                .push(Token::Join)
                .append(Sql::ident(target.table_name.clone()))
                .push(Token::As)
                .append(Sql::ident(target_alias.clone()))
                .push(Token::On)
                .append(on.parens());

            scoped.push(target.table_name.clone());
            self.walk_always_join(&target, &target_alias, prefix, from, scoped, visited)?;
        }
        Ok(())
    }

    /// Attaches an always-join column's declared join filters to its `ON`
    /// clause: same-property filters OR together, different properties AND
    /// together. Grouped via a `Vec` (not a `HashMap`) so the emitted SQL
    /// is deterministic across process runs rather than
    /// dependent on hash-iteration order.
    fn append_join_filters(
        &self,
        on: Sql,
        fk_col: &ColumnDescriptor,
        target: &Arc<TableDescriptor>,
        target_alias: &str,
    ) -> Result<Sql> {
        if fk_col.join_filters.is_empty() {
            return Ok(on);
        }
        let mut order: Vec<&str> = Vec::new();
        let mut by_property: FastMap<&str, Vec<&crate::value::Value>> = FastMap::new();
        for filter in &fk_col.join_filters {
            if !by_property.contains_key(filter.property.as_str()) {
                order.push(filter.property.as_str());
            }
            by_property.entry(filter.property.as_str()).or_default().push(&filter.value);
        }

        let mut and_terms = Vec::new();
        for property in order {
            let values = &by_property[property];
            let col = target.column_by_property(property).ok_or_else(|| {
                CompileError::SchemaError(format!("join filter references unknown property `{property}`").into())
            })?;
            let or_terms: Vec<Sql> = values
                .iter()
                .map(|value| {
                    Sql::raw(format!("{target_alias}.{}", col.name))
                        .push(Token::Eq)
                        .append(Sql::param((*value).clone()))
                })
                .collect();
            and_terms.push(Sql::join(or_terms, Token::Or));
        }
        let filters = Sql::join(and_terms, Token::And);
        Ok(on.push(Token::And).append(filters))
    }

    fn emit_projection(
        &self,
        base: &Arc<TableDescriptor>,
        scoped: &[Arc<TableDescriptor>],
        prefix: &str,
        explicit: Option<&[ColumnDescriptor]>,
    ) -> Sql {
        let select = Sql::token(Token::Select);
        if let Some(columns) = explicit {
            let parts: Vec<Sql> = columns
                .iter()
                .map(|c| {
                    // `ColumnDescriptor::one()`/`::star()` are unbound
                    // sentinels (empty `table`/`property`) standing in for
                    // a literal `1` or `*` projection, not a real column.
                    if c.table.is_empty() && c.property.is_empty() {
                        return Sql::raw(c.name.clone());
                    }
                    let owner = if c.table.is_empty() { base.table_name.clone() } else { c.table.clone() };
                    Sql::qualified(&alias_for(prefix, &owner), &c.name)
                })
                .collect();
            return select.append(Sql::join(parts, Token::Comma));
        }

        if self.dialect.features().contains(DialectFeatures::STRICT_SUBQUERY_COLUMN_NAMES) {
            let mut seen = HashSet::new();
            let mut parts = Vec::new();
            for table in scoped {
                let alias = alias_for(prefix, &table.table_name);
                for col in &table.columns {
                    if seen.insert(col.name.clone()) {
                        parts.push(Sql::qualified(&alias, &col.name));
                    }
                }
            }
            return select.append(Sql::join(parts, Token::Comma));
        }

        select.push(Token::Star)
    }

    /// Resolves and compiles one grouped `(path, [values])` entry: rewrite
    /// hooks get first refusal, then dispatch on the property's shape
    /// (scalar / collection / reference).
    fn compile_group(
        &self,
        base: &Arc<TableDescriptor>,
        scoped: &[Arc<TableDescriptor>],
        prefix: &str,
        p: &PredicatePath,
        raw_values: &[CompactString],
        group_values: &[QueryValue],
    ) -> Result<Sql> {
        let select_ctx = Sql::empty();
        let where_ctx = Sql::empty();
        let scoped_refs: Vec<&TableDescriptor> = scoped.iter().map(Arc::as_ref).collect();
        let ctx = HookContext {
            select: &select_ctx,
            where_clause: &where_ctx,
            model_type: base.type_id,
            alias_prefix: prefix,
            scoped_tables: &scoped_refs,
        };
        let representative = if raw_values.len() > 1 {
            QueryValue::List(raw_values.to_vec())
        } else {
            group_values.first().cloned().unwrap_or(QueryValue::Scalar(CompactString::new("")))
        };
        if let Some(appended) = self.hooks.try_claim(&ctx, &p.path, p, &representative) {
            return Ok(appended);
        }

        if let Some((owner, nav)) = self.resolve_navigation(base, &p.path) {
            return self.compile_navigation(&owner, &nav, prefix, p, raw_values);
        }

        let col = self.catalog.column_of(base, &p.path, true).ok_or_else(|| CompileError::PathError {
            model: base.type_name,
            path: p.path.clone(),
        })?;
        let alias = if col.table.is_empty() {
            alias_for(prefix, &base.table_name)
        } else {
            alias_for(prefix, &col.table)
        };
        operator::create_sql_predicate(&alias, &col.name, col.prop_type, raw_values)
    }

    /// Looks up a navigation property on `base`, recursing through
    /// always-join ancestors the same way [`Catalog::column_of`] does for
    /// scalar columns.
    fn resolve_navigation(&self, base: &Arc<TableDescriptor>, property: &str) -> Option<(Arc<TableDescriptor>, NavigationSpec)> {
        if let Some(nav) = base.navigation_by_property(property) {
            return Some((base.clone(), nav.clone()));
        }
        for fk_col in base.always_join_columns() {
            let fk = fk_col.foreign_key.as_ref()?;
            let parent = self.catalog.table_of_name(&fk.target_table)?;
            if let Some(found) = self.resolve_navigation(&parent, property) {
                return Some(found);
            }
        }
        None
    }

    fn compile_navigation(
        &self,
        owner: &Arc<TableDescriptor>,
        nav: &NavigationSpec,
        prefix: &str,
        p: &PredicatePath,
        raw_values: &[CompactString],
    ) -> Result<Sql> {
        let owner_alias = alias_for(prefix, &owner.table_name);
        match &nav.kind {
            NavigationKind::Collection { element_table, versioned } => {
                let target_table_name = p.cast.as_deref().unwrap_or(element_table.as_str());
                let element = self.catalog.table_of_name(target_table_name).ok_or_else(|| {
                    CompileError::SchemaError(format!("unknown navigation target `{target_table_name}`").into())
                })?;

                // The literal `"null"` value with no sub-path negates the
                // whole navigation: if the outer value is
                // literally `null` and no sub-path is present, the
                // sub-query is emitted under NOT EXISTS instead.
                if p.sub_path.is_none() && raw_values.len() == 1 && raw_values[0].as_str() == "null" {
                    let inner = self.compile_collection_exists(
                        owner, &owner_alias, &element, nav, *versioned, prefix, p, raw_values, &[],
                    )?;
                    return Ok(Sql::token(Token::Not).push(Token::Exists).append(inner.parens()));
                }

                let guards: Vec<Option<CompactString>> = match &p.guard {
                    Some(g) => g.split('|').map(|s| Some(CompactString::from(s))).collect(),
                    None => vec![None],
                };
                let mut subqueries = Vec::new();
                for guard in &guards {
                    let guard_slice: &[CompactString] = match guard {
                        Some(g) => core::slice::from_ref(g),
                        None => &[],
                    };
                    let inner = self.compile_collection_exists(
                        owner, &owner_alias, &element, nav, *versioned, prefix, p, raw_values, guard_slice,
                    )?;
                    subqueries.push(Sql::token(Token::Exists).append(inner.parens()));
                }
                Ok(Sql::join(subqueries, Token::And))
            }
            NavigationKind::Reference { target_table } => {
                let target_table_name = p.cast.as_deref().unwrap_or(target_table.as_str());
                let target = self.catalog.table_of_name(target_table_name).ok_or_else(|| {
                    CompileError::SchemaError(format!("unknown navigation target `{target_table_name}`").into())
                })?;
                let link_col = owner.column_by_property(&p.path).ok_or_else(|| {
                    CompileError::SchemaError(format!("no link column for reference property `{}`", p.path).into())
                })?;
                let fk = link_col.foreign_key.as_ref().ok_or_else(|| {
                    CompileError::SchemaError(format!("reference column `{}` has no foreign key", link_col.name).into())
                })?;

                let inner_alias = next_alias(prefix);
                let sub_path = p.sub_path.clone().unwrap_or_default();
                let inner_pairs: Vec<(CompactString, QueryValue)> = if sub_path.is_empty() {
                    Vec::new()
                } else {
                    vec![(sub_path, group_value_from_raw(raw_values))]
                };

                let inner_request = QueryRequest::new(inner_pairs)
                    .alias_prefix(inner_alias.clone())
                    .projection(vec![ColumnDescriptor::one()]);
                let inner_sql = self.compile_for_table(&target, inner_request)?;

                let target_alias = alias_for(&inner_alias, &target.table_name);
                let join_pred = Sql::raw(format!("{owner_alias}.{}", link_col.name))
                    .push(Token::Eq)
                    .append(Sql::raw(format!("{target_alias}.{}", fk.target_column)));

                let inner_sql = Self::attach_correlation(inner_sql, join_pred);
                Ok(Sql::token(Token::Exists).append(inner_sql.parens()))
            }
        }
    }

    /// Builds the (unwrapped — the caller adds `EXISTS`/`NOT EXISTS`)
    /// `SELECT link FROM element … WHERE sub-predicates AND link-back`
    /// sub-query for one guard value (or none). `values` carries the
    /// outer predicate's raw value list, applied to the sub-path column
    /// when present; `guard_values` carries this call's single classifier
    /// guard (empty when unguarded).
    #[allow(clippy::too_many_arguments)]
    fn compile_collection_exists(
        &self,
        owner: &Arc<TableDescriptor>,
        owner_alias: &str,
        element: &Arc<TableDescriptor>,
        nav: &NavigationSpec,
        versioned: bool,
        prefix: &str,
        p: &PredicatePath,
        values: &[CompactString],
        guard_values: &[CompactString],
    ) -> Result<Sql> {
        let inner_alias = next_alias(prefix);

        let mut inner_pairs: Vec<(CompactString, QueryValue)> = Vec::new();
        if let Some(sub_path) = &p.sub_path {
            inner_pairs.push((sub_path.clone(), group_value_from_raw(values)));
        }
        if let (Some(classifier), Some(guard)) = (&nav.classifier_property, guard_values.first()) {
            inner_pairs.push((classifier.clone(), QueryValue::Scalar(guard.clone())));
        }
        if versioned {
            inner_pairs.push(("obsoleteVersionSequence".into(), QueryValue::Scalar("null".into())));
        }

        let direct_link = element
            .columns
            .iter()
            .find(|c| c.foreign_key.as_ref().map(|fk| fk.target_table == owner.table_name).unwrap_or(false))
            .cloned();

        if let Some(link_col) = direct_link {
            let element_alias = alias_for(&inner_alias, &element.table_name);
            let inner_request = QueryRequest::new(inner_pairs)
                .alias_prefix(inner_alias.clone())
                .projection(vec![link_col.clone()]);
            let inner_sql = self.compile_for_table(element, inner_request)?;

            let fk = link_col
                .foreign_key
                .as_ref()
                .expect("direct_link columns always carry their foreign key");
            let link_back = Sql::raw(format!("{owner_alias}.{}", fk.target_column))
                .push(Token::Eq)
                .append(Sql::raw(format!("{element_alias}.{}", link_col.name)));
            return Ok(Self::attach_correlation(inner_sql, link_back));
        }

        // No direct FK from element back to owner: fall through to an
        // associative table.
        let assoc = self.catalog.association_between(owner, element).ok_or_else(|| {
            CompileError::SchemaError(format!("no join route from `{}` to `{}`", owner.table_name, element.table_name).into())
        })?;
        let owner_fk_col = assoc
            .columns
            .iter()
            .find(|c| c.foreign_key.as_ref().map(|fk| fk.target_table == owner.table_name).unwrap_or(false))
            .cloned()
            .ok_or_else(|| {
                CompileError::SchemaError(format!("associative table `{}` has no link to `{}`", assoc.table_name, owner.table_name).into())
            })?;
        let element_fk_col = assoc
            .columns
            .iter()
            .find(|c| c.foreign_key.as_ref().map(|fk| fk.target_table == element.table_name).unwrap_or(false))
            .cloned()
            .ok_or_else(|| {
                CompileError::SchemaError(format!("associative table `{}` has no link to `{}`", assoc.table_name, element.table_name).into())
            })?;
        let element_fk = element_fk_col
            .foreign_key
            .as_ref()
            .expect("element_fk_col always carries its foreign key");
        let element_pk_col = element.column_by_name(&element_fk.target_column).cloned().ok_or_else(|| {
            CompileError::SchemaError(format!("unknown column `{}` on `{}`", element_fk.target_column, element.table_name).into())
        })?;

        let nested_alias = next_alias(&inner_alias);
        let element_request = QueryRequest::new(inner_pairs)
            .alias_prefix(nested_alias.clone())
            .projection(vec![element_pk_col]);
        let element_subselect = self.compile_for_table(element, element_request)?;

        let assoc_alias = alias_for(&inner_alias, &assoc.table_name);
        let assoc_from = Sql::token(Token::From)
            .append(Sql::ident(assoc.table_name.clone()))
            .push(Token::As)
            .append(Sql::ident(assoc_alias.clone()));

        let owner_fk = owner_fk_col
            .foreign_key
            .as_ref()
            .expect("owner_fk_col always carries its foreign key");
        let owner_link = Sql::raw(format!("{owner_alias}.{}", owner_fk.target_column))
            .push(Token::Eq)
            .append(Sql::raw(format!("{assoc_alias}.{}", owner_fk_col.name)));
        let in_clause = Sql::raw(format!("{assoc_alias}.{}", element_fk_col.name))
            .push(Token::In)
            .append(element_subselect.parens());

        let where_clause = Self::and_into(owner_link, in_clause);
        Ok(Sql::token(Token::Select)
            .push(Token::Star)
            .append(assoc_from)
            .push(Token::Where)
            .append(where_clause))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqliteDialect};
    use crate::schema::{AssociativeLink, ColumnFlags, ColumnSpec};

    struct Concept;
    impl Model for Concept {
        fn type_name() -> &'static str {
            "Concept"
        }
        fn table_name() -> &'static str {
            "cd_tbl"
        }
        fn columns() -> Vec<ColumnSpec> {
            vec![
                ColumnSpec::new("id", "id").flags(ColumnFlags::PRIMARY_KEY),
                ColumnSpec::new("mnemonic", "mnemonic"),
                ColumnSpec::new("value", "value").prop_type(crate::value::PropertyType::Integer),
                ColumnSpec::new("obsoletionTime", "obsoletionTime"),
            ]
        }
    }

    fn fresh_catalog() -> Catalog {
        let catalog = Catalog::default();
        catalog.table_of::<Concept>().unwrap();
        catalog
    }

    #[test]
    fn simple_equality_scenario() {
        let catalog = fresh_catalog();
        let hooks = HookRegistry::new();
        let dialect = SqliteDialect;
        let compiler = QueryCompiler::new(&catalog, &dialect, &hooks);

        let pairs = vec![("mnemonic".into(), QueryValue::Scalar("Active".into()))];
        let sql = compiler.compile::<Concept>(QueryRequest::new(pairs)).unwrap();
        let (text, args) = sql.sql(&dialect);
        assert!(text.starts_with("SELECT *"));
        assert!(text.contains("FROM \"cd_tbl\" AS \"cd_tbl\""));
        assert!(text.contains("WHERE (cd_tbl.mnemonic = ?)"));
        assert_eq!(args, vec![crate::value::Value::Text("Active".into())]);
    }

    #[test]
    fn multi_value_ors_together() {
        let catalog = fresh_catalog();
        let hooks = HookRegistry::new();
        let dialect = SqliteDialect;
        let compiler = QueryCompiler::new(&catalog, &dialect, &hooks);

        let pairs = vec![
            ("mnemonic".into(), QueryValue::Scalar("A".into())),
            ("mnemonic".into(), QueryValue::Scalar("B".into())),
        ];
        let sql = compiler.compile::<Concept>(QueryRequest::new(pairs)).unwrap();
        let (text, args) = sql.sql(&dialect);
        assert!(text.contains("(cd_tbl.mnemonic = ? OR cd_tbl.mnemonic = ?)"));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn operator_prefix_range_ands_together() {
        let catalog = fresh_catalog();
        let hooks = HookRegistry::new();
        let dialect = SqliteDialect;
        let compiler = QueryCompiler::new(&catalog, &dialect, &hooks);

        let pairs = vec![
            ("value".into(), QueryValue::Scalar(">=5".into())),
            ("value".into(), QueryValue::Scalar("<10".into())),
        ];
        let sql = compiler.compile::<Concept>(QueryRequest::new(pairs)).unwrap();
        let (text, _) = sql.sql(&dialect);
        assert!(text.contains("(cd_tbl.value >= ? AND cd_tbl.value < ?)"));
    }

    #[test]
    fn null_check_scenario() {
        let catalog = fresh_catalog();
        let hooks = HookRegistry::new();
        let dialect = SqliteDialect;
        let compiler = QueryCompiler::new(&catalog, &dialect, &hooks);

        let pairs = vec![("obsoletionTime".into(), QueryValue::Scalar("null".into()))];
        let sql = compiler.compile::<Concept>(QueryRequest::new(pairs)).unwrap();
        let (text, args) = sql.sql(&dialect);
        assert!(text.contains("(cd_tbl.obsoletionTime IS NULL)"));
        assert!(args.is_empty());
    }

    #[test]
    fn unknown_path_is_path_error() {
        let catalog = fresh_catalog();
        let hooks = HookRegistry::new();
        let dialect = SqliteDialect;
        let compiler = QueryCompiler::new(&catalog, &dialect, &hooks);

        let pairs = vec![("nonexistent".into(), QueryValue::Scalar("x".into()))];
        let err = compiler.compile::<Concept>(QueryRequest::new(pairs)).unwrap_err();
        assert!(matches!(err, CompileError::PathError { .. }));
    }

    #[test]
    fn strict_subquery_columns_expand_star() {
        let catalog = fresh_catalog();
        let hooks = HookRegistry::new();
        let dialect = PostgresDialect;
        let compiler = QueryCompiler::new(&catalog, &dialect, &hooks);

        let pairs = vec![("mnemonic".into(), QueryValue::Scalar("Active".into()))];
        let sql = compiler.compile::<Concept>(QueryRequest::new(pairs)).unwrap();
        let (text, _) = sql.sql(&dialect);
        assert!(text.starts_with("SELECT \"cd_tbl\".\"id\""));
        assert!(!text.contains("SELECT *"));
    }

    #[test]
    fn determinism_identical_inputs_produce_identical_sql() {
        let catalog = fresh_catalog();
        let hooks = HookRegistry::new();
        let dialect = SqliteDialect;
        let compiler = QueryCompiler::new(&catalog, &dialect, &hooks);

        let pairs = || vec![("mnemonic".into(), QueryValue::Scalar("Active".into()))];
        let first = compiler.compile::<Concept>(QueryRequest::new(pairs())).unwrap();
        let second = compiler.compile::<Concept>(QueryRequest::new(pairs())).unwrap();
        assert_eq!(first.sql(&dialect), second.sql(&dialect));
    }

    struct Patient;
    impl Model for Patient {
        fn type_name() -> &'static str {
            "Patient"
        }
        fn table_name() -> &'static str {
            "pat_tbl"
        }
        fn columns() -> Vec<ColumnSpec> {
            vec![ColumnSpec::new("id", "id").flags(ColumnFlags::PRIMARY_KEY)]
        }
        fn navigations() -> Vec<NavigationSpec> {
            vec![
                NavigationSpec::collection("identifier", "pat_id_tbl").classifier("idType"),
                NavigationSpec::collection("tag", "tag_tbl"),
            ]
        }
    }

    struct PatientIdentifier;
    impl Model for PatientIdentifier {
        fn type_name() -> &'static str {
            "PatientIdentifier"
        }
        fn table_name() -> &'static str {
            "pat_id_tbl"
        }
        fn columns() -> Vec<ColumnSpec> {
            vec![
                ColumnSpec::new("ent_id", "patient").foreign_key("pat_tbl", "id"),
                ColumnSpec::new("id_val", "value"),
                ColumnSpec::new("id_type", "idType"),
            ]
        }
    }

    struct Tag;
    impl Model for Tag {
        fn type_name() -> &'static str {
            "Tag"
        }
        fn table_name() -> &'static str {
            "tag_tbl"
        }
        fn columns() -> Vec<ColumnSpec> {
            vec![
                ColumnSpec::new("id", "id").flags(ColumnFlags::PRIMARY_KEY),
                ColumnSpec::new("name", "name"),
            ]
        }
    }

    struct PatientTag;
    impl Model for PatientTag {
        fn type_name() -> &'static str {
            "PatientTag"
        }
        fn table_name() -> &'static str {
            "pat_tag_tbl"
        }
        fn columns() -> Vec<ColumnSpec> {
            vec![
                ColumnSpec::new("patient_id", "patient").foreign_key("pat_tbl", "id"),
                ColumnSpec::new("tag_id", "tag").foreign_key("tag_tbl", "id"),
            ]
        }
    }

    fn patient_catalog() -> Catalog {
        let catalog = Catalog::default();
        catalog.table_of::<Patient>().unwrap();
        catalog.table_of::<PatientIdentifier>().unwrap();
        catalog
    }

    #[test]
    fn collection_navigation_emits_exists_subquery() {
        let catalog = patient_catalog();
        let hooks = HookRegistry::new();
        let dialect = SqliteDialect;
        let compiler = QueryCompiler::new(&catalog, &dialect, &hooks);

        let pairs = vec![("identifier.value".into(), QueryValue::Scalar("123".into()))];
        let sql = compiler.compile::<Patient>(QueryRequest::new(pairs)).unwrap();
        let (text, args) = sql.sql(&dialect);
        assert!(text.contains("EXISTS ("));
        assert!(text.contains("\"pat_id_tbl\" AS \"sq0pat_id_tbl\""));
        assert!(text.contains("sq0pat_id_tbl.id_val = ?"));
        assert!(text.contains("pat_tbl.id = sq0pat_id_tbl.ent_id"));
        assert_eq!(args, vec![crate::value::Value::Text("123".into())]);
    }

    #[test]
    fn guarded_collection_translates_to_classifier_equality() {
        let catalog = patient_catalog();
        let hooks = HookRegistry::new();
        let dialect = SqliteDialect;
        let compiler = QueryCompiler::new(&catalog, &dialect, &hooks);

        let pairs = vec![("identifier[OID].value".into(), QueryValue::Scalar("1.2.3".into()))];
        let sql = compiler.compile::<Patient>(QueryRequest::new(pairs)).unwrap();
        let (text, args) = sql.sql(&dialect);
        assert!(text.contains("sq0pat_id_tbl.id_val = ?"));
        assert!(text.contains("sq0pat_id_tbl.id_type = ?"));
        assert_eq!(
            args,
            vec![
                crate::value::Value::Text("1.2.3".into()),
                crate::value::Value::Text("OID".into()),
            ]
        );
    }

    #[test]
    fn negated_collection_navigation_emits_not_exists() {
        let catalog = patient_catalog();
        let hooks = HookRegistry::new();
        let dialect = SqliteDialect;
        let compiler = QueryCompiler::new(&catalog, &dialect, &hooks);

        let pairs = vec![("identifier".into(), QueryValue::Scalar("null".into()))];
        let sql = compiler.compile::<Patient>(QueryRequest::new(pairs)).unwrap();
        let (text, _) = sql.sql(&dialect);
        assert!(text.contains("NOT EXISTS ("));
    }

    #[test]
    fn associative_collection_navigation_joins_through_link_table() {
        let catalog = Catalog::default();

        // `AssociativeLink` is declared on the owner by hand here, since
        // `Patient` above (used by the other navigation tests) doesn't
        // declare one.
        struct PatientWithLink;
        impl Model for PatientWithLink {
            fn type_name() -> &'static str {
                "Patient"
            }
            fn table_name() -> &'static str {
                "pat_tbl"
            }
            fn columns() -> Vec<ColumnSpec> {
                vec![ColumnSpec::new("id", "id").flags(ColumnFlags::PRIMARY_KEY)]
            }
            fn associative_links() -> Vec<AssociativeLink> {
                vec![AssociativeLink {
                    target_table: "tag_tbl".into(),
                    association_table: "pat_tag_tbl".into(),
                }]
            }
            fn navigations() -> Vec<NavigationSpec> {
                vec![NavigationSpec::collection("tag", "tag_tbl")]
            }
        }
        catalog.table_of::<PatientWithLink>().unwrap();
        catalog.table_of::<Tag>().unwrap();
        catalog.table_of::<PatientTag>().unwrap();

        let hooks = HookRegistry::new();
        let dialect = SqliteDialect;
        let compiler = QueryCompiler::new(&catalog, &dialect, &hooks);

        let pairs = vec![("tag.name".into(), QueryValue::Scalar("urgent".into()))];
        let sql = compiler.compile::<PatientWithLink>(QueryRequest::new(pairs)).unwrap();
        let (text, args) = sql.sql(&dialect);
        assert!(text.contains("\"pat_tag_tbl\" AS \"sq0pat_tag_tbl\""));
        assert!(text.contains("sq0pat_tag_tbl.tag_id IN"));
        assert_eq!(args, vec![crate::value::Value::Text("urgent".into())]);
    }
}
