//! Black-box coverage of six representative query-compilation scenarios
//! (hierarchy joins, collection/reference navigation, polymorphic casts,
//! guard translation, rewrite hooks, sub-query aliasing), exercised
//! through the crate's public surface only (no `pub(crate)` reach-ins) —
//! this is what a downstream driver crate sees.

use relforge_core::{
    AssociativeLink, Catalog, ColumnFlags, ColumnSpec, HookRegistry, Model, NavigationSpec,
    PostgresDialect, QueryCompiler, QueryRequest, QueryValue, SqliteDialect, Value,
};

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
            ColumnSpec::new("value", "value").prop_type(relforge_core::PropertyType::Integer),
            ColumnSpec::new("obsoletionTime", "obsoletionTime"),
        ]
    }
}

fn concept_catalog() -> Catalog {
    let catalog = Catalog::default();
    catalog.table_of::<Concept>().unwrap();
    catalog
}

#[test]
fn scenario_1_simple_equality() {
    let catalog = concept_catalog();
    let hooks = HookRegistry::new();
    let dialect = SqliteDialect;
    let compiler = QueryCompiler::new(&catalog, &dialect, &hooks);

    let pairs = vec![("mnemonic".into(), QueryValue::Scalar("Active".into()))];
    let sql = compiler.compile::<Concept>(QueryRequest::new(pairs)).unwrap();
    let (text, args) = sql.sql(&dialect);
    assert!(text.contains("FROM \"cd_tbl\" AS \"cd_tbl\""));
    assert!(text.contains("WHERE (cd_tbl.mnemonic = ?)"));
    assert_eq!(args, vec![Value::Text("Active".into())]);
}

#[test]
fn scenario_2_multi_value_or() {
    let catalog = concept_catalog();
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
    assert_eq!(args, vec![Value::Text("A".into()), Value::Text("B".into())]);
}

#[test]
fn scenario_3_operator_prefix_range() {
    let catalog = concept_catalog();
    let hooks = HookRegistry::new();
    let dialect = SqliteDialect;
    let compiler = QueryCompiler::new(&catalog, &dialect, &hooks);

    let pairs = vec![
        ("value".into(), QueryValue::Scalar(">=5".into())),
        ("value".into(), QueryValue::Scalar("<10".into())),
    ];
    let sql = compiler.compile::<Concept>(QueryRequest::new(pairs)).unwrap();
    let (text, args) = sql.sql(&dialect);
    assert!(text.contains("(cd_tbl.value >= ? AND cd_tbl.value < ?)"));
    assert_eq!(args, vec![Value::Integer(5), Value::Integer(10)]);
}

#[test]
fn scenario_4_null_check() {
    let catalog = concept_catalog();
    let hooks = HookRegistry::new();
    let dialect = SqliteDialect;
    let compiler = QueryCompiler::new(&catalog, &dialect, &hooks);

    let pairs = vec![("obsoletionTime".into(), QueryValue::Scalar("null".into()))];
    let sql = compiler.compile::<Concept>(QueryRequest::new(pairs)).unwrap();
    let (text, args) = sql.sql(&dialect);
    assert!(text.contains("(cd_tbl.obsoletionTime IS NULL)"));
    assert!(args.is_empty());
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
    fn associative_links() -> Vec<AssociativeLink> {
        vec![AssociativeLink {
            target_table: "tag_tbl".into(),
            association_table: "pat_tag_tbl".into(),
        }]
    }
    fn navigations() -> Vec<NavigationSpec> {
        vec![
            NavigationSpec::collection("identifier", "pat_id_tbl").classifier("idType").versioned(),
            NavigationSpec::collection("tag", "tag_tbl"),
        ]
    }
    fn versioned() -> bool {
        true
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
            ColumnSpec::new("obsolete_version_sequence", "obsoleteVersionSequence"),
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
fn scenario_5_collection_exists() {
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
    // versioned navigation appends obsoleteVersionSequence IS NULL.
    assert!(text.contains("sq0pat_id_tbl.obsolete_version_sequence IS NULL"));
    assert_eq!(args, vec![Value::Text("123".into())]);
}

#[test]
fn scenario_6_guarded_collection_with_classifier() {
    let catalog = patient_catalog();
    let hooks = HookRegistry::new();
    let dialect = SqliteDialect;
    let compiler = QueryCompiler::new(&catalog, &dialect, &hooks);

    let pairs = vec![("identifier[OID].value".into(), QueryValue::Scalar("1.2.3".into()))];
    let sql = compiler.compile::<Patient>(QueryRequest::new(pairs)).unwrap();
    let (text, args) = sql.sql(&dialect);
    assert!(text.contains("sq0pat_id_tbl.id_val = ?"));
    assert!(text.contains("sq0pat_id_tbl.id_type = ?"));
    assert!(text.contains("sq0pat_id_tbl.obsolete_version_sequence IS NULL"));
    assert_eq!(args, vec![Value::Text("1.2.3".into()), Value::Text("OID".into())]);
}

#[test]
fn strict_subquery_dialect_expands_projection() {
    let catalog = concept_catalog();
    let hooks = HookRegistry::new();
    let dialect = PostgresDialect;
    let compiler = QueryCompiler::new(&catalog, &dialect, &hooks);

    let pairs = vec![("mnemonic".into(), QueryValue::Scalar("Active".into()))];
    let sql = compiler.compile::<Concept>(QueryRequest::new(pairs)).unwrap();
    let (text, _) = sql.sql(&dialect);
    assert!(!text.contains("SELECT *"));
    assert!(text.starts_with("SELECT \"cd_tbl\".\"id\""));
}

#[test]
fn determinism_across_repeated_compilations() {
    let catalog = patient_catalog();
    let hooks = HookRegistry::new();
    let dialect = SqliteDialect;
    let compiler = QueryCompiler::new(&catalog, &dialect, &hooks);

    let make_pairs = || vec![("identifier[OID].value".into(), QueryValue::Scalar("1.2.3".into()))];
    let first = compiler.compile::<Patient>(QueryRequest::new(make_pairs())).unwrap().sql(&dialect);
    let second = compiler.compile::<Patient>(QueryRequest::new(make_pairs())).unwrap().sql(&dialect);
    assert_eq!(first, second);
}
