//! Query-expression lowerer: a builder tree standing in for the
//! typed predicate-tree reflection a host language with expression trees
//! would consume. Rust has no such reflection, so callers build a
//! [`Predicate`] directly; [`Predicate::lower`] produces the same flat
//! `(path, value)` list the compiler would otherwise get from walking an
//! AST.

use compact_str::CompactString;

/// A member-access path under construction, e.g. `identifier.value`.
/// Chained [`PathExpr::member`] calls concatenate with `.`.
#[derive(Debug, Clone)]
pub struct PathExpr(CompactString);

impl PathExpr {
    pub fn new(name: impl Into<CompactString>) -> Self {
        PathExpr(name.into())
    }

    pub fn member(self, name: &str) -> Self {
        PathExpr(format!("{}.{}", self.0, name).into())
    }

    pub fn eq(self, value: impl Into<CompactString>) -> Predicate {
        Predicate::Compare {
            path: self.0,
            encoded: value.into(),
        }
    }

    pub fn ne(self, value: impl Into<CompactString>) -> Predicate {
        Predicate::Compare {
            path: self.0,
            encoded: format!("!{}", value.into()).into(),
        }
    }

    pub fn lt(self, value: impl Into<CompactString>) -> Predicate {
        Predicate::Compare {
            path: self.0,
            encoded: format!("<{}", value.into()).into(),
        }
    }

    pub fn le(self, value: impl Into<CompactString>) -> Predicate {
        Predicate::Compare {
            path: self.0,
            encoded: format!("<={}", value.into()).into(),
        }
    }

    pub fn gt(self, value: impl Into<CompactString>) -> Predicate {
        Predicate::Compare {
            path: self.0,
            encoded: format!(">{}", value.into()).into(),
        }
    }

    pub fn ge(self, value: impl Into<CompactString>) -> Predicate {
        Predicate::Compare {
            path: self.0,
            encoded: format!(">={}", value.into()).into(),
        }
    }

    /// Substring match (`~v`), case-insensitive. `%`-wildcards are left as
    /// given; callers that want exact substring semantics pass a bare value
    /// and let the compiler wrap it in `%...%`.
    pub fn contains(self, value: impl Into<CompactString>) -> Predicate {
        Predicate::Compare {
            path: self.0,
            encoded: format!("~{}", value.into()).into(),
        }
    }

    /// Prefix match (`^v`), case-insensitive.
    pub fn starts_with(self, value: impl Into<CompactString>) -> Predicate {
        Predicate::Compare {
            path: self.0,
            encoded: format!("^{}", value.into()).into(),
        }
    }

    pub fn is_null(self) -> Predicate {
        Predicate::Compare {
            path: self.0,
            encoded: "null".into(),
        }
    }

    pub fn is_not_null(self) -> Predicate {
        Predicate::Compare {
            path: self.0,
            encoded: "!null".into(),
        }
    }

    /// `self` names the
    /// collection-valued path; `values` lowers to a list-valued entry
    /// rather than one entry per value.
    pub fn contains_any(self, values: impl IntoIterator<Item = impl Into<CompactString>>) -> Predicate {
        Predicate::ContainsList {
            path: self.0,
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// A query value lowered from a [`Predicate`] leaf: either one
/// operator-prefixed scalar or a list (OR semantics across the list).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Scalar(CompactString),
    List(Vec<CompactString>),
}

/// A predicate-tree node.
///
/// `And`/`Or` both flatten to a flat sequence of `(path, value)` pairs on
/// [`lower`](Predicate::lower) — the real AND/OR combination semantics live
/// in the operator-prefix table the compiler applies to same-path siblings,
/// not in this tree's shape. Keeping both combinators in the
/// builder API mirrors the shape callers expect from a typed expression
/// tree, even though the lowering step doesn't distinguish them.
#[derive(Debug, Clone)]
pub enum Predicate {
    Compare {
        path: CompactString,
        encoded: CompactString,
    },
    ContainsList {
        path: CompactString,
        values: Vec<CompactString>,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Predicate {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    /// Flattens this tree into the ordered `(path, value)` list
    /// handed to the compiler, preserving left-to-right input order for a
    /// deterministic result.
    pub fn lower(self) -> Vec<(String, QueryValue)> {
        let mut out = Vec::new();
        Self::lower_into(self, &mut out);
        out
    }

    fn lower_into(node: Predicate, out: &mut Vec<(String, QueryValue)>) {
        match node {
            Predicate::Compare { path, encoded } => {
                out.push((path.into(), QueryValue::Scalar(encoded)));
            }
            Predicate::ContainsList { path, values } => {
                out.push((path.into(), QueryValue::List(values)));
            }
            Predicate::And(a, b) | Predicate::Or(a, b) => {
                Self::lower_into(*a, out);
                Self::lower_into(*b, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_chain_joins_with_dot() {
        let p = PathExpr::new("identifier").member("value").eq("123");
        match p {
            Predicate::Compare { path, encoded } => {
                assert_eq!(path, "identifier.value");
                assert_eq!(encoded, "123");
            }
            _ => panic!("expected Compare"),
        }
    }

    #[test]
    fn range_and_lowers_to_two_entries() {
        let tree = PathExpr::new("value")
            .ge("5")
            .and(PathExpr::new("value").lt("10"));
        let pairs = tree.lower();
        assert_eq!(
            pairs,
            vec![
                ("value".to_string(), QueryValue::Scalar(">=5".into())),
                ("value".to_string(), QueryValue::Scalar("<10".into())),
            ]
        );
    }

    #[test]
    fn or_of_equalities_preserves_order() {
        let tree = PathExpr::new("mnemonic")
            .eq("A")
            .or(PathExpr::new("mnemonic").eq("B"));
        let pairs = tree.lower();
        assert_eq!(
            pairs,
            vec![
                ("mnemonic".to_string(), QueryValue::Scalar("A".into())),
                ("mnemonic".to_string(), QueryValue::Scalar("B".into())),
            ]
        );
    }

    #[test]
    fn contains_any_lowers_to_list_value() {
        let tree = PathExpr::new("tags").contains_any(["a", "b", "c"]);
        let pairs = tree.lower();
        assert_eq!(pairs.len(), 1);
        match &pairs[0].1 {
            QueryValue::List(values) => assert_eq!(values.len(), 3),
            _ => panic!("expected List"),
        }
    }

    #[test]
    fn null_checks_encode_to_prefix_table() {
        assert!(matches!(
            PathExpr::new("obsoletionTime").is_null(),
            Predicate::Compare { encoded, .. } if encoded == "null"
        ));
        assert!(matches!(
            PathExpr::new("obsoletionTime").is_not_null(),
            Predicate::Compare { encoded, .. } if encoded == "!null"
        ));
    }
}
