//! Predicate-path parser: `name[guard]@cast.subpath`.

use std::sync::OnceLock;

use compact_str::CompactString;
use regex::Regex;

fn path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\w*?)(\[(.*?)\])?(@(\w*))?(\.(.*))?$").unwrap())
}

/// An immutable parsed predicate path: `path`, `guard`, `cast`, `sub_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicatePath {
    pub path: CompactString,
    pub guard: Option<CompactString>,
    pub cast: Option<CompactString>,
    pub sub_path: Option<CompactString>,
}

impl PredicatePath {
    /// Parses `s` against the grammar
    /// `^(\w*?)(\[(.*?)\])?(@(\w*))?(\.(.*))?$`. Returns `None` for no
    /// match — since the regex anchors both ends and every group is
    /// optional, this only happens for input the lazy quantifiers can't
    /// consume at all (unreachable for well-formed `&str` input in practice,
    /// kept so callers can still pattern-match on a `None` result).
    pub fn parse(s: &str) -> Option<PredicatePath> {
        let caps = path_regex().captures(s)?;
        let path = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let guard = caps.get(3).map(|m| CompactString::from(m.as_str()));
        let cast = caps.get(5).map(|m| CompactString::from(m.as_str()));
        let sub_path = caps.get(7).map(|m| CompactString::from(m.as_str()));
        Some(PredicatePath {
            path: path.into(),
            guard,
            cast,
            sub_path,
        })
    }

    /// Renders this path back to its `name[guard]@cast.subpath` form.
    pub fn to_path_string(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.path);
        if let Some(g) = &self.guard {
            out.push('[');
            out.push_str(g);
            out.push(']');
        }
        if let Some(c) = &self.cast {
            out.push('@');
            out.push_str(c);
        }
        if let Some(sp) = &self.sub_path {
            out.push('.');
            out.push_str(sp);
        }
        out
    }

    /// `(path, cast)` identity used to group predicate-list siblings that
    /// differ only by guard or sub-path.
    pub fn sibling_key(&self) -> (CompactString, Option<CompactString>) {
        (self.path.clone(), self.cast.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_four_groups() {
        let p = PredicatePath::parse("identifier[OID]@Patient.value").unwrap();
        assert_eq!(p.path, "identifier");
        assert_eq!(p.guard.as_deref(), Some("OID"));
        assert_eq!(p.cast.as_deref(), Some("Patient"));
        assert_eq!(p.sub_path.as_deref(), Some("value"));
    }

    #[test]
    fn parses_bare_name() {
        let p = PredicatePath::parse("mnemonic").unwrap();
        assert_eq!(p.path, "mnemonic");
        assert_eq!(p.guard, None);
        assert_eq!(p.cast, None);
        assert_eq!(p.sub_path, None);
    }

    #[test]
    fn round_trips_through_to_path_string() {
        for s in [
            "mnemonic",
            "identifier.value",
            "identifier[OID].value",
            "identifier[OID]@Patient.value",
            "identifier@Patient",
        ] {
            let parsed = PredicatePath::parse(s).unwrap();
            assert_eq!(parsed.to_path_string(), s);
        }
    }

    #[test]
    fn sibling_key_ignores_guard_and_sub_path() {
        let a = PredicatePath::parse("identifier[OID].value").unwrap();
        let b = PredicatePath::parse("identifier[LOINC].code").unwrap();
        assert_eq!(a.sibling_key(), b.sibling_key());
    }
}
