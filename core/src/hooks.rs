//! Rewrite-hook registry: a small ordered list of extensions
//! allowed to short-circuit predicate compilation for a given
//! `(type, property, predicate)` and append their own WHERE fragments.

use core::any::TypeId;

use crate::path::PredicatePath;
use crate::predicate::QueryValue;
use crate::schema::TableDescriptor;
use crate::sql::Sql;

/// Mutable compilation state a hook may read and extend. Hooks may append
/// to `where_clause` but never replace or reorder `select`. Modeled as a
/// `(handled, appended fragment)` return instead of mutation-by-reference.
pub struct HookContext<'a> {
    pub select: &'a Sql,
    pub where_clause: &'a Sql,
    pub model_type: TypeId,
    pub alias_prefix: &'a str,
    pub scoped_tables: &'a [&'a TableDescriptor],
}

/// Outcome of a hook's first-refusal check.
pub enum HookOutcome {
    /// The hook declined; default predicate emission should run.
    NotHandled,
    /// The hook claimed the predicate; `append` is ANDed into WHERE and no
    /// default emission runs for this `(path, value)`.
    Handled { append: Sql },
}

/// A single rewrite hook.
pub trait RewriteHook: Send + Sync {
    /// Attempts to claim `(property, predicate, value)` within `ctx`.
    fn hack_query(
        &self,
        ctx: &HookContext<'_>,
        property: &str,
        predicate: &PredicatePath,
        value: &QueryValue,
    ) -> HookOutcome;
}

/// An ordered list of hooks, consulted in registration order.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Box<dyn RewriteHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        HookRegistry { hooks: Vec::new() }
    }

    pub fn register(&mut self, hook: Box<dyn RewriteHook>) {
        self.hooks.push(hook);
    }

    /// Offers `(property, predicate, value)` to each hook in registration
    /// order, stopping at the first one that claims it.
    pub fn try_claim(
        &self,
        ctx: &HookContext<'_>,
        property: &str,
        predicate: &PredicatePath,
        value: &QueryValue,
    ) -> Option<Sql> {
        for hook in &self.hooks {
            if let HookOutcome::Handled { append } = hook.hack_query(ctx, property, predicate, value) {
                return Some(append);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::Token;

    struct AlwaysClaims;

    impl RewriteHook for AlwaysClaims {
        fn hack_query(
            &self,
            _ctx: &HookContext<'_>,
            _property: &str,
            _predicate: &PredicatePath,
            _value: &QueryValue,
        ) -> HookOutcome {
            HookOutcome::Handled {
                append: Sql::raw("1 = 1"),
            }
        }
    }

    struct NeverClaims;

    impl RewriteHook for NeverClaims {
        fn hack_query(
            &self,
            _ctx: &HookContext<'_>,
            _property: &str,
            _predicate: &PredicatePath,
            _value: &QueryValue,
        ) -> HookOutcome {
            HookOutcome::NotHandled
        }
    }

    #[test]
    fn first_registered_hook_to_claim_wins() {
        let mut registry = HookRegistry::new();
        registry.register(Box::new(NeverClaims));
        registry.register(Box::new(AlwaysClaims));

        let select = Sql::token(Token::Select);
        let where_clause = Sql::empty();
        let ctx = HookContext {
            select: &select,
            where_clause: &where_clause,
            model_type: TypeId::of::<()>(),
            alias_prefix: "",
            scoped_tables: &[],
        };
        let path = PredicatePath::parse("mnemonic").unwrap();
        let value = QueryValue::Scalar("Active".into());

        let claimed = registry.try_claim(&ctx, "mnemonic", &path, &value);
        assert!(claimed.is_some());
    }

    #[test]
    fn empty_registry_never_claims() {
        let registry = HookRegistry::new();
        let select = Sql::empty();
        let where_clause = Sql::empty();
        let ctx = HookContext {
            select: &select,
            where_clause: &where_clause,
            model_type: TypeId::of::<()>(),
            alias_prefix: "",
            scoped_tables: &[],
        };
        let path = PredicatePath::parse("mnemonic").unwrap();
        let value = QueryValue::Scalar("Active".into());
        assert!(registry.try_claim(&ctx, "mnemonic", &path, &value).is_none());
    }
}
