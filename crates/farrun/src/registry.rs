//! # Function Registry
//!
//! The per-agent table of invocable functions, keyed by
//! `(namespace, name)`. One registration per key; redefinition fails
//! without mutating state. Names are listed in registration order.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use farrpc::Value;
use futures::future::BoxFuture;
use indexmap::IndexMap;

use crate::classify::TransferPolicy;

/// An invocable function. Failure payloads are opaque values, passed back
/// to the caller verbatim.
pub type FnObject =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, std::result::Result<Value, Value>> + Send + Sync>;

/// Adapts an async closure into a registrable function object.
pub fn wrap_fn<F, Fut>(f: F) -> FnObject
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Value, Value>> + Send + 'static,
{
    Arc::new(move |args| {
        let fut: BoxFuture<'static, std::result::Result<Value, Value>> = Box::pin(f(args));
        fut
    })
}

/// A registered function and its result hand-off policy.
#[derive(Clone)]
pub struct FnEntry {
    pub func: FnObject,
    pub transfer: TransferPolicy,
}

/// Registry failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    AlreadyDefined { namespace: String, name: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyDefined { namespace, name } => write!(
                f,
                "The name \"{}\" has already been defined in namespace \"{}\".",
                name, namespace
            ),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a registry lookup. The two not-found cases are distinct so
/// the agent can report them separately.
pub enum Lookup {
    Found(FnEntry),
    NamespaceNotDefined,
    NameNotDefined,
}

/// Namespace-partitioned function table.
#[derive(Default)]
pub struct FnRegistry {
    spaces: DashMap<String, IndexMap<String, FnEntry>>,
}

impl FnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an entry; fails if `(namespace, name)` is taken, leaving the
    /// first definition intact.
    pub fn define(
        &self,
        namespace: &str,
        name: &str,
        func: FnObject,
        transfer: TransferPolicy,
    ) -> Result<()> {
        let mut space = self.spaces.entry(namespace.to_string()).or_default();
        if space.contains_key(name) {
            return Err(Error::AlreadyDefined {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        space.insert(name.to_string(), FnEntry { func, transfer });
        Ok(())
    }

    pub fn lookup(&self, namespace: &str, name: &str) -> Lookup {
        match self.spaces.get(namespace) {
            None => Lookup::NamespaceNotDefined,
            Some(space) => match space.get(name) {
                Some(entry) => Lookup::Found(entry.clone()),
                None => Lookup::NameNotDefined,
            },
        }
    }

    /// All registered names in the namespace, in registration order.
    pub fn list_names(&self, namespace: &str) -> Vec<String> {
        self.spaces
            .get(namespace)
            .map(|space| space.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> FnObject {
        wrap_fn(|_args| async { Ok(Value::Null) })
    }

    #[test]
    fn test_define_and_lookup() {
        let registry = FnRegistry::new();
        registry.define("fn", "add", noop(), TransferPolicy::Auto).unwrap();

        assert!(matches!(registry.lookup("fn", "add"), Lookup::Found(_)));
        assert!(matches!(registry.lookup("fn", "sub"), Lookup::NameNotDefined));
        assert!(matches!(registry.lookup("other", "add"), Lookup::NamespaceNotDefined));
    }

    #[test]
    fn test_redefinition_fails_and_preserves_first() {
        let registry = FnRegistry::new();
        registry.define("fn", "add", noop(), TransferPolicy::Never).unwrap();

        let err = registry.define("fn", "add", noop(), TransferPolicy::Auto).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The name \"add\" has already been defined in namespace \"fn\"."
        );

        // The original entry is untouched.
        match registry.lookup("fn", "add") {
            Lookup::Found(entry) => assert_eq!(entry.transfer, TransferPolicy::Never),
            _ => panic!("Expected the first definition to survive"),
        }
    }

    #[test]
    fn test_list_names_in_registration_order() {
        let registry = FnRegistry::new();
        registry.define("fn", "zeta", noop(), TransferPolicy::Auto).unwrap();
        registry.define("fn", "alpha", noop(), TransferPolicy::Auto).unwrap();
        registry.define("fn", "mid", noop(), TransferPolicy::Auto).unwrap();

        assert_eq!(registry.list_names("fn"), vec!["zeta", "alpha", "mid"]);
        assert!(registry.list_names("empty").is_empty());
    }

    #[test]
    fn test_same_name_in_distinct_namespaces() {
        let registry = FnRegistry::new();
        registry.define("a", "add", noop(), TransferPolicy::Auto).unwrap();
        registry.define("b", "add", noop(), TransferPolicy::Auto).unwrap();

        assert!(matches!(registry.lookup("a", "add"), Lookup::Found(_)));
        assert!(matches!(registry.lookup("b", "add"), Lookup::Found(_)));
    }
}
