//! # Worker Proxies
//!
//! Caller-side stand-ins for remote functions. `WorkerProxy` materializes
//! the remote name set once through the reserved introspection call and
//! hands out `ProxyFn` accessors; there is no interception of arbitrary
//! lookups.

use std::sync::Arc;

use farrpc::Value;

use crate::agent::CallError;
use crate::agent::CallOptions;
use crate::agent::DEFAULT_NS;
use crate::host::WorkerHost;

/// A callable stand-in for one remote function. Invoking it issues a call
/// through the host, so lifecycle counting still applies.
#[derive(Clone)]
pub struct ProxyFn {
    host: Arc<WorkerHost>,
    namespace: String,
    name: String,
    opts: CallOptions,
}

impl ProxyFn {
    /// Plain lookup constructor: a proxy for `name` in the default
    /// namespace, with no inspection round-trip.
    pub fn new(host: Arc<WorkerHost>, name: impl Into<String>) -> Self {
        Self::with_namespace(host, DEFAULT_NS, name)
    }

    pub fn with_namespace(
        host: Arc<WorkerHost>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            host,
            namespace: namespace.into(),
            name: name.into(),
            opts: CallOptions::default(),
        }
    }

    /// Replaces the per-call options (transfer policy or selector).
    pub fn with_options(mut self, opts: CallOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn call(&self, args: Vec<Value>) -> Result<Value, CallError> {
        self.host
            .call(&self.namespace, &self.name, args, self.opts.clone())
            .await
    }
}

/// The remote name set of one namespace, materialized once.
pub struct WorkerProxy {
    host: Arc<WorkerHost>,
    namespace: String,
    names: Vec<String>,
}

impl WorkerProxy {
    /// Inspects the worker's default namespace and builds the accessor set.
    pub async fn inspect(host: &Arc<WorkerHost>) -> Result<Self, CallError> {
        Self::inspect_namespace(host, DEFAULT_NS).await
    }

    pub async fn inspect_namespace(
        host: &Arc<WorkerHost>,
        namespace: &str,
    ) -> Result<Self, CallError> {
        let names = host.inspect_namespace(namespace).await?;
        Ok(Self {
            host: Arc::clone(host),
            namespace: namespace.to_string(),
            names,
        })
    }

    /// The known remote names, in the worker's registration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// An accessor for a known remote name; `None` if the worker did not
    /// list it.
    pub fn get(&self, name: &str) -> Option<ProxyFn> {
        if !self.names.iter().any(|n| n == name) {
            return None;
        }
        Some(ProxyFn::with_namespace(
            Arc::clone(&self.host),
            self.namespace.clone(),
            name,
        ))
    }
}
