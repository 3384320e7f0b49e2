//! # RPC Agent
//!
//! The orchestrator: one agent bound to exactly one channel. Sends calls,
//! receives calls and dispatches them to the local registry, receives
//! returns and settles them through the call tracker.
//!
//! ## Architecture
//!
//! - **Binding Table**: channels map one-to-one to agents through an
//!   identity-keyed table; the channel object itself is never mutated.
//! - **Pump Task**: a spawned task drains the channel and routes frames.
//!   Each inbound call runs on its own task so a slow callee never stalls
//!   correlation of other replies.
//! - **Key Generation**: a monotonically increasing per-agent counter, so
//!   keys can never collide among outstanding calls.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::OnceLock;
use std::sync::Weak;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use farrpc::CallFrame;
use farrpc::Frame;
use farrpc::ReturnFrame;
use farrpc::TransferList;
use farrpc::Value;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

use crate::channel;
use crate::channel::Channel;
use crate::channel::ChannelAdapter;
use crate::classify::Classifier;
use crate::classify::TransferPolicy;
use crate::classify::TransferSelector;
use crate::registry;
use crate::registry::FnObject;
use crate::registry::FnRegistry;
use crate::registry::Lookup;
use crate::registry::wrap_fn;
use crate::tracker::CallTracker;

/// Default namespace for user-defined functions.
pub const DEFAULT_NS: &str = "fn";

/// Namespace reserved for the engine's own bookkeeping functions. User
/// definitions may never target it, so user names cannot shadow it.
pub const INTERNAL_NS: &str = "farcall";

/// The reserved introspection function: lists registered names.
pub(crate) const INTROSPECT_NAMES: &str = "names";

/// Definition- and binding-time failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    AlreadyDefined { namespace: String, name: String },
    ReservedNamespace(String),
    ChannelAlreadyBound,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyDefined { namespace, name } => write!(
                f,
                "The name \"{}\" has already been defined in namespace \"{}\".",
                name, namespace
            ),
            Self::ReservedNamespace(namespace) => write!(
                f,
                "The namespace \"{}\" is reserved for engine bookkeeping.",
                namespace
            ),
            Self::ChannelAlreadyBound => write!(
                f,
                "The channel has already been bound by another RpcAgent instance, \
                 invoke `RpcAgent::for_channel` to get that instance instead."
            ),
        }
    }
}

impl std::error::Error for Error {}

impl From<registry::Error> for Error {
    fn from(e: registry::Error) -> Self {
        match e {
            registry::Error::AlreadyDefined { namespace, name } => {
                Self::AlreadyDefined { namespace, name }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The callee's failure payload, carried verbatim as the underlying cause.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFault {
    payload: Value,
}

impl RemoteFault {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

impl std::fmt::Display for RemoteFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.payload {
            Value::Text(text) => f.write_str(text),
            other => write!(f, "{}", other),
        }
    }
}

impl std::error::Error for RemoteFault {}

/// Failures surfaced to a caller awaiting a remote call.
#[derive(Debug)]
pub enum CallError {
    /// The callee failed (or the name/namespace was not defined there). The
    /// original failure payload is preserved as the cause.
    Failed { name: String, fault: RemoteFault },
    /// The remote context was torn down while the call was in flight.
    Terminated { name: String },
    /// The call never reached the peer.
    Channel { name: String, source: channel::Error },
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed { name, .. } => {
                write!(f, "The worker function \"{}\" throws an exception.", name)
            }
            Self::Terminated { name } => write!(
                f,
                "The call \"{}\" was abandoned because the remote context was terminated.",
                name
            ),
            Self::Channel { name, source } => {
                write!(f, "Failed to send the call \"{}\": {}", name, source)
            }
        }
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Failed { fault, .. } => Some(fault),
            Self::Channel { source, .. } => Some(source),
            Self::Terminated { .. } => None,
        }
    }
}

/// Per-call options on the caller side.
#[derive(Clone, Default)]
pub struct CallOptions {
    /// Hand-off policy for the arguments.
    pub transfer: TransferPolicy,
    /// Explicit transfer selector; wins over `transfer` when present.
    pub selector: Option<TransferSelector>,
}

impl CallOptions {
    pub fn never_transfer() -> Self {
        Self { transfer: TransferPolicy::Never, selector: None }
    }

    pub fn transfer_all() -> Self {
        Self { transfer: TransferPolicy::All, selector: None }
    }

    pub fn with_selector(selector: TransferSelector) -> Self {
        Self { transfer: TransferPolicy::Auto, selector: Some(selector) }
    }
}

/// The process-wide binding table: channel identity to its single agent.
static BINDINGS: OnceLock<DashMap<usize, Weak<RpcAgent>>> = OnceLock::new();

fn bindings() -> &'static DashMap<usize, Weak<RpcAgent>> {
    BINDINGS.get_or_init(DashMap::new)
}

fn channel_key(channel: &Arc<dyn Channel>) -> usize {
    Arc::as_ptr(channel) as *const () as usize
}

/// RPC orchestrator for one channel.
///
/// Must be created inside a tokio runtime; the inbound pump runs as a
/// spawned task for the agent's lifetime.
pub struct RpcAgent {
    adapter: ChannelAdapter,
    classifier: Classifier,
    registry: Arc<FnRegistry>,
    tracker: Arc<CallTracker>,
    key_gen: AtomicU64,
    pump: Mutex<Option<JoinHandle<()>>>,
    channel_key: usize,
}

impl RpcAgent {
    /// Binds a fresh agent to the channel.
    ///
    /// Fails with `ChannelAlreadyBound` if a live agent already owns it.
    pub fn bind(channel: Arc<dyn Channel>) -> Result<Arc<RpcAgent>> {
        let key = channel_key(&channel);
        match bindings().entry(key) {
            Entry::Occupied(mut entry) => {
                if entry.get().upgrade().is_some() {
                    return Err(Error::ChannelAlreadyBound);
                }
                // The previous agent is gone; the slot is stale.
                let agent = Self::start(channel, key);
                entry.insert(Arc::downgrade(&agent));
                Ok(agent)
            }
            Entry::Vacant(entry) => {
                let agent = Self::start(channel, key);
                entry.insert(Arc::downgrade(&agent));
                Ok(agent)
            }
        }
    }

    /// Returns the agent already bound to the channel, or binds a new one.
    pub fn for_channel(channel: Arc<dyn Channel>) -> Arc<RpcAgent> {
        let key = channel_key(&channel);
        match bindings().entry(key) {
            Entry::Occupied(mut entry) => match entry.get().upgrade() {
                Some(agent) => agent,
                None => {
                    let agent = Self::start(channel, key);
                    entry.insert(Arc::downgrade(&agent));
                    agent
                }
            },
            Entry::Vacant(entry) => {
                let agent = Self::start(channel, key);
                entry.insert(Arc::downgrade(&agent));
                agent
            }
        }
    }

    fn start(channel: Arc<dyn Channel>, key: usize) -> Arc<RpcAgent> {
        let classifier = Classifier::probe(channel.as_ref());
        let adapter = ChannelAdapter::new(channel);
        let registry = Arc::new(FnRegistry::new());
        let tracker = Arc::new(CallTracker::new());

        define_internal(&registry);

        let agent = Arc::new(RpcAgent {
            adapter: adapter.clone(),
            classifier: classifier.clone(),
            registry: Arc::clone(&registry),
            tracker: Arc::clone(&tracker),
            key_gen: AtomicU64::new(1),
            pump: Mutex::new(None),
            channel_key: key,
        });

        let pump = tokio::spawn(pump_loop(adapter, registry, tracker, classifier));
        *agent.lock_pump() = Some(pump);
        debug!("rpc agent bound to channel");
        agent
    }

    fn lock_pump(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.pump.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Defines a local function the peer can invoke.
    pub fn define(
        &self,
        namespace: &str,
        name: &str,
        func: FnObject,
        transfer: TransferPolicy,
    ) -> Result<()> {
        if namespace == INTERNAL_NS {
            return Err(Error::ReservedNamespace(namespace.to_string()));
        }
        self.registry.define(namespace, name, func, transfer)?;
        Ok(())
    }

    /// Defines several functions under one namespace and policy.
    pub fn define_fns(
        &self,
        namespace: &str,
        fns: Vec<(&str, FnObject)>,
        transfer: TransferPolicy,
    ) -> Result<()> {
        for (name, func) in fns {
            self.define(namespace, name, func, transfer)?;
        }
        Ok(())
    }

    /// Locally registered names in the namespace, registration order.
    pub fn list_names(&self, namespace: &str) -> Vec<String> {
        self.registry.list_names(namespace)
    }

    /// Calls in flight on this agent, for diagnostics.
    pub fn outstanding_calls(&self) -> usize {
        self.tracker.outstanding()
    }

    /// Invokes `name` in `namespace` on the peer.
    ///
    /// Never blocks the caller; the returned future settles when the
    /// matching return frame is observed, regardless of completion order
    /// across concurrent calls.
    pub async fn call_remote(
        &self,
        namespace: &str,
        name: &str,
        args: Vec<Value>,
        opts: CallOptions,
    ) -> std::result::Result<Value, CallError> {
        let key = self.key_gen.fetch_add(1, Ordering::Relaxed);
        let rx = self.tracker.track(namespace, key);

        let transfers = match &opts.selector {
            Some(selector) => selector(&args),
            None => self.classifier.select(opts.transfer, &args),
        };

        let frame = Frame::Call(CallFrame {
            namespace: namespace.to_string(),
            name: name.to_string(),
            key,
            args,
        });

        if let Err(source) = self.adapter.send_frame(frame, &transfers).await {
            self.tracker.abandon(namespace, key);
            return Err(CallError::Channel { name: name.to_string(), source });
        }

        match rx.await {
            Ok(Ok(ret)) => Ok(ret),
            Ok(Err(payload)) => Err(CallError::Failed {
                name: name.to_string(),
                fault: RemoteFault::new(payload),
            }),
            Err(_) => Err(CallError::Terminated { name: name.to_string() }),
        }
    }

    /// Stops the pump, fails outstanding calls, and releases the channel
    /// binding. Idempotent.
    pub fn shutdown(&self) {
        let handle = self.lock_pump().take();
        if let Some(handle) = handle {
            handle.abort();
            self.tracker.abandon_all();
            bindings().remove(&self.channel_key);
            debug!("rpc agent unbound from channel");
        }
    }
}

impl Drop for RpcAgent {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Registers the engine's bookkeeping functions on a fresh registry.
fn define_internal(registry: &Arc<FnRegistry>) {
    let reg = Arc::clone(registry);
    let names = wrap_fn(move |args: Vec<Value>| {
        let reg = Arc::clone(&reg);
        async move {
            let namespace = args
                .first()
                .and_then(|arg| arg.as_text())
                .unwrap_or(DEFAULT_NS)
                .to_string();
            let names = reg.list_names(&namespace).into_iter().map(Value::Text).collect();
            Ok(Value::List(names))
        }
    });

    // The registry was created just above; the reserved key cannot be taken.
    if registry.define(INTERNAL_NS, INTROSPECT_NAMES, names, TransferPolicy::Never).is_err() {
        warn!("reserved namespace already populated, skipping bookkeeping fns");
    }
}

/// Drains the channel for the agent's lifetime.
async fn pump_loop(
    adapter: ChannelAdapter,
    registry: Arc<FnRegistry>,
    tracker: Arc<CallTracker>,
    classifier: Classifier,
) {
    while let Some(frame) = adapter.next_frame().await {
        match frame {
            Frame::Call(call) => {
                let adapter = adapter.clone();
                let registry = Arc::clone(&registry);
                let classifier = classifier.clone();
                tokio::spawn(async move {
                    handle_call(adapter, registry, classifier, call).await;
                });
            }
            Frame::Return(ret) => {
                tracker.settle(&ret.namespace, ret.key, ret.outcome);
            }
        }
    }
    // The peer is gone; nothing can settle the remaining calls.
    tracker.abandon_all();
    debug!("channel closed, rpc pump exiting");
}

/// Executes one inbound call and sends the return frame.
///
/// The three outcomes (namespace unknown, name unknown, executed) are
/// mutually exclusive and all terminate in exactly one return frame.
async fn handle_call(
    adapter: ChannelAdapter,
    registry: Arc<FnRegistry>,
    classifier: Classifier,
    call: CallFrame,
) {
    let CallFrame { namespace, name, key, args } = call;

    let outcome = match registry.lookup(&namespace, &name) {
        Lookup::NamespaceNotDefined => Err(Value::text(format!(
            "The namespace \"{}\" is not defined.",
            namespace
        ))),
        Lookup::NameNotDefined => Err(Value::text(format!(
            "The name \"{}\" is not defined in namespace \"{}\".",
            name, namespace
        ))),
        Lookup::Found(entry) => match (entry.func)(args).await {
            Ok(ret) => Ok((ret, entry.transfer)),
            Err(payload) => Err(payload),
        },
    };

    let (outcome, transfers) = match outcome {
        Ok((ret, policy)) => {
            let transfers = classifier.select(policy, std::slice::from_ref(&ret));
            (Ok(ret), transfers)
        }
        Err(payload) => (Err(payload), TransferList::new()),
    };

    let reply = Frame::Return(ReturnFrame {
        namespace,
        name: name.clone(),
        key,
        outcome,
    });

    if let Err(e) = adapter.send_frame(reply, &transfers).await {
        warn!("failed to send return for \"{}\": {}", name, e);
    }
}
