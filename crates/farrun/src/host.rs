//! # Lazy Worker Lifecycle
//!
//! Decides when a remote context is created, reused, and torn down, driven
//! by the in-flight call count and a configured idle time-to-live.
//!
//! ## Invariants
//!
//! - `active` increments exactly once per call sent and decrements exactly
//!   once per settlement.
//! - A live instance exists whenever `active > 0`.
//! - An idle timer never fires against a context with calls in flight; a
//!   new call cancels the timer before it can win the race.
//!
//! Forced teardown (`terminate_now`) is the one exception: it abandons
//! in-flight calls, which then observe `CallError::Terminated`.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::Weak;
use std::time::Duration;

use farrpc::Value;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::agent::CallError;
use crate::agent::CallOptions;
use crate::agent::DEFAULT_NS;
use crate::agent::INTERNAL_NS;
use crate::agent::INTROSPECT_NAMES;
use crate::agent::RpcAgent;
use crate::worker::Worker;

/// How long an idle context is kept warm after its last call settles.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum IdleTtl {
    /// Terminate as soon as no calls are in flight.
    #[default]
    Immediate,
    /// Keep warm for this long, then terminate unless a call arrives first.
    After(Duration),
    /// Keep forever once created.
    Never,
}

/// Creates a fresh worker on demand.
pub type WorkerFactory = Arc<dyn Fn() -> Arc<dyn Worker> + Send + Sync>;

/// Where the remote context comes from.
pub enum WorkerSource {
    /// An already-running context, kept alive for the host's lifetime.
    Eager(Arc<dyn Worker>),
    /// A factory invoked on first call, with an idle TTL.
    Lazy { factory: WorkerFactory, ttl: IdleTtl },
}

struct Live {
    worker: Arc<dyn Worker>,
    agent: Arc<RpcAgent>,
}

#[derive(Default)]
struct HostState {
    live: Option<Live>,
    active: u64,
    /// Bumped per instance so a stale idle timer can never kill a successor.
    epoch: u64,
    idle_timer: Option<JoinHandle<()>>,
}

/// The lifecycle manager for one proxy binding.
pub struct WorkerHost {
    source: WorkerSource,
    state: Mutex<HostState>,
    weak: Weak<WorkerHost>,
}

impl WorkerHost {
    pub fn new(source: WorkerSource) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            source,
            state: Mutex::new(HostState::default()),
            weak: weak.clone(),
        })
    }

    /// Hosts an already-running worker; it is never idle-terminated.
    pub fn eager(worker: Arc<dyn Worker>) -> Arc<Self> {
        Self::new(WorkerSource::Eager(worker))
    }

    /// Hosts a lazily-created worker with the given idle TTL.
    pub fn lazy(factory: WorkerFactory, ttl: IdleTtl) -> Arc<Self> {
        Self::new(WorkerSource::Lazy { factory, ttl })
    }

    fn lock_state(&self) -> MutexGuard<'_, HostState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn ttl(&self) -> IdleTtl {
        match &self.source {
            WorkerSource::Eager(_) => IdleTtl::Never,
            WorkerSource::Lazy { ttl, .. } => *ttl,
        }
    }

    /// Ensures a live instance, cancels any pending idle teardown, and
    /// counts the call in.
    fn checkout(&self) -> Arc<RpcAgent> {
        let mut state = self.lock_state();

        if let Some(timer) = state.idle_timer.take() {
            timer.abort();
        }

        let agent = match &state.live {
            Some(live) => Arc::clone(&live.agent),
            None => {
                let worker = match &self.source {
                    WorkerSource::Eager(worker) => Arc::clone(worker),
                    WorkerSource::Lazy { factory, .. } => factory(),
                };
                let agent = RpcAgent::for_channel(worker.channel());
                debug!("remote context started");
                let handle = Arc::clone(&agent);
                state.live = Some(Live { worker, agent });
                state.epoch += 1;
                handle
            }
        };

        state.active += 1;
        agent
    }

    /// Counts the call out; at zero in-flight, applies the idle TTL.
    fn checkin(&self) {
        let mut state = self.lock_state();
        state.active = state.active.saturating_sub(1);
        if state.active > 0 {
            return;
        }

        match self.ttl() {
            IdleTtl::Never => {}
            IdleTtl::Immediate => Self::stop_live(&mut state),
            IdleTtl::After(delay) => {
                let epoch = state.epoch;
                let host = self.weak.clone();
                if let Some(timer) = state.idle_timer.take() {
                    timer.abort();
                }
                state.idle_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(host) = host.upgrade() {
                        host.idle_elapsed(epoch);
                    }
                }));
            }
        }
    }

    fn idle_elapsed(&self, epoch: u64) {
        let mut state = self.lock_state();
        // A call that raced in resets the clock; never tear down under load.
        if state.active == 0 && state.epoch == epoch {
            Self::stop_live(&mut state);
        }
    }

    fn stop_live(state: &mut HostState) {
        if let Some(live) = state.live.take() {
            live.worker.terminate();
            live.agent.shutdown();
            debug!("remote context terminated");
        }
    }

    /// Invokes `name` in `namespace` on the hosted worker.
    pub async fn call(
        &self,
        namespace: &str,
        name: &str,
        args: Vec<Value>,
        opts: CallOptions,
    ) -> Result<Value, CallError> {
        let agent = self.checkout();
        let result = agent.call_remote(namespace, name, args, opts).await;
        self.checkin();
        result
    }

    /// Invokes a function in the default namespace with default options.
    pub async fn call_fn(&self, name: &str, args: Vec<Value>) -> Result<Value, CallError> {
        self.call(DEFAULT_NS, name, args, CallOptions::default()).await
    }

    /// Lists the names registered on the worker in the given namespace,
    /// through the reserved introspection call.
    pub async fn inspect_namespace(&self, namespace: &str) -> Result<Vec<String>, CallError> {
        let ret = self
            .call(
                INTERNAL_NS,
                INTROSPECT_NAMES,
                vec![Value::text(namespace)],
                CallOptions::default(),
            )
            .await?;
        let names = ret
            .into_list()
            .unwrap_or_default()
            .into_iter()
            .filter_map(Value::into_text)
            .collect();
        Ok(names)
    }

    /// Lists the worker's names in the default namespace.
    pub async fn inspect(&self) -> Result<Vec<String>, CallError> {
        self.inspect_namespace(DEFAULT_NS).await
    }

    /// Explicit out-of-band teardown. In-flight calls are abandoned without
    /// being settled by the worker; they observe `CallError::Terminated`.
    pub fn terminate_now(&self) {
        let mut state = self.lock_state();
        if let Some(timer) = state.idle_timer.take() {
            timer.abort();
        }
        Self::stop_live(&mut state);
    }

    /// Calls currently in flight through this host.
    pub fn active_calls(&self) -> u64 {
        self.lock_state().active
    }

    /// Whether a remote context currently exists.
    pub fn is_live(&self) -> bool {
        self.lock_state().live.is_some()
    }
}
