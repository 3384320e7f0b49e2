//! # Workers
//!
//! An isolated execution context the engine can call into: something with a
//! channel and a kill switch. `TaskWorker` is the in-process rendering,
//! running its agent pump on a spawned task.

use std::sync::Arc;

use crate::agent;
use crate::agent::RpcAgent;
use crate::channel::Channel;
use crate::pipe::DuplexPipe;

/// A remote execution context.
pub trait Worker: Send + Sync + 'static {
    /// The near-side endpoint of the channel into the context.
    fn channel(&self) -> Arc<dyn Channel>;

    /// Tears the context down immediately. In-flight calls are abandoned
    /// without being settled.
    fn terminate(&self);
}

/// An in-process worker backed by a spawned agent over a duplex pipe.
pub struct TaskWorker {
    channel: Arc<dyn Channel>,
    agent: Arc<RpcAgent>,
}

impl TaskWorker {
    /// Spawns a worker. `setup` receives the worker-side agent to define
    /// its functions on.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn<F>(setup: F) -> agent::Result<TaskWorker>
    where
        F: FnOnce(&RpcAgent) -> agent::Result<()>,
    {
        let (near, far) = DuplexPipe::pair();
        let far: Arc<dyn Channel> = Arc::new(far);
        let agent = RpcAgent::bind(far)?;
        setup(&agent)?;
        Ok(TaskWorker { channel: Arc::new(near), agent })
    }

    /// The worker-side agent, for late definitions in tests and tools.
    pub fn agent(&self) -> &Arc<RpcAgent> {
        &self.agent
    }
}

impl Worker for TaskWorker {
    fn channel(&self) -> Arc<dyn Channel> {
        Arc::clone(&self.channel)
    }

    fn terminate(&self) {
        self.agent.shutdown();
    }
}
