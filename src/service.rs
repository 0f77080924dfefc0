//! Service Lifecycle
//!
//! Owns the group membership, the action dispatcher and the monitor
//! thread. `Service::start` returns the handle; only one service may be
//! active in a process at a time.
//!
//! ```text
//! Running --stop()--> StopRequested --monitor: barrier, leave, drain--> Stopped
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::config::ShardlineConfig;
use crate::context::ServiceContext;
use crate::dispatcher::OffCriticalHandler;
use crate::error::Result;
use crate::layout::{plan, SubgroupInfo};
use crate::registry::TypeRegistry;
use crate::routing::ServiceClient;
use crate::substrate::{CommitCallback, GroupTransport};
use crate::types::NodeId;

static ACTIVE: AtomicBool = AtomicBool::new(false);

/// Claim on the process-wide service slot, released on drop
struct ActiveClaim;

impl ActiveClaim {
    fn acquire() -> Option<Self> {
        ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| ActiveClaim)
    }
}

impl Drop for ActiveClaim {
    fn drop(&mut self) {
        ACTIVE.store(false, Ordering::SeqCst);
    }
}

/// Lifecycle state of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Running,
    StopRequested,
    Stopped,
}

struct Lifecycle {
    state: Mutex<ServiceState>,
    changed: Condvar,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: Mutex::new(ServiceState::Running),
            changed: Condvar::new(),
        }
    }

    fn get(&self) -> ServiceState {
        *self.state.lock()
    }

    /// Returns `false` when a stop was already requested
    fn request_stop(&self) -> bool {
        let mut state = self.state.lock();
        if *state != ServiceState::Running {
            return false;
        }
        *state = ServiceState::StopRequested;
        self.changed.notify_all();
        true
    }

    fn wait_while(&self, current: ServiceState) {
        let mut state = self.state.lock();
        while *state == current {
            self.changed.wait(&mut state);
        }
    }

    fn wait_stopped(&self) {
        let mut state = self.state.lock();
        while *state != ServiceState::Stopped {
            self.changed.wait(&mut state);
        }
    }

    fn mark_stopped(&self) {
        *self.state.lock() = ServiceState::Stopped;
        self.changed.notify_all();
    }
}

/// Marks the lifecycle stopped when the monitor exits, panics included
struct StoppedOnExit(Arc<Lifecycle>);

impl Drop for StoppedOnExit {
    fn drop(&mut self) {
        self.0.mark_stopped();
    }
}

/// Handle to the running service
pub struct Service {
    lifecycle: Arc<Lifecycle>,
    context: Arc<ServiceContext>,
    client: Arc<ServiceClient>,
    info: SubgroupInfo,
    monitor: Mutex<Option<JoinHandle<()>>>,
    _claim: ActiveClaim,
}

impl Service {
    /// Start the service
    ///
    /// `join_group` forms group membership for the planned layout and gets
    /// the shared context for its store factories. Returns `Ok(None)` when
    /// another service is already active in this process.
    pub fn start<F>(
        config: &ShardlineConfig,
        registry: Arc<TypeRegistry>,
        handler: Arc<dyn OffCriticalHandler<ServiceContext>>,
        join_group: F,
    ) -> Result<Option<Service>>
    where
        F: FnOnce(&SubgroupInfo, Arc<ServiceContext>) -> Result<Arc<dyn GroupTransport>>,
    {
        let Some(claim) = ActiveClaim::acquire() else {
            tracing::warn!(node = config.node.id, "service already running, start ignored");
            return Ok(None);
        };

        config.validate()?;
        let default_policy = config.default_policy()?;
        let bindings = config.policy_bindings(&registry)?;
        let info = plan(&config.layout, &registry)?;

        let context = ServiceContext::new(config.node.id);
        let group = join_group(&info, Arc::clone(&context))?;

        let client = Arc::new(ServiceClient::member(
            Arc::clone(&group),
            registry,
            default_policy,
        ));
        for (key, policy, node) in bindings {
            client.set_policy(key, policy, node);
        }

        match Self::launch(config, &context, &client, group.clone(), handler) {
            Ok(monitor) => {
                tracing::info!(
                    node = config.node.id,
                    members = group.members().len(),
                    "service started"
                );
                Ok(Some(Service {
                    lifecycle: monitor.0,
                    context,
                    client,
                    info,
                    monitor: Mutex::new(Some(monitor.1)),
                    _claim: claim,
                }))
            }
            Err(e) => {
                tracing::error!(error = %e, "service failed to start");
                if let Err(leave) = group.leave() {
                    tracing::warn!(error = %leave, "leave after failed start");
                }
                context.destroy();
                Err(e)
            }
        }
    }

    fn launch(
        config: &ShardlineConfig,
        context: &Arc<ServiceContext>,
        client: &Arc<ServiceClient>,
        group: Arc<dyn GroupTransport>,
        handler: Arc<dyn OffCriticalHandler<ServiceContext>>,
    ) -> Result<(Arc<Lifecycle>, JoinHandle<()>)> {
        context.set_client(Arc::clone(client))?;
        context.start_dispatcher(config.pool_size(), &config.node.thread_name, handler)?;

        let weak = Arc::downgrade(context);
        let on_commit: CommitCallback = Arc::new(move |action| {
            if let Some(context) = weak.upgrade() {
                context.post(action);
            }
        });
        group.subscribe_local_commit(on_commit);

        let lifecycle = Arc::new(Lifecycle::new());
        let monitor = {
            let lifecycle = Arc::clone(&lifecycle);
            let context = Arc::clone(context);
            std::thread::Builder::new()
                .name(format!("{}-monitor", config.node.thread_name))
                .spawn(move || monitor_loop(lifecycle, group, context))?
        };
        Ok((lifecycle, monitor))
    }

    /// Request a stop; with `join` also wait for the monitor to finish
    pub fn stop(&self, join: bool) {
        if self.lifecycle.request_stop() {
            tracing::info!(node = self.context.node_id(), "service stop requested");
        }
        if join {
            self.join();
        }
    }

    /// Wait until the service has stopped, without requesting a stop
    pub fn join(&self) {
        self.lifecycle.wait_stopped();
        if let Some(handle) = self.monitor.lock().take() {
            if handle.join().is_err() {
                tracing::error!("service monitor thread panicked");
            }
        }
    }

    /// Whether no stop has been requested yet
    pub fn is_running(&self) -> bool {
        self.lifecycle.get() == ServiceState::Running
    }

    pub fn state(&self) -> ServiceState {
        self.lifecycle.get()
    }

    /// Routing client of this node
    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    pub fn context(&self) -> &Arc<ServiceContext> {
        &self.context
    }

    pub fn info(&self) -> &SubgroupInfo {
        &self.info
    }

    pub fn node_id(&self) -> NodeId {
        self.context.node_id()
    }

    /// Whether any service is active in this process
    pub fn is_active() -> bool {
        ACTIVE.load(Ordering::SeqCst)
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.stop(true);
    }
}

fn monitor_loop(lifecycle: Arc<Lifecycle>, group: Arc<dyn GroupTransport>, context: Arc<ServiceContext>) {
    let _stopped = StoppedOnExit(Arc::clone(&lifecycle));
    lifecycle.wait_while(ServiceState::Running);

    let node = context.node_id();
    tracing::info!(node, "service shutting down");

    if let Err(e) = group.barrier_sync() {
        tracing::warn!(node, error = %e, "shutdown barrier failed, leaving anyway");
    }
    if let Ok(client) = context.service_client() {
        client.close();
    }
    if let Err(e) = group.leave() {
        tracing::warn!(node, error = %e, "leave failed");
    }

    let pending = context.pending_actions();
    context.destroy();
    tracing::info!(node, drained = pending, "service stopped");
}
