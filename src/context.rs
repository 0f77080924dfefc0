//! Service Context
//!
//! State shared by the lifecycle controller, the commit subscription and
//! every dispatcher worker: the action dispatcher itself and, once the
//! group is formed, the routing client.

use std::sync::{Arc, OnceLock};

use crate::dispatcher::{ActionDispatcher, OffCriticalHandler};
use crate::error::{Error, Result};
use crate::routing::ServiceClient;
use crate::types::{Action, NodeId};

/// Shared context handed to the off-critical-path handler
pub struct ServiceContext {
    node: NodeId,
    dispatcher: ActionDispatcher,
    client: OnceLock<Arc<ServiceClient>>,
}

impl ServiceContext {
    pub fn new(node: NodeId) -> Arc<Self> {
        Arc::new(Self {
            node,
            dispatcher: ActionDispatcher::new(),
            client: OnceLock::new(),
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// Install the routing client; allowed once
    pub(crate) fn set_client(&self, client: Arc<ServiceClient>) -> Result<()> {
        self.client
            .set(client)
            .map_err(|_| Error::Internal("service client already constructed".into()))
    }

    /// Routing client for further calls from application logic
    pub fn service_client(&self) -> Result<&ServiceClient> {
        self.client
            .get()
            .map(|client| client.as_ref())
            .ok_or_else(|| Error::Internal("service client not constructed yet".into()))
    }

    /// Start the worker pool; workers keep the context alive until `destroy`
    pub(crate) fn start_dispatcher(
        self: &Arc<Self>,
        pool_size: usize,
        thread_name: &str,
        handler: Arc<dyn OffCriticalHandler<ServiceContext>>,
    ) -> Result<()> {
        self.dispatcher
            .start(pool_size, thread_name, handler, Arc::clone(self))
    }

    /// Queue an action for the worker pool
    pub fn post(&self, action: Action) -> bool {
        self.dispatcher.post(action)
    }

    /// Like `post`, as a `Result`
    pub fn try_post(&self, action: Action) -> Result<()> {
        if self.dispatcher.post(action) {
            Ok(())
        } else {
            Err(Error::DispatcherClosed)
        }
    }

    pub fn pending_actions(&self) -> usize {
        self.dispatcher.pending()
    }

    pub fn dispatched_actions(&self) -> u64 {
        self.dispatcher.dequeued()
    }

    pub fn is_accepting(&self) -> bool {
        self.dispatcher.is_running()
    }

    /// Drain and stop the worker pool
    pub fn destroy(&self) {
        self.dispatcher.destroy();
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("node", &self.node)
            .field("pending_actions", &self.pending_actions())
            .field("has_client", &self.client.get().is_some())
            .finish()
    }
}
