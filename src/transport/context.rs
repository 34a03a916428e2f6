//! Process-scoped socket context
//!
//! Every socket in `zmqpipe` is built from a `Context` handle that the caller
//! passes in explicitly. The context carries:
//! - the default `SocketOptions` (delivery policy, reconnect interval, channel
//!   capacity)
//! - the registry of endpoints claimed by push sockets of this process, so a
//!   second bind on the same endpoint fails before it ever reaches the OS
//!
//! Cloning a `Context` is cheap and yields another handle to the same state.
//! The state is torn down when the last handle is dropped.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::transport::endpoint::Endpoint;
use crate::utils::error::TransportError;

/// How an outbound push socket behaves when it sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Upper bound on a single `send`, including any wait for a peer.
    pub send_timeout: Duration,
    /// When true, a send with no connected peer waits for one until
    /// `send_timeout`; when false, the message is dropped immediately.
    pub require_peer_before_send: bool,
    /// How often to re-check for a peer while waiting.
    pub peer_poll_interval: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(5),
            require_peer_before_send: true,
            peer_poll_interval: Duration::from_millis(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketOptions {
    pub delivery: DeliveryPolicy,
    /// Pause between connection attempts of pull sockets.
    pub reconnect_interval: Duration,
    /// Capacity of the channels between pipeline sources and destinations.
    pub channel_capacity: usize,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            delivery: DeliveryPolicy::default(),
            reconnect_interval: Duration::from_millis(100),
            channel_capacity: 1024,
        }
    }
}

#[derive(Debug)]
struct ContextInner {
    id: Uuid,
    options: SocketOptions,
    claimed: Mutex<HashSet<Endpoint>>,
}

#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new(SocketOptions::default())
    }
}

impl Context {
    pub fn new(options: SocketOptions) -> Self {
        let id = Uuid::new_v4();
        debug!(context = %id, "socket context created");
        Self {
            inner: Arc::new(ContextInner {
                id,
                options,
                claimed: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn options(&self) -> &SocketOptions {
        &self.inner.options
    }

    /// Claim `endpoint` for an outbound socket of this process.
    ///
    /// The claim is released when the returned guard is dropped.
    pub fn claim(&self, endpoint: &Endpoint) -> Result<EndpointClaim, TransportError> {
        let mut claimed = self.registry();
        if !claimed.insert(endpoint.clone()) {
            return Err(TransportError::BindConflict {
                address: endpoint.to_string(),
                reason: "already claimed by a socket of this process".to_string(),
            });
        }
        debug!(context = %self.inner.id, endpoint = %endpoint, "endpoint claimed");
        Ok(EndpointClaim {
            context: self.clone(),
            endpoint: endpoint.clone(),
        })
    }

    pub fn is_claimed(&self, endpoint: &Endpoint) -> bool {
        self.registry().contains(endpoint)
    }

    fn release(&self, endpoint: &Endpoint) {
        if self.registry().remove(endpoint) {
            debug!(context = %self.inner.id, endpoint = %endpoint, "endpoint released");
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashSet<Endpoint>> {
        self.inner
            .claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Guard for an endpoint claimed through [`Context::claim`].
#[derive(Debug)]
pub struct EndpointClaim {
    context: Context,
    endpoint: Endpoint,
}

impl EndpointClaim {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl Drop for EndpointClaim {
    fn drop(&mut self) {
        self.context.release(&self.endpoint);
    }
}
