//! Bounded push socket
//!
//! Wraps a ZeroMQ PUSH socket with the explicit delivery contract:
//! - `bind` claims the endpoint through the `Context` first, then asks the OS;
//!   either refusal is a `BindConflict`
//! - `send` never waits longer than `DeliveryPolicy::send_timeout`
//! - with no connected peer the message is either dropped (`SendOutcome::Dropped`)
//!   or the send waits for a peer, depending on `require_peer_before_send`
//!
//! The socket itself lives in a writer task. A caller that gives up on a send
//! only stops waiting: a message already handed to the socket is still written,
//! and the peer stays usable for the next send.

use std::io::ErrorKind;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zeromq::{Socket, SocketSend, ZmqError, ZmqMessage};

use crate::transport::context::{Context, DeliveryPolicy, EndpointClaim};
use crate::transport::endpoint::Endpoint;
use crate::transport::message::Message;
use crate::utils::error::TransportError;

/// Result of a send that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to a connected peer.
    Delivered,
    /// No peer was connected and the policy allows dropping.
    Dropped,
}

/// What the writer task made of one request.
enum Attempt {
    Sent,
    NoPeer,
    Failed(String),
}

struct SendRequest {
    payload: Vec<u8>,
    reply: oneshot::Sender<Attempt>,
}

pub struct PushSocket {
    requests: mpsc::Sender<SendRequest>,
    writer: JoinHandle<()>,
    endpoint: Endpoint,
    policy: DeliveryPolicy,
}

impl PushSocket {
    /// Bind with the context's default delivery policy.
    pub async fn bind(ctx: &Context, address: &str) -> Result<Self, TransportError> {
        Self::bind_with_policy(ctx, address, ctx.options().delivery).await
    }

    pub async fn bind_with_policy(
        ctx: &Context,
        address: &str,
        policy: DeliveryPolicy,
    ) -> Result<Self, TransportError> {
        let requested = Endpoint::parse(address)?;

        // Ephemeral ports are claimed once the OS has picked one.
        let early_claim = if requested.is_ephemeral() {
            None
        } else {
            Some(ctx.claim(&requested)?)
        };

        let mut socket = zeromq::PushSocket::new();
        let bound = socket
            .bind(&requested.bind_address())
            .await
            .map_err(|e| bind_error(&requested, e))?;

        let (endpoint, claim) = match early_claim {
            Some(claim) => (requested, claim),
            None => {
                let resolved = Endpoint::parse(&bound.to_string())?;
                let claim = ctx.claim(&resolved)?;
                (resolved, claim)
            }
        };

        info!(endpoint = %endpoint, "push socket bound");

        let (requests, inbox) = mpsc::channel(1);
        let writer = tokio::spawn(write_loop(socket, inbox, endpoint.clone(), claim));

        Ok(Self {
            requests,
            writer,
            endpoint,
            policy,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub async fn send(&mut self, message: &Message) -> Result<SendOutcome, TransportError> {
        let payload = message.encode()?;
        self.send_bytes(payload).await
    }

    pub async fn send_bytes(&mut self, payload: Vec<u8>) -> Result<SendOutcome, TransportError> {
        let policy = self.policy;
        let address = self.endpoint.to_string();
        let requests = &self.requests;
        let mut waiting_for_peer = false;

        let attempt = tokio::time::timeout(policy.send_timeout, async {
            loop {
                waiting_for_peer = false;
                let (reply, answer) = oneshot::channel();
                let request = SendRequest {
                    payload: payload.clone(),
                    reply,
                };
                let outcome = match requests.send(request).await {
                    Ok(()) => answer.await.ok(),
                    Err(_) => None,
                };
                match outcome {
                    Some(Attempt::Sent) => return Ok(SendOutcome::Delivered),
                    Some(Attempt::NoPeer) if policy.require_peer_before_send => {
                        waiting_for_peer = true;
                        tokio::time::sleep(policy.peer_poll_interval).await;
                    }
                    Some(Attempt::NoPeer) => return Ok(SendOutcome::Dropped),
                    Some(Attempt::Failed(reason)) => {
                        return Err(TransportError::Socket {
                            address: address.clone(),
                            reason,
                        });
                    }
                    None => {
                        return Err(TransportError::Socket {
                            address: address.clone(),
                            reason: "socket writer stopped".to_string(),
                        });
                    }
                }
            }
        })
        .await;

        match attempt {
            Ok(Ok(SendOutcome::Dropped)) => {
                warn!(endpoint = %address, "no peer connected, message dropped");
                Ok(SendOutcome::Dropped)
            }
            Ok(result) => result,
            Err(_) if waiting_for_peer => Err(TransportError::PeerUnavailable {
                address,
                waited: policy.send_timeout,
            }),
            Err(_) => Err(TransportError::DeliveryTimeout {
                address,
                timeout: policy.send_timeout,
            }),
        }
    }

    /// Close the socket and release the endpoint claim.
    ///
    /// A write stuck on a peer that stopped reading is abandoned after the send
    /// timeout.
    pub async fn close(self) {
        let Self {
            requests,
            mut writer,
            endpoint,
            policy,
        } = self;
        drop(requests);

        let grace = policy.send_timeout.max(Duration::from_millis(100));
        if tokio::time::timeout(grace, &mut writer).await.is_err() {
            warn!(endpoint = %endpoint, "pending write abandoned on close");
            writer.abort();
        }
        debug!(endpoint = %endpoint, "push socket closed");
    }
}

async fn write_loop(
    mut socket: zeromq::PushSocket,
    mut inbox: mpsc::Receiver<SendRequest>,
    endpoint: Endpoint,
    _claim: EndpointClaim,
) {
    while let Some(request) = inbox.recv().await {
        // the caller already timed out; do not deliver behind its back
        if request.reply.is_closed() {
            debug!(endpoint = %endpoint, "skipping abandoned send");
            continue;
        }
        let attempt = match socket.send(ZmqMessage::from(request.payload)).await {
            Ok(()) => Attempt::Sent,
            Err(ZmqError::ReturnToSender { .. }) => Attempt::NoPeer,
            Err(e) => Attempt::Failed(e.to_string()),
        };
        let _ = request.reply.send(attempt);
    }

    for e in socket.close().await {
        warn!(endpoint = %endpoint, error = %e, "error while closing push socket");
    }
}

fn bind_error(endpoint: &Endpoint, err: ZmqError) -> TransportError {
    match err {
        ZmqError::Network(io) if io.kind() == ErrorKind::AddrInUse => {
            TransportError::BindConflict {
                address: endpoint.to_string(),
                reason: io.to_string(),
            }
        }
        other if other.to_string().contains("in use") => TransportError::BindConflict {
            address: endpoint.to_string(),
            reason: other.to_string(),
        },
        other => TransportError::Bind {
            address: endpoint.to_string(),
            reason: other.to_string(),
        },
    }
}
