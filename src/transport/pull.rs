//! Pull side of the push/pull pair.
//!
//! The underlying socket does not reconnect once its peer goes away, so `recv`
//! reports `TransportError::Disconnected` and the owner builds a fresh socket.

use futures::StreamExt;
use futures::channel::mpsc;
use tracing::{debug, info};
use zeromq::{Socket, SocketEvent, SocketRecv};

use crate::transport::context::Context;
use crate::transport::endpoint::Endpoint;
use crate::utils::error::TransportError;

pub struct PullSocket {
    socket: zeromq::PullSocket,
    events: mpsc::Receiver<SocketEvent>,
    endpoint: Endpoint,
    connected: bool,
}

impl PullSocket {
    /// A pull socket that will connect to `endpoint`.
    pub fn new(ctx: &Context, endpoint: Endpoint) -> Self {
        debug!(context = %ctx.id(), endpoint = %endpoint, "pull socket created");
        let mut socket = zeromq::PullSocket::new();
        let events = socket.monitor();
        Self {
            socket,
            events,
            endpoint,
            connected: false,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// One connection attempt. Callers own the retry schedule.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        self.socket
            .connect(&self.endpoint.to_string())
            .await
            .map_err(|e| TransportError::Connect {
                address: self.endpoint.to_string(),
                reason: e.to_string(),
            })?;
        self.connected = true;
        info!(endpoint = %self.endpoint, "pull socket connected");
        Ok(())
    }

    /// Receive one message; multipart frames are concatenated.
    ///
    /// Messages already queued are handed out before a disconnect is reported.
    pub async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        let message = tokio::select! {
            biased;
            received = self.socket.recv() => received.map_err(|e| TransportError::Socket {
                address: self.endpoint.to_string(),
                reason: e.to_string(),
            })?,
            _ = next_disconnect(&mut self.events) => {
                self.connected = false;
                return Err(TransportError::Disconnected {
                    address: self.endpoint.to_string(),
                });
            }
        };

        let mut payload = Vec::new();
        for frame in message.into_vec() {
            payload.extend_from_slice(&frame);
        }
        Ok(payload)
    }

    pub async fn close(self) {
        let endpoint = self.endpoint;
        let errors = self.socket.close().await;
        debug!(endpoint = %endpoint, errors = errors.len(), "pull socket closed");
    }
}

async fn next_disconnect(events: &mut mpsc::Receiver<SocketEvent>) {
    while let Some(event) = events.next().await {
        if let SocketEvent::Disconnected(_) = event {
            return;
        }
    }
    // monitor gone: only the data path can end the wait
    std::future::pending::<()>().await
}
