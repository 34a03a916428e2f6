//! The producer: bind a push endpoint, send a finite payload, exit.
//!
//! Two payload shapes are supported:
//! - a single text message (`Payload::Text`)
//! - `count` structured records numbered `0..count` (`Payload::Records`)
//!
//! No flush or drain confirmation is requested from the receiver; the only
//! feedback is the per-send `SendOutcome` of the bounded push socket.

#[cfg(test)]
mod tests;

use tracing::{debug, info};

use crate::transport::context::{Context, DeliveryPolicy};
use crate::transport::endpoint::Endpoint;
use crate::transport::message::Message;
use crate::transport::push::{PushSocket, SendOutcome};
use crate::utils::error::TransportError;

/// What the producer sends before it exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Records { count: u64 },
}

impl Payload {
    pub fn messages(&self) -> impl Iterator<Item = Message> + '_ {
        let (text, count) = match self {
            Payload::Text(body) => (Some(body), 0),
            Payload::Records { count } => (None, *count),
        };
        text.map(|body| Message::text(body.clone()))
            .into_iter()
            .chain((0..count).map(Message::record))
    }

    /// Every line a sink should contain once the payload is delivered.
    pub fn expected_lines(&self) -> Result<Vec<String>, serde_json::Error> {
        let mut lines = Vec::new();
        for message in self.messages() {
            lines.extend(message.expected_lines()?);
        }
        Ok(lines)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProducerReport {
    pub delivered: u64,
    pub dropped: u64,
}

impl ProducerReport {
    fn record(&mut self, outcome: SendOutcome) {
        match outcome {
            SendOutcome::Delivered => self.delivered += 1,
            SendOutcome::Dropped => self.dropped += 1,
        }
    }
}

pub struct Producer {
    socket: PushSocket,
}

impl Producer {
    /// Claim `address` for outbound delivery.
    ///
    /// Fails with `TransportError::BindConflict` when the endpoint is taken.
    pub async fn bind(ctx: &Context, address: &str) -> Result<Self, TransportError> {
        let socket = PushSocket::bind(ctx, address).await?;
        Ok(Self { socket })
    }

    pub async fn bind_with_policy(
        ctx: &Context,
        address: &str,
        policy: DeliveryPolicy,
    ) -> Result<Self, TransportError> {
        let socket = PushSocket::bind_with_policy(ctx, address, policy).await?;
        Ok(Self { socket })
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.socket.endpoint()
    }

    pub async fn send(&mut self, message: &Message) -> Result<SendOutcome, TransportError> {
        self.socket.send(message).await
    }

    /// Send one record per integer in `[0, count)`, in order.
    pub async fn send_records(&mut self, count: u64) -> Result<ProducerReport, TransportError> {
        let mut report = ProducerReport::default();
        for num in 0..count {
            report.record(self.socket.send(&Message::record(num)).await?);
        }
        debug!(endpoint = %self.endpoint(), count, "records sent");
        Ok(report)
    }

    /// Send the whole payload and close the socket.
    pub async fn run(mut self, payload: &Payload) -> Result<ProducerReport, TransportError> {
        let result = self.send_payload(payload).await;
        let endpoint = self.endpoint().clone();
        self.close().await;

        let report = result?;
        info!(
            endpoint = %endpoint,
            delivered = report.delivered,
            dropped = report.dropped,
            "producer finished"
        );
        Ok(report)
    }

    async fn send_payload(&mut self, payload: &Payload) -> Result<ProducerReport, TransportError> {
        match payload {
            Payload::Records { count } => self.send_records(*count).await,
            Payload::Text(_) => {
                let mut report = ProducerReport::default();
                for message in payload.messages() {
                    report.record(self.socket.send(&message).await?);
                }
                Ok(report)
            }
        }
    }

    pub async fn close(self) {
        self.socket.close().await;
    }
}
