//! ZeroMQ push/pull transport.
//!
//! Everything socket-shaped lives here; the producer and the pipeline only
//! see `PushSocket`, `PullSocket`, `Message` and the explicit `Context`.

pub mod context;
pub mod endpoint;
pub mod message;
pub mod pull;
pub mod push;


pub use context::{Context, DeliveryPolicy, SocketOptions};
pub use endpoint::Endpoint;
pub use message::{Message, Record};
pub use pull::PullSocket;
pub use push::{PushSocket, SendOutcome};
