//! `tcp://host:port` endpoint addresses.
//!
//! Producer and consumer must agree on the address bit for bit. A mismatch is
//! never detected here: the peers simply never meet.

use std::fmt;
use std::str::FromStr;

use crate::utils::error::TransportError;

pub const TCP_SCHEME: &str = "tcp://";

/// A parsed TCP endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn parse(address: &str) -> Result<Self, TransportError> {
        let invalid = |reason: &str| TransportError::InvalidEndpoint {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        let rest = address
            .strip_prefix(TCP_SCHEME)
            .ok_or_else(|| invalid("only tcp:// endpoints are supported"))?;
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing port"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| invalid("port must be an integer between 0 and 65535"))?;

        Ok(Self::new(host, port))
    }

    /// Address handed to the socket library when binding. `*` means every
    /// interface.
    pub fn bind_address(&self) -> String {
        if self.host == "*" {
            format!("{TCP_SCHEME}0.0.0.0:{}", self.port)
        } else {
            self.to_string()
        }
    }

    /// Port 0 asks the OS for an ephemeral port at bind time.
    pub fn is_ephemeral(&self) -> bool {
        self.port == 0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{TCP_SCHEME}[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{TCP_SCHEME}{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
