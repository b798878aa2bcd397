//! Mapping a client to its limiter key.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use sha2::{Digest, Sha256};

use crate::config::LimiterConfig;

/// Hex characters of the user-agent digest kept in a key.
const AGENT_HASH_LEN: usize = 16;

/// Who a request is charged to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity {
    addr: IpAddr,
    agent_hash: Option<String>,
}

impl ClientIdentity {
    pub fn new(addr: IpAddr) -> Self {
        Self {
            addr,
            agent_hash: None,
        }
    }

    /// Resolve a client from the connection and its request headers.
    ///
    /// `proxy_value` is the content of the configured trusted proxy header,
    /// if the request carried it; it is ignored unless a header is
    /// configured. An unparsable first hop falls back to the peer address.
    pub fn resolve(
        config: &LimiterConfig,
        peer: IpAddr,
        proxy_value: Option<&str>,
        user_agent: Option<&str>,
    ) -> Self {
        let addr = config
            .trusted_proxy_header
            .as_ref()
            .and(proxy_value)
            .and_then(first_hop)
            .unwrap_or(peer);

        let identity = Self::new(addr);
        match user_agent {
            Some(agent) if config.hash_user_agent => identity.with_user_agent(agent),
            _ => identity,
        }
    }

    /// Distinguish clients sharing an address by their user agent.
    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        let digest = Sha256::digest(user_agent.as_bytes());
        let mut hash = hex::encode(digest);
        hash.truncate(AGENT_HASH_LEN);
        self.agent_hash = Some(hash);
        self
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Registry key for this client.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.agent_hash {
            Some(hash) => write!(f, "{}|ua:{}", self.addr, hash),
            None => write!(f, "{}", self.addr),
        }
    }
}

/// First address of a comma-separated forwarding chain.
///
/// Accepts bare addresses and `addr:port` / `[v6]:port` forms.
pub fn first_hop(value: &str) -> Option<IpAddr> {
    let hop = value.split(',').next()?.trim();
    hop.parse::<IpAddr>()
        .ok()
        .or_else(|| hop.parse::<SocketAddr>().ok().map(|s| s.ip()))
}
