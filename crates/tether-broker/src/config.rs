//! Broker configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which end of the transport this broker sits on.
///
/// The role partitions the connection-id space: the host hands out odd ids,
/// the extension even ones, so ids allocated on either side never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Host,
    Extension,
}

impl Role {
    /// First id this role allocates. Id 0 is the bootstrap stream.
    pub(crate) fn first_id(self) -> u32 {
        match self {
            Role::Host => 1,
            Role::Extension => 2,
        }
    }

    /// Whether `id` belongs to this role's allocation space.
    pub fn owns(self, id: u32) -> bool {
        id != 0 && ((id % 2 == 1) == (self == Role::Host))
    }

    /// The role on the other end of the transport.
    pub fn peer(self) -> Role {
        match self {
            Role::Host => Role::Extension,
            Role::Extension => Role::Host,
        }
    }
}

/// Tunables for a [`crate::Broker`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// How long `accept` waits for the peer to dial, in milliseconds
    pub accept_timeout_ms: u64,
    /// How long `dial` waits for the peer to accept, in milliseconds
    pub dial_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            accept_timeout_ms: 5_000,
            dial_timeout_ms: 5_000,
        }
    }
}

impl BrokerConfig {
    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }
}
