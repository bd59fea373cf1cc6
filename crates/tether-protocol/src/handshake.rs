//! Launch handshake
//!
//! A host starts an extension with the magic cookie in its environment. An
//! extension listening on TCP announces itself with one stdout line:
//! `<core version>|<app version>|tcp|<addr>|tether`.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::{ServeError, ServeResult};

/// Name the host registers plugins under.
pub const PLUGIN_KEY: &str = "tempest_dynamic_v1";
/// Environment variable carrying the magic cookie.
pub const MAGIC_COOKIE_KEY: &str = "TEMPEST_DYNAMIC_PLUGIN";
pub const MAGIC_COOKIE_VALUE: &str = "1";
pub const PROTOCOL_VERSION: u32 = 1;

const CORE_VERSION: u32 = 1;
const NETWORK: &str = "tcp";
const PROTOCOL_NAME: &str = "tether";

/// Check a cookie value read from the environment.
pub fn check_cookie(value: Option<&str>) -> ServeResult<()> {
    match value {
        Some(MAGIC_COOKIE_VALUE) => Ok(()),
        _ => Err(ServeError::NotLaunchedByHost),
    }
}

/// The cookie this process was started with, if any.
pub fn cookie_from_env() -> Option<String> {
    std::env::var(MAGIC_COOKIE_KEY).ok()
}

/// Where a TCP extension listens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeLine {
    pub protocol_version: u32,
    pub addr: SocketAddr,
}

impl HandshakeLine {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            addr,
        }
    }
}

impl fmt::Display for HandshakeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{CORE_VERSION}|{}|{NETWORK}|{}|{PROTOCOL_NAME}",
            self.protocol_version, self.addr
        )
    }
}

impl FromStr for HandshakeLine {
    type Err = ServeError;

    fn from_str(line: &str) -> ServeResult<Self> {
        let malformed = || ServeError::Handshake(line.to_string());
        let parts: Vec<&str> = line.trim().split('|').collect();
        let [core, version, network, addr, protocol] = parts.as_slice() else {
            return Err(malformed());
        };
        if core.parse::<u32>().ok() != Some(CORE_VERSION) || *network != NETWORK {
            return Err(malformed());
        }
        if *protocol != PROTOCOL_NAME {
            return Err(malformed());
        }
        let protocol_version: u32 = version.parse().map_err(|_| malformed())?;
        if protocol_version != PROTOCOL_VERSION {
            return Err(ServeError::Version(protocol_version));
        }
        let addr = addr.parse().map_err(|_| malformed())?;
        Ok(Self {
            protocol_version,
            addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_must_match() {
        assert!(check_cookie(Some("1")).is_ok());
        assert!(matches!(
            check_cookie(Some("0")),
            Err(ServeError::NotLaunchedByHost)
        ));
        assert!(check_cookie(None).is_err());
    }

    #[test]
    fn test_handshake_line_format() -> anyhow::Result<()> {
        let line = HandshakeLine::new("127.0.0.1:4100".parse()?);
        assert_eq!(line.to_string(), "1|1|tcp|127.0.0.1:4100|tether");
        assert_eq!("1|1|tcp|127.0.0.1:4100|tether\n".parse::<HandshakeLine>()?, line);
        Ok(())
    }

    #[test]
    fn test_handshake_line_rejects_other_versions() {
        assert!(matches!(
            "1|2|tcp|127.0.0.1:4100|tether".parse::<HandshakeLine>(),
            Err(ServeError::Version(2))
        ));
        assert!(matches!(
            "1|1|unix|/tmp/sock|tether".parse::<HandshakeLine>(),
            Err(ServeError::Handshake(_))
        ));
        assert!("hello".parse::<HandshakeLine>().is_err());
    }
}
