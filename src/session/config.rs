//! Session configuration and builder.

use std::net::IpAddr;
use std::time::Duration;

use bytes::Bytes;

use super::Session;
use crate::error::{Error, Result};
use crate::util::IdBits;
use crate::v3::UsmUser;
use crate::version::Version;

/// Default agent port.
pub const DEFAULT_PORT: u16 = 161;
/// Default notification receiver port.
pub const DEFAULT_TRAP_PORT: u16 = 162;
/// Default number of resends after the first transmission.
pub const DEFAULT_RETRIES: u32 = 1;
/// Default wait per transmission.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);
/// Default max-repetitions for walk, subtree and table retrieval.
pub const DEFAULT_MAX_REPETITIONS: i32 = 20;

/// Options of one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Protocol version. `None` means v1 for community sessions and v3 for
    /// USM sessions.
    pub version: Option<Version>,
    /// Community string for v1/v2c (default: "public").
    pub community: Bytes,
    /// Agent port (default: 161).
    pub port: u16,
    /// Port that traps and informs are sent to (default: 162).
    pub trap_port: u16,
    /// Resends after the first transmission (default: 1).
    pub retries: u32,
    /// Wait per transmission (default: 5 seconds).
    pub timeout: Duration,
    /// Width of generated request ids (default: 32 bit).
    pub id_bits: IdBits,
    /// Local address to bind; the wildcard of the target's family if unset.
    pub source_address: Option<IpAddr>,
    /// Local port to bind; ephemeral if unset.
    pub source_port: Option<u16>,
    /// Max-repetitions used by walk, subtree and table (default: 20).
    pub max_repetitions: i32,
    /// SNMPv3 credentials.
    pub usm_user: Option<UsmUser>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            version: None,
            community: Bytes::from_static(b"public"),
            port: DEFAULT_PORT,
            trap_port: DEFAULT_TRAP_PORT,
            retries: DEFAULT_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            id_bits: IdBits::default(),
            source_address: None,
            source_port: None,
            max_repetitions: DEFAULT_MAX_REPETITIONS,
            usm_user: None,
        }
    }
}

impl SessionConfig {
    /// Version in effect: explicit, or inferred from the presence of a user.
    pub fn effective_version(&self) -> Version {
        match (self.version, &self.usm_user) {
            (Some(version), _) => version,
            (None, Some(_)) => Version::V3,
            (None, None) => Version::V1,
        }
    }

    /// Check that the options describe a usable session.
    pub fn validate(&self) -> Result<()> {
        match (self.effective_version(), &self.usm_user) {
            (Version::V3, None) => {
                return Err(Error::Config("SNMPv3 session requires a USM user".into()));
            }
            (Version::V3, Some(user)) => user.validate()?,
            (version, Some(_)) => {
                return Err(Error::Config(format!(
                    "USM user supplied for community session version '{version}'"
                )));
            }
            (_, None) => {}
        }
        if self.max_repetitions < 0 {
            return Err(Error::Config(format!(
                "max_repetitions must not be negative, got {}",
                self.max_repetitions
            )));
        }
        Ok(())
    }
}

/// Builder for [`Session`].
///
/// ```rust,no_run
/// use snmp_session::{SessionBuilder, Version};
/// use std::time::Duration;
///
/// # async fn example() -> snmp_session::Result<()> {
/// let session = SessionBuilder::new("192.0.2.10")
///     .version(Version::V2c)
///     .community("private")
///     .timeout(Duration::from_secs(2))
///     .retries(3)
///     .connect()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    target: String,
    config: SessionConfig,
}

impl SessionBuilder {
    /// Start from the defaults for `target` (host name or IP address).
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            config: SessionConfig::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn with_config(target: impl Into<String>, config: SessionConfig) -> Self {
        Self {
            target: target.into(),
            config,
        }
    }

    pub fn version(mut self, version: Version) -> Self {
        self.config.version = Some(version);
        self
    }

    pub fn community(mut self, community: impl Into<Bytes>) -> Self {
        self.config.community = community.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn trap_port(mut self, port: u16) -> Self {
        self.config.trap_port = port;
        self
    }

    /// Resends after the first transmission.
    pub fn retries(mut self, retries: u32) -> Self {
        self.config.retries = retries;
        self
    }

    /// Wait per transmission. The total time for a request may reach
    /// `timeout * (retries + 1)`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn id_bits(mut self, id_bits: IdBits) -> Self {
        self.config.id_bits = id_bits;
        self
    }

    pub fn source_address(mut self, addr: IpAddr) -> Self {
        self.config.source_address = Some(addr);
        self
    }

    pub fn source_port(mut self, port: u16) -> Self {
        self.config.source_port = Some(port);
        self
    }

    pub fn max_repetitions(mut self, max_repetitions: i32) -> Self {
        self.config.max_repetitions = max_repetitions;
        self
    }

    pub fn usm_user(mut self, user: UsmUser) -> Self {
        self.config.usm_user = Some(user);
        self
    }

    /// Validate, resolve the target and start the session.
    pub async fn connect(self) -> Result<Session> {
        Session::start(&self.target, self.config).await
    }
}
