//! SNMPv3 User-based Security Model (RFC 3414).
//!
//! - [`auth`] - password-to-key derivation, key localization, HMAC-96
//! - [`privacy`] - DES-CBC encryption of the scoped PDU
//! - [`usm`] - the msgSecurityParameters block
//!
//! Master keys are derived once per session from the user's passwords.
//! Localization to an engine id happens when that id is learned.

pub mod auth;
pub mod privacy;
pub mod usm;

pub use auth::{LocalizedKey, MasterKey};
pub use privacy::PrivKey;
pub use usm::UsmSecurityParams;

use bytes::Bytes;

use crate::error::{Error, Result};

/// Error returned when parsing a protocol name fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseProtocolError {
    input: String,
    privacy: bool,
}

impl std::fmt::Display for ParseProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.privacy {
            write!(
                f,
                "unknown privacy protocol '{}'; expected DES",
                self.input
            )
        } else {
            write!(
                f,
                "unknown authentication protocol '{}'; expected one of: MD5, SHA",
                self.input
            )
        }
    }
}

impl std::error::Error for ParseProtocolError {}

/// Authentication protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthProtocol {
    /// HMAC-MD5-96
    Md5,
    /// HMAC-SHA-96
    Sha1,
}

impl AuthProtocol {
    /// Digest length, which is also the localized key length.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
        }
    }

    /// Length of msgAuthenticationParameters (truncated HMAC).
    pub fn mac_len(self) -> usize {
        12
    }
}

impl std::fmt::Display for AuthProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5 => write!(f, "MD5"),
            Self::Sha1 => write!(f, "SHA"),
        }
    }
}

impl std::str::FromStr for AuthProtocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MD5" => Ok(Self::Md5),
            "SHA" | "SHA1" | "SHA-1" => Ok(Self::Sha1),
            _ => Err(ParseProtocolError {
                input: s.to_string(),
                privacy: false,
            }),
        }
    }
}

/// Privacy protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivProtocol {
    /// CBC-DES (RFC 3414 Section 8)
    Des,
}

impl std::fmt::Display for PrivProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Des => write!(f, "DES"),
        }
    }
}

impl std::str::FromStr for PrivProtocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DES" => Ok(Self::Des),
            _ => Err(ParseProtocolError {
                input: s.to_string(),
                privacy: true,
            }),
        }
    }
}

/// SNMPv3 security level.
///
/// Ordered from least to most secure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum SecurityLevel {
    #[default]
    NoAuthNoPriv,
    AuthNoPriv,
    AuthPriv,
}

impl SecurityLevel {
    /// Decode from the low two msgFlags bits. Privacy without
    /// authentication is not a valid level.
    pub fn from_flags(flags: u8) -> Option<Self> {
        match (flags & 0x01 != 0, flags & 0x02 != 0) {
            (false, false) => Some(Self::NoAuthNoPriv),
            (true, false) => Some(Self::AuthNoPriv),
            (true, true) => Some(Self::AuthPriv),
            (false, true) => None,
        }
    }

    /// Auth and priv bits, without the reportable flag.
    pub fn to_flags(self) -> u8 {
        match self {
            Self::NoAuthNoPriv => 0x00,
            Self::AuthNoPriv => 0x01,
            Self::AuthPriv => 0x03,
        }
    }

    pub fn requires_auth(self) -> bool {
        matches!(self, Self::AuthNoPriv | Self::AuthPriv)
    }

    pub fn requires_priv(self) -> bool {
        matches!(self, Self::AuthPriv)
    }
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAuthNoPriv => write!(f, "noAuthNoPriv"),
            Self::AuthNoPriv => write!(f, "authNoPriv"),
            Self::AuthPriv => write!(f, "authPriv"),
        }
    }
}

/// SNMPv3 user credentials.
///
/// ```
/// use snmp_session::v3::{AuthProtocol, PrivProtocol, SecurityLevel, UsmUser};
///
/// let user = UsmUser::auth_priv("admin", AuthProtocol::Sha1, "authpass1", PrivProtocol::Des, "privpass1");
/// assert_eq!(user.level, SecurityLevel::AuthPriv);
/// assert!(user.validate().is_ok());
/// ```
#[derive(Clone)]
pub struct UsmUser {
    pub name: Bytes,
    pub level: SecurityLevel,
    pub auth_protocol: Option<AuthProtocol>,
    pub auth_password: Option<Vec<u8>>,
    pub priv_protocol: Option<PrivProtocol>,
    pub priv_password: Option<Vec<u8>>,
    /// Local engine id, used as the authoritative engine of outgoing traps.
    pub engine_id: Bytes,
}

impl UsmUser {
    /// A noAuthNoPriv user.
    pub fn new(name: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            level: SecurityLevel::NoAuthNoPriv,
            auth_protocol: None,
            auth_password: None,
            priv_protocol: None,
            priv_password: None,
            engine_id: Bytes::new(),
        }
    }

    /// An authNoPriv user.
    pub fn auth(
        name: impl Into<Bytes>,
        protocol: AuthProtocol,
        password: impl AsRef<[u8]>,
    ) -> Self {
        Self {
            level: SecurityLevel::AuthNoPriv,
            auth_protocol: Some(protocol),
            auth_password: Some(password.as_ref().to_vec()),
            ..Self::new(name)
        }
    }

    /// An authPriv user.
    pub fn auth_priv(
        name: impl Into<Bytes>,
        auth_protocol: AuthProtocol,
        auth_password: impl AsRef<[u8]>,
        priv_protocol: PrivProtocol,
        priv_password: impl AsRef<[u8]>,
    ) -> Self {
        Self {
            level: SecurityLevel::AuthPriv,
            priv_protocol: Some(priv_protocol),
            priv_password: Some(priv_password.as_ref().to_vec()),
            ..Self::auth(name, auth_protocol, auth_password)
        }
    }

    /// Set the local engine id used for traps.
    pub fn with_engine_id(mut self, engine_id: impl Into<Bytes>) -> Self {
        self.engine_id = engine_id.into();
        self
    }

    /// Check that the level is backed by the protocols and passwords it needs.
    pub fn validate(&self) -> Result<()> {
        if self.priv_protocol.is_some() && self.auth_protocol.is_none() {
            return Err(Error::Config(
                "privacy requires an authentication protocol".into(),
            ));
        }
        if self.level.requires_auth()
            && (self.auth_protocol.is_none() || self.auth_password.is_none())
        {
            return Err(Error::Config(format!(
                "{} requires an authentication protocol and password",
                self.level
            )));
        }
        if self.level.requires_priv()
            && (self.priv_protocol.is_none() || self.priv_password.is_none())
        {
            return Err(Error::Config(format!(
                "{} requires a privacy protocol and password",
                self.level
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for UsmUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsmUser")
            .field("name", &String::from_utf8_lossy(&self.name))
            .field("level", &self.level)
            .field("auth_protocol", &self.auth_protocol)
            .field("priv_protocol", &self.priv_protocol)
            .finish_non_exhaustive()
    }
}

/// Master keys of one user, derived once from the passwords.
#[derive(Clone)]
pub struct UsmKeys {
    auth: Option<MasterKey>,
    privacy: Option<(PrivProtocol, MasterKey)>,
}

impl UsmKeys {
    /// Run password-to-key for each password the level uses.
    ///
    /// The privacy key is derived with the authentication hash.
    pub fn derive(user: &UsmUser) -> Result<Self> {
        user.validate()?;
        let auth = match (user.level.requires_auth(), user.auth_protocol, &user.auth_password) {
            (true, Some(protocol), Some(password)) => {
                Some(MasterKey::from_password(protocol, password))
            }
            _ => None,
        };
        let privacy = match (
            user.level.requires_priv(),
            user.auth_protocol,
            user.priv_protocol,
            &user.priv_password,
        ) {
            (true, Some(auth_protocol), Some(priv_protocol), Some(password)) => Some((
                priv_protocol,
                MasterKey::from_password(auth_protocol, password),
            )),
            _ => None,
        };
        Ok(Self { auth, privacy })
    }

    /// Bind the master keys to one engine.
    pub fn localize(&self, engine_id: &[u8]) -> LocalizedKeys {
        LocalizedKeys {
            auth: self.auth.as_ref().map(|k| k.localize(engine_id)),
            privacy: self
                .privacy
                .as_ref()
                .map(|(protocol, k)| PrivKey::new(*protocol, k.localize(engine_id))),
        }
    }
}

/// Keys localized to a single authoritative engine.
#[derive(Clone)]
pub struct LocalizedKeys {
    pub auth: Option<LocalizedKey>,
    pub privacy: Option<PrivKey>,
}
