//! Error types for snmp-session.
//!
//! - [`Error`] - the error type for every library operation
//! - [`ErrorStatus`] - SNMP protocol errors returned by agents (RFC 3416)
//! - `*ErrorKind` - detail enums for codec, USM and OID failures
//!
//! Errors raised while building a request (bad OID, unencodable value) are
//! returned before anything is sent. Errors that belong to a single request
//! are delivered to that request's caller. Errors that cannot be attributed
//! to any request (an unparseable datagram, a failing receive) are published
//! on the session event channel instead, see
//! [`SessionEvent`](crate::session::SessionEvent).
//!
//! # Example
//!
//! ```no_run
//! use snmp_session::{Error, ErrorStatus, Session, SessionConfig, oid};
//!
//! # async fn example() -> snmp_session::Result<()> {
//! let session = Session::community("192.168.1.1", "public", SessionConfig::default()).await?;
//!
//! match session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await {
//!     Ok(varbinds) => println!("{}", varbinds[0]),
//!     Err(Error::Timeout { retries, .. }) => println!("no answer after {} retries", retries),
//!     Err(Error::RequestFailed { status: ErrorStatus::NoSuchName, oid, .. }) => {
//!         println!("agent does not know {:?}", oid)
//!     }
//!     Err(e) => println!("error: {}", e),
//! }
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use crate::oid::Oid;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Authentication error kinds (SNMPv3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// No credentials configured for an authenticated exchange.
    NoCredentials,
    /// Computed HMAC doesn't match the one carried in the message.
    DigestMismatch,
    /// Auth params have the wrong length.
    WrongMacLength { expected: usize, actual: usize },
    /// The authentication field could not be located in the message.
    AuthParamsNotFound,
    /// The HMAC implementation refused the localized key.
    InvalidKey,
}

impl std::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no credentials configured"),
            Self::DigestMismatch => write!(f, "authentication digest mismatch"),
            Self::WrongMacLength { expected, actual } => {
                write!(f, "wrong MAC length: expected {}, got {}", expected, actual)
            }
            Self::AuthParamsNotFound => write!(f, "authentication parameters not found"),
            Self::InvalidKey => write!(f, "invalid authentication key"),
        }
    }
}

/// Cryptographic error kinds (encryption/decryption).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoErrorKind {
    /// No privacy key configured.
    NoPrivKey,
    /// Privacy parameters (salt) have the wrong length.
    InvalidPrivParamsLength { expected: usize, actual: usize },
    /// Ciphertext length is not a multiple of the block size.
    InvalidCiphertextLength { length: usize, block_size: usize },
    /// Localized key is too short for the cipher.
    InvalidKeyLength,
    /// Cipher operation failed.
    CipherError,
}

impl std::fmt::Display for CryptoErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoPrivKey => write!(f, "no privacy key configured"),
            Self::InvalidPrivParamsLength { expected, actual } => {
                write!(
                    f,
                    "invalid privParameters length: expected {}, got {}",
                    expected, actual
                )
            }
            Self::InvalidCiphertextLength { length, block_size } => {
                write!(
                    f,
                    "ciphertext length {} not multiple of block size {}",
                    length, block_size
                )
            }
            Self::InvalidKeyLength => write!(f, "invalid key length"),
            Self::CipherError => write!(f, "cipher operation failed"),
        }
    }
}

/// BER decode error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// Expected different tag.
    UnexpectedTag { expected: u8, actual: u8 },
    /// Data truncated unexpectedly.
    TruncatedData,
    /// Invalid BER length encoding.
    InvalidLength,
    /// Indefinite length not supported.
    IndefiniteLength,
    /// Length field too long.
    LengthTooLong { octets: usize },
    /// Length exceeds maximum.
    LengthExceedsMax { length: usize, max: usize },
    /// Integer content longer than the value type allows.
    IntegerTooLong { length: usize },
    /// Zero-length integer.
    ZeroLengthInteger,
    /// Invalid OID encoding.
    InvalidOidEncoding,
    /// Unknown SNMP version.
    UnknownVersion(i32),
    /// Unknown PDU type.
    UnknownPduType(u8),
    /// Unknown value type tag in a varbind.
    UnknownValueType(u8),
    /// Invalid IP address length.
    InvalidIpAddressLength { length: usize },
    /// BOOLEAN with a length other than 1.
    InvalidBoolean,
    /// NULL with non-zero length.
    InvalidNull,
    /// msgFlags OCTET STRING is not a single byte.
    InvalidMsgFlags,
    /// Unknown security model.
    UnknownSecurityModel(i32),
    /// Expected plaintext, got encrypted.
    UnexpectedEncryption,
    /// Expected encrypted, got plaintext.
    ExpectedEncryption,
    /// Trailing bytes after a complete message.
    TrailingData,
}

impl std::fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedTag { expected, actual } => {
                write!(f, "expected tag 0x{:02X}, got 0x{:02X}", expected, actual)
            }
            Self::TruncatedData => write!(f, "unexpected end of data"),
            Self::InvalidLength => write!(f, "invalid length encoding"),
            Self::IndefiniteLength => write!(f, "indefinite length encoding not supported"),
            Self::LengthTooLong { octets } => {
                write!(f, "length encoding too long ({} octets)", octets)
            }
            Self::LengthExceedsMax { length, max } => {
                write!(f, "length {} exceeds maximum {}", length, max)
            }
            Self::IntegerTooLong { length } => write!(f, "integer too long ({} bytes)", length),
            Self::ZeroLengthInteger => write!(f, "zero-length integer"),
            Self::InvalidOidEncoding => write!(f, "invalid OID encoding"),
            Self::UnknownVersion(v) => write!(f, "unknown SNMP version: {}", v),
            Self::UnknownPduType(t) => write!(f, "unknown PDU type: 0x{:02X}", t),
            Self::UnknownValueType(t) => write!(f, "unknown type 0x{:02X} in response", t),
            Self::InvalidIpAddressLength { length } => {
                write!(f, "IP address must be 4 bytes, got {}", length)
            }
            Self::InvalidBoolean => write!(f, "BOOLEAN must be 1 byte"),
            Self::InvalidNull => write!(f, "NULL with non-zero length"),
            Self::InvalidMsgFlags => write!(f, "msgFlags must be a single byte"),
            Self::UnknownSecurityModel(m) => write!(f, "unknown security model: {}", m),
            Self::UnexpectedEncryption => write!(f, "expected plaintext scoped PDU"),
            Self::ExpectedEncryption => write!(f, "expected encrypted scoped PDU"),
            Self::TrailingData => write!(f, "trailing data after message"),
        }
    }
}

/// BER encode error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeErrorKind {
    /// The value has no wire representation in a request (exception markers).
    UnknownType(crate::value::ObjectType),
    /// A v1 Trap agent address is not a dotted IPv4 address.
    InvalidIpAddress,
}

impl std::fmt::Display for EncodeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownType(t) => write!(f, "unknown type '{}' in request", t),
            Self::InvalidIpAddress => write!(f, "invalid IP address"),
        }
    }
}

/// OID validation error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OidErrorKind {
    /// Empty OID string.
    Empty,
    /// Invalid arc value (non-numeric or overflow).
    InvalidArc,
    /// First arc must be 0, 1, or 2.
    InvalidFirstArc(u32),
    /// Second arc too large for first arc 0 or 1.
    InvalidSecondArc { first: u32, second: u32 },
    /// Subidentifier overflows u32.
    SubidentifierOverflow,
}

impl std::fmt::Display for OidErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty OID"),
            Self::InvalidArc => write!(f, "invalid arc value"),
            Self::InvalidFirstArc(v) => write!(f, "first arc must be 0, 1, or 2, got {}", v),
            Self::InvalidSecondArc { first, second } => {
                write!(f, "second arc {} too large for first arc {}", second, first)
            }
            Self::SubidentifierOverflow => write!(f, "subidentifier overflow"),
        }
    }
}

/// SNMP protocol error status codes (RFC 3416).
///
/// ```
/// use snmp_session::ErrorStatus;
///
/// let status = ErrorStatus::from_i32(2);
/// assert_eq!(status, ErrorStatus::NoSuchName);
/// assert_eq!(status.to_string(), "noSuchName");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorStatus {
    NoError,
    TooBig,
    /// SNMPv1 only; v2c+ agents use exception values instead.
    NoSuchName,
    BadValue,
    ReadOnly,
    GenErr,
    NoAccess,
    WrongType,
    WrongLength,
    WrongEncoding,
    WrongValue,
    NoCreation,
    InconsistentValue,
    ResourceUnavailable,
    CommitFailed,
    UndoFailed,
    AuthorizationError,
    NotWritable,
    InconsistentName,
    /// Unknown or future error status code.
    Unknown(i32),
}

impl ErrorStatus {
    /// Create from raw status code.
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::NoError,
            1 => Self::TooBig,
            2 => Self::NoSuchName,
            3 => Self::BadValue,
            4 => Self::ReadOnly,
            5 => Self::GenErr,
            6 => Self::NoAccess,
            7 => Self::WrongType,
            8 => Self::WrongLength,
            9 => Self::WrongEncoding,
            10 => Self::WrongValue,
            11 => Self::NoCreation,
            12 => Self::InconsistentValue,
            13 => Self::ResourceUnavailable,
            14 => Self::CommitFailed,
            15 => Self::UndoFailed,
            16 => Self::AuthorizationError,
            17 => Self::NotWritable,
            18 => Self::InconsistentName,
            other => Self::Unknown(other),
        }
    }

    /// Convert to raw status code.
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::NoError => 0,
            Self::TooBig => 1,
            Self::NoSuchName => 2,
            Self::BadValue => 3,
            Self::ReadOnly => 4,
            Self::GenErr => 5,
            Self::NoAccess => 6,
            Self::WrongType => 7,
            Self::WrongLength => 8,
            Self::WrongEncoding => 9,
            Self::WrongValue => 10,
            Self::NoCreation => 11,
            Self::InconsistentValue => 12,
            Self::ResourceUnavailable => 13,
            Self::CommitFailed => 14,
            Self::UndoFailed => 15,
            Self::AuthorizationError => 16,
            Self::NotWritable => 17,
            Self::InconsistentName => 18,
            Self::Unknown(code) => *code,
        }
    }
}

impl std::fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoError => write!(f, "noError"),
            Self::TooBig => write!(f, "tooBig"),
            Self::NoSuchName => write!(f, "noSuchName"),
            Self::BadValue => write!(f, "badValue"),
            Self::ReadOnly => write!(f, "readOnly"),
            Self::GenErr => write!(f, "genErr"),
            Self::NoAccess => write!(f, "noAccess"),
            Self::WrongType => write!(f, "wrongType"),
            Self::WrongLength => write!(f, "wrongLength"),
            Self::WrongEncoding => write!(f, "wrongEncoding"),
            Self::WrongValue => write!(f, "wrongValue"),
            Self::NoCreation => write!(f, "noCreation"),
            Self::InconsistentValue => write!(f, "inconsistentValue"),
            Self::ResourceUnavailable => write!(f, "resourceUnavailable"),
            Self::CommitFailed => write!(f, "commitFailed"),
            Self::UndoFailed => write!(f, "undoFailed"),
            Self::AuthorizationError => write!(f, "authorizationError"),
            Self::NotWritable => write!(f, "notWritable"),
            Self::InconsistentName => write!(f, "inconsistentName"),
            Self::Unknown(code) => write!(f, "unknown({})", code),
        }
    }
}

/// The error type for all snmp-session operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// I/O error on the transport.
    #[error("I/O error{}: {source}", target.map(|t| format!(" communicating with {}", t)).unwrap_or_default())]
    Io {
        target: Option<SocketAddr>,
        #[source]
        source: std::io::Error,
    },

    /// Request timed out after all retries.
    #[error("request timed out after {elapsed:?}{} (request_id={request_id}, retries={retries})", target.map(|t| format!(" waiting for {}", t)).unwrap_or_default())]
    Timeout {
        target: Option<SocketAddr>,
        elapsed: Duration,
        request_id: i32,
        retries: u32,
    },

    /// The agent answered with a non-zero error status.
    #[error("{status}{}", oid.as_ref().map(|o| format!(": {}", o)).unwrap_or_default())]
    RequestFailed {
        status: ErrorStatus,
        index: u32,
        oid: Option<Oid>,
    },

    /// A varbind carried an exception value where data was required.
    #[error("{kind}: {oid}")]
    VarbindException {
        oid: Oid,
        kind: crate::value::ObjectType,
    },

    /// The caller supplied input that cannot be turned into a request.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The response was well formed but does not fit the request.
    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },

    /// Invalid OID format.
    #[error("invalid OID{}: {kind}", input.as_ref().map(|i| format!(" '{}'", i)).unwrap_or_default())]
    InvalidOid {
        kind: OidErrorKind,
        input: Option<Box<str>>,
    },

    /// BER decoding error.
    #[error("decode error at offset {offset}: {kind}")]
    Decode {
        offset: usize,
        kind: DecodeErrorKind,
    },

    /// BER encoding error.
    #[error("encode error: {kind}")]
    Encode { kind: EncodeErrorKind },

    /// Digest verification failed (SNMPv3).
    #[error("authentication failed: {kind}")]
    AuthenticationFailed {
        target: Option<SocketAddr>,
        kind: AuthErrorKind,
    },

    /// Decryption failed (SNMPv3).
    #[error("decryption failed: {kind}")]
    DecryptionFailed {
        target: Option<SocketAddr>,
        kind: CryptoErrorKind,
    },

    /// Encryption failed (SNMPv3).
    #[error("encryption failed: {kind}")]
    EncryptionFailed {
        target: Option<SocketAddr>,
        kind: CryptoErrorKind,
    },

    /// The session was closed while the request was pending.
    #[error("socket closed")]
    SessionClosed,

    /// Invalid session configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a decode error.
    pub fn decode(offset: usize, kind: DecodeErrorKind) -> Self {
        tracing::debug!(target: "snmp_session::ber", { snmp.offset = offset, kind = %kind }, "decode error");
        Self::Decode { offset, kind }
    }

    /// Create an encode error.
    pub fn encode(kind: EncodeErrorKind) -> Self {
        Self::Encode { kind }
    }

    /// Create an authentication error.
    pub fn auth(target: Option<SocketAddr>, kind: AuthErrorKind) -> Self {
        Self::AuthenticationFailed { target, kind }
    }

    /// Create a decryption error.
    pub fn decrypt(target: Option<SocketAddr>, kind: CryptoErrorKind) -> Self {
        Self::DecryptionFailed { target, kind }
    }

    /// Create an encryption error.
    pub fn encrypt(target: Option<SocketAddr>, kind: CryptoErrorKind) -> Self {
        Self::EncryptionFailed { target, kind }
    }

    /// Create an invalid-response error.
    pub fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            reason: reason.into(),
        }
    }

    /// Create an invalid-request error.
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Create an invalid OID error from a kind (no input string).
    pub fn invalid_oid(kind: OidErrorKind) -> Self {
        Self::InvalidOid { kind, input: None }
    }

    /// Create an invalid OID error with the input string that failed.
    pub fn invalid_oid_with_input(kind: OidErrorKind, input: impl Into<Box<str>>) -> Self {
        Self::InvalidOid {
            kind,
            input: Some(input.into()),
        }
    }

    /// Get the target address if this error has one.
    pub fn target(&self) -> Option<SocketAddr> {
        match self {
            Self::Io { target, .. } => *target,
            Self::Timeout { target, .. } => *target,
            Self::AuthenticationFailed { target, .. } => *target,
            Self::DecryptionFailed { target, .. } => *target,
            Self::EncryptionFailed { target, .. } => *target,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    #[test]
    fn error_status_roundtrip_codes() {
        for code in 0..=18 {
            assert_eq!(ErrorStatus::from_i32(code).as_i32(), code);
        }
        assert_eq!(ErrorStatus::from_i32(99), ErrorStatus::Unknown(99));
    }

    #[test]
    fn error_status_display_is_camel_case() {
        assert_eq!(ErrorStatus::GenErr.to_string(), "genErr");
        assert_eq!(ErrorStatus::NotWritable.to_string(), "notWritable");
        assert_eq!(ErrorStatus::Unknown(42).to_string(), "unknown(42)");
    }

    #[test]
    fn request_failed_display_includes_oid() {
        let err = Error::RequestFailed {
            status: ErrorStatus::NoSuchName,
            index: 1,
            oid: Some(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)),
        };
        assert_eq!(err.to_string(), "noSuchName: 1.3.6.1.2.1.1.1.0");

        let err = Error::RequestFailed {
            status: ErrorStatus::GenErr,
            index: 0,
            oid: None,
        };
        assert_eq!(err.to_string(), "genErr");
    }

    #[test]
    fn closed_error_message() {
        assert_eq!(Error::SessionClosed.to_string(), "socket closed");
    }

    #[test]
    fn target_only_for_network_errors() {
        let addr: SocketAddr = "192.0.2.1:161".parse().unwrap();
        let err = Error::Timeout {
            target: Some(addr),
            elapsed: Duration::from_secs(5),
            request_id: 7,
            retries: 1,
        };
        assert_eq!(err.target(), Some(addr));
        assert_eq!(Error::invalid_response("x").target(), None);
    }
}
