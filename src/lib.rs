// The Error enum carries OIDs inline; boxing them buys little.
#![allow(clippy::result_large_err)]

//! # snmp-session
//!
//! Async SNMP v1/v2c/v3 client sessions over UDP.
//!
//! ## Features
//!
//! - Get, GetNext, GetBulk, Set, Inform and Trap over one socket
//! - Any number of requests in flight, each with its own timeout and retries
//! - SNMPv3 User Security Model: MD5/SHA-1 authentication and DES privacy,
//!   with automatic engine discovery
//! - GetBulk response splitting, subtree walks and table retrieval
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snmp_session::{Session, SessionConfig, Version, oid};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), snmp_session::Error> {
//!     let config = SessionConfig {
//!         version: Some(Version::V2c),
//!         ..Default::default()
//!     };
//!     let session = Session::community("192.168.1.1", "public", config).await?;
//!
//!     let sys_descr = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await?;
//!     println!("{}", sys_descr[0]);
//!
//!     let if_table = session.table(&oid!(1, 3, 6, 1, 2, 1, 2, 2), None).await?;
//!     for (index, columns) in &if_table {
//!         println!("row {index}: {} columns", columns.len());
//!     }
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## SNMPv3 Example
//!
//! ```rust,no_run
//! use snmp_session::{AuthProtocol, PrivProtocol, Session, SessionConfig, UsmUser, oid};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), snmp_session::Error> {
//!     let user = UsmUser::auth_priv(
//!         "admin",
//!         AuthProtocol::Sha1,
//!         "authpass123",
//!         PrivProtocol::Des,
//!         "privpass123",
//!     );
//!     let session = Session::v3("192.168.1.1", user, SessionConfig::default()).await?;
//!
//!     let result = session.get_next(&[oid!(1, 3, 6, 1, 2, 1, 1)]).await?;
//!     println!("{}", result[0]);
//!     Ok(())
//! }
//! ```

pub mod ber;
pub mod error;
pub mod message;
pub mod oid;
pub mod pdu;
pub mod session;
pub mod transport;
pub mod v3;
pub mod value;
pub mod varbind;
pub mod version;

pub(crate) mod util;

pub use error::{
    AuthErrorKind, CryptoErrorKind, DecodeErrorKind, EncodeErrorKind, Error, ErrorStatus,
    OidErrorKind, Result,
};
pub use oid::Oid;
pub use pdu::{GenericTrap, Pdu, PduType, TrapType, TrapV1Pdu};
pub use session::{
    BulkResult, NotifyOptions, Session, SessionBuilder, SessionConfig, SessionEvent, Table,
    split_bulk,
};
pub use transport::{Transport, UdpTransport};
pub use util::{IdBits, encode_hex};
pub use v3::{AuthProtocol, PrivProtocol, SecurityLevel, UsmUser};
pub use value::{ObjectType, Value};
pub use varbind::VarBind;
pub use version::Version;
