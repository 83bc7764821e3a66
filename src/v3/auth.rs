//! Authentication key derivation and HMAC operations (RFC 3414).
//!
//! - Password-to-key derivation (1MB expansion + hash)
//! - Key localization (binding key to engine ID)
//! - HMAC-96 over whole messages, with the digest field located by offset

use digest::{Digest, KeyInit, Mac};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::AuthProtocol;
use crate::error::{AuthErrorKind, Error, Result};

/// Minimum password length recommended by RFC 3414.
pub const MIN_PASSWORD_LENGTH: usize = 8;

const EXPANSION_SIZE: usize = 1_048_576;

/// Password-derived key, not yet bound to an engine (Ku).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: AuthProtocol,
}

impl MasterKey {
    /// Expand the password to 1MB and hash it (RFC 3414 Section A.2.1).
    pub fn from_password(protocol: AuthProtocol, password: &[u8]) -> Self {
        if password.len() < MIN_PASSWORD_LENGTH {
            tracing::warn!(
                target: "snmp_session::usm",
                password_len = password.len(),
                min_len = MIN_PASSWORD_LENGTH,
                "USM password is shorter than recommended"
            );
        }
        let key = match protocol {
            AuthProtocol::Md5 => expand_and_hash::<md5::Md5>(password),
            AuthProtocol::Sha1 => expand_and_hash::<sha1::Sha1>(password),
        };
        Self { key, protocol }
    }

    pub fn protocol(&self) -> AuthProtocol {
        self.protocol
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// `H(Ku || engineID || Ku)` (RFC 3414 Section A.2.2).
    pub fn localize(&self, engine_id: &[u8]) -> LocalizedKey {
        let key = match self.protocol {
            AuthProtocol::Md5 => localize_with::<md5::Md5>(&self.key, engine_id),
            AuthProtocol::Sha1 => localize_with::<sha1::Sha1>(&self.key, engine_id),
        };
        LocalizedKey {
            key,
            protocol: self.protocol,
        }
    }
}

/// Key bound to one authoritative engine (Kul).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct LocalizedKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: AuthProtocol,
}

impl LocalizedKey {
    /// Derive directly from a password and engine id.
    pub fn from_password(protocol: AuthProtocol, password: &[u8], engine_id: &[u8]) -> Self {
        MasterKey::from_password(protocol, password).localize(engine_id)
    }

    pub fn from_bytes(protocol: AuthProtocol, key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            protocol,
        }
    }

    pub fn protocol(&self) -> AuthProtocol {
        self.protocol
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// HMAC over `data`, truncated to 12 bytes.
    pub fn compute_hmac(&self, data: &[u8]) -> Result<[u8; 12]> {
        match self.protocol {
            AuthProtocol::Md5 => hmac_96::<hmac::Hmac<md5::Md5>>(&self.key, data),
            AuthProtocol::Sha1 => hmac_96::<hmac::Hmac<sha1::Sha1>>(&self.key, data),
        }
    }
}

impl std::fmt::Debug for LocalizedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalizedKey")
            .field("protocol", &self.protocol)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

fn expand_and_hash<D: Digest>(password: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return vec![0u8; <D as Digest>::output_size()];
    }

    let mut hasher = D::new();
    let mut chunk = [0u8; 64];
    let mut index = 0;
    for _ in 0..EXPANSION_SIZE / chunk.len() {
        for byte in &mut chunk {
            *byte = password[index];
            index = (index + 1) % password.len();
        }
        hasher.update(chunk);
    }
    hasher.finalize().to_vec()
}

fn localize_with<D: Digest>(master: &[u8], engine_id: &[u8]) -> Vec<u8> {
    let mut hasher = D::new();
    hasher.update(master);
    hasher.update(engine_id);
    hasher.update(master);
    hasher.finalize().to_vec()
}

fn hmac_96<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Result<[u8; 12]> {
    let mut mac = <M as KeyInit>::new_from_slice(key)
        .map_err(|_| Error::auth(None, AuthErrorKind::InvalidKey))?;
    Mac::update(&mut mac, data);
    let mut out = [0u8; 12];
    out.copy_from_slice(&mac.finalize().into_bytes()[..12]);
    Ok(out)
}

/// Compute the digest of an outgoing message and write it over the
/// 12-byte zero placeholder at `auth_offset`.
pub fn authenticate_message(
    key: &LocalizedKey,
    message: &mut [u8],
    auth_offset: usize,
) -> Result<()> {
    let end = auth_offset + key.protocol().mac_len();
    if end > message.len() {
        return Err(Error::auth(None, AuthErrorKind::AuthParamsNotFound));
    }
    let mac = key.compute_hmac(message)?;
    message[auth_offset..end].copy_from_slice(&mac);
    Ok(())
}

/// Check the digest of an incoming message.
///
/// The digest is recomputed over a copy with the 12 bytes at `auth_offset`
/// zeroed and compared to the received bytes.
pub fn verify_message(key: &LocalizedKey, message: &[u8], auth_offset: usize) -> Result<()> {
    let end = auth_offset + key.protocol().mac_len();
    if end > message.len() {
        return Err(Error::auth(None, AuthErrorKind::AuthParamsNotFound));
    }

    let mut zeroed = message.to_vec();
    zeroed[auth_offset..end].fill(0);
    let expected = key.compute_hmac(&zeroed)?;

    if bool::from(expected[..].ct_eq(&message[auth_offset..end])) {
        Ok(())
    } else {
        tracing::warn!(target: "snmp_session::usm", "authentication digest mismatch");
        Err(Error::auth(None, AuthErrorKind::DigestMismatch))
    }
}
