//! Privacy (encryption) for SNMPv3 (RFC 3414 Section 8).
//!
//! CBC-DES:
//! - key: first 8 bytes of the localized privacy key
//! - pre-IV: the next 8 bytes
//! - salt: engine boots (fixed at 1) followed by 4 random bytes
//! - IV: pre-IV XOR salt
//!
//! The salt travels in msgPrivacyParameters.

use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use super::{LocalizedKey, PrivProtocol};
use crate::error::{CryptoErrorKind, Error, Result};

type DesCbcEnc = cbc::Encryptor<des::Des>;
type DesCbcDec = cbc::Decryptor<des::Des>;

const BLOCK_SIZE: usize = 8;
/// No persistent boots counter is kept; every salt claims boot 1.
const SALT_BOOTS: [u8; 4] = [0, 0, 0, 1];

/// Localized privacy key.
#[derive(Clone)]
pub struct PrivKey {
    protocol: PrivProtocol,
    key: LocalizedKey,
}

impl PrivKey {
    pub fn new(protocol: PrivProtocol, key: LocalizedKey) -> Self {
        Self { protocol, key }
    }

    pub fn protocol(&self) -> PrivProtocol {
        self.protocol
    }

    fn split(&self) -> Result<(&[u8], &[u8])> {
        let bytes = self.key.as_bytes();
        if bytes.len() < 2 * BLOCK_SIZE {
            return Err(Error::encrypt(None, CryptoErrorKind::InvalidKeyLength));
        }
        Ok((&bytes[..BLOCK_SIZE], &bytes[BLOCK_SIZE..2 * BLOCK_SIZE]))
    }

    /// Fresh salt for one outgoing message.
    pub fn new_salt() -> Result<[u8; 8]> {
        let mut salt = [0u8; 8];
        salt[..4].copy_from_slice(&SALT_BOOTS);
        getrandom::fill(&mut salt[4..])
            .map_err(|_| Error::encrypt(None, CryptoErrorKind::CipherError))?;
        Ok(salt)
    }

    /// Zero-pad to a whole number of blocks and encrypt.
    pub fn encrypt(&self, plaintext: &[u8], salt: &[u8; 8]) -> Result<Vec<u8>> {
        let (key, pre_iv) = self.split()?;
        let iv = xor_iv(pre_iv, salt);

        let padded_len = plaintext.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
        let mut buffer = vec![0u8; padded_len];
        buffer[..plaintext.len()].copy_from_slice(plaintext);

        let cipher = DesCbcEnc::new_from_slices(key, &iv)
            .map_err(|_| Error::encrypt(None, CryptoErrorKind::InvalidKeyLength))?;
        cipher
            .encrypt_padded_mut::<NoPadding>(&mut buffer, padded_len)
            .map_err(|_| Error::encrypt(None, CryptoErrorKind::CipherError))?;
        Ok(buffer)
    }

    /// Decrypt with the salt carried by the message.
    ///
    /// Padding is left in place; BER decoding of the scoped PDU stops at
    /// its own length.
    pub fn decrypt(&self, ciphertext: &[u8], priv_params: &[u8]) -> Result<Vec<u8>> {
        let salt: &[u8; 8] = priv_params.try_into().map_err(|_| {
            Error::decrypt(
                None,
                CryptoErrorKind::InvalidPrivParamsLength {
                    expected: 8,
                    actual: priv_params.len(),
                },
            )
        })?;
        if ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(Error::decrypt(
                None,
                CryptoErrorKind::InvalidCiphertextLength {
                    length: ciphertext.len(),
                    block_size: BLOCK_SIZE,
                },
            ));
        }

        let (key, pre_iv) = self
            .split()
            .map_err(|_| Error::decrypt(None, CryptoErrorKind::InvalidKeyLength))?;
        let iv = xor_iv(pre_iv, salt);

        let cipher = DesCbcDec::new_from_slices(key, &iv)
            .map_err(|_| Error::decrypt(None, CryptoErrorKind::InvalidKeyLength))?;
        let mut buffer = ciphertext.to_vec();
        cipher
            .decrypt_padded_mut::<NoPadding>(&mut buffer)
            .map_err(|_| Error::decrypt(None, CryptoErrorKind::CipherError))?;
        Ok(buffer)
    }
}

fn xor_iv(pre_iv: &[u8], salt: &[u8; 8]) -> [u8; 8] {
    let mut iv = [0u8; 8];
    for (out, (p, s)) in iv.iter_mut().zip(pre_iv.iter().zip(salt)) {
        *out = p ^ s;
    }
    iv
}

impl std::fmt::Debug for PrivKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivKey")
            .field("protocol", &self.protocol)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
