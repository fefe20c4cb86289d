//! Tunnel credential unwrap.
//!
//! The control plane seals tunnel credentials with the agent identity:
//!
//! ```text
//! base64_no_pad( nonce(12) || AES-256-GCM(ciphertext || tag) )
//! ```
//!
//! The AES key is the lowercase hex MD5 digest of the identity, used as 32
//! ASCII bytes.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use md5::{Digest, Md5};
use rand::RngCore;

use crate::error::CredentialError;

const NONCE_BYTES: usize = 12;

fn cipher_for(passphrase: &str) -> Result<Aes256Gcm, CredentialError> {
    let key = hex::encode(Md5::digest(passphrase.as_bytes()));
    Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CredentialError::Decrypt)
}

/// Decode and decrypt sealed tunnel credentials.
pub fn unwrap_credentials(encoded: &str, edge_id: &str) -> Result<String, CredentialError> {
    let sealed = STANDARD_NO_PAD.decode(encoded)?;
    let plaintext = decrypt(&sealed, edge_id)?;
    String::from_utf8(plaintext).map_err(|_| CredentialError::InvalidUtf8)
}

/// Decrypt a nonce-prefixed AES-GCM payload.
pub fn decrypt(sealed: &[u8], passphrase: &str) -> Result<Vec<u8>, CredentialError> {
    if sealed.len() < NONCE_BYTES {
        return Err(CredentialError::Decrypt);
    }

    let (nonce, ciphertext) = sealed.split_at(NONCE_BYTES);
    cipher_for(passphrase)?
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CredentialError::Decrypt)
}

/// Seal credentials for an agent identity. Inverse of [`unwrap_credentials`].
pub fn seal_credentials(credentials: &str, edge_id: &str) -> Result<String, CredentialError> {
    let mut nonce_bytes = [0u8; NONCE_BYTES];
    rand::rng().fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher_for(edge_id)?
        .encrypt(Nonce::from_slice(&nonce_bytes), credentials.as_bytes())
        .map_err(|_| CredentialError::Encrypt)?;

    let mut sealed = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(STANDARD_NO_PAD.encode(sealed))
}
