// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ltpa project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Cryptographic primitives used by the token codec
//!
//! * Signature: RSASSA-PKCS1-v1_5 over a SHA-256 digest
//! * Payload cipher: AES-128-CBC with PKCS#7 padding, key and IV taken from
//!   the first 16 bytes of the shared key
//!
//! The cipher carries no integrity tag. Tampering is only detected by the
//! signature check that follows decryption.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rsa::sha2::{Digest, Sha256};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};

use crate::error::{LtpaError, Result};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Bytes of the shared key used as AES key and as IV
pub const CIPHER_KEY_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

fn cipher_key(shared_key: &[u8]) -> Result<&[u8]> {
    shared_key
        .get(..CIPHER_KEY_LEN)
        .ok_or_else(|| LtpaError::key_material("shared key is shorter than 16 bytes"))
}

fn digest(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

/// Sign the SHA-256 digest of `data`
pub fn sign(private_key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>> {
    private_key
        .sign(Pkcs1v15Sign::new::<Sha256>(), &digest(data))
        .map_err(|e| LtpaError::creation(format!("signing failed: {}", e)))
}

/// Check `signature` against the SHA-256 digest of `data`
pub fn verify(public_key: &RsaPublicKey, data: &[u8], signature: &[u8]) -> Result<()> {
    public_key
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest(data), signature)
        .map_err(|_| LtpaError::invalid("signature verification failed"))
}

pub fn encrypt(shared_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let key = cipher_key(shared_key)?;
    let cipher = Aes128CbcEnc::new_from_slices(key, key)
        .map_err(|_| LtpaError::key_material("invalid cipher key length"))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Decrypt a payload; any failure means the key set does not match
pub fn decrypt(shared_key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(LtpaError::invalid("ciphertext length is not a block multiple"));
    }
    let key = cipher_key(shared_key).map_err(|_| LtpaError::invalid("token could not be decrypted"))?;
    let cipher = Aes128CbcDec::new_from_slices(key, key)
        .map_err(|_| LtpaError::invalid("token could not be decrypted"))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| LtpaError::invalid("token could not be decrypted"))
}
