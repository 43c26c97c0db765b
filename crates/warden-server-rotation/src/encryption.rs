// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Envelope encryption for rotated slot secrets.
//!
//! Each value is encrypted with its own random data key (DEK); the DEK is
//! encrypted with the master key (KEK). Both layers use AES-256-GCM.

use aes_gcm::{
	aead::{Aead, KeyInit, OsRng},
	Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use warden_common_secret::SecretString;
use warden_credentials_core::SealedSecret;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{Result, RotationError};

/// Size of encryption keys in bytes (256 bits for AES-256).
pub const KEY_SIZE: usize = 32;

/// Size of AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Generate a random encryption key.
pub fn generate_key() -> Zeroizing<[u8; KEY_SIZE]> {
	let mut key = Zeroizing::new([0u8; KEY_SIZE]);
	OsRng.fill_bytes(key.as_mut());
	key
}

/// Random 96-bit nonce. A (key, nonce) pair is never reused because every
/// value gets a fresh DEK.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
	let mut nonce = [0u8; NONCE_SIZE];
	OsRng.fill_bytes(&mut nonce);
	nonce
}

fn encrypt_with(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
	let nonce_bytes = generate_nonce();
	let ciphertext = cipher
		.encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
		.map_err(|e| RotationError::Encryption(e.to_string()))?;
	Ok((ciphertext, nonce_bytes.to_vec()))
}

fn decrypt_with(key: &[u8; KEY_SIZE], ciphertext: &[u8], nonce: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
	if nonce.len() != NONCE_SIZE {
		return Err(RotationError::Decryption(format!(
			"nonce must be {NONCE_SIZE} bytes, got {}",
			nonce.len()
		)));
	}
	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
	cipher
		.decrypt(Nonce::from_slice(nonce), ciphertext)
		.map(Zeroizing::new)
		.map_err(|e| RotationError::Decryption(e.to_string()))
}

/// The key-encryption key all slot secrets are sealed under.
#[derive(Clone)]
pub struct MasterKey {
	key: Zeroizing<[u8; KEY_SIZE]>,
}

impl std::fmt::Debug for MasterKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("MasterKey([REDACTED])")
	}
}

impl MasterKey {
	pub fn generate() -> Self {
		Self { key: generate_key() }
	}

	pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
		if bytes.len() != KEY_SIZE {
			return Err(RotationError::InvalidKeySize {
				expected: KEY_SIZE,
				actual: bytes.len(),
			});
		}
		let mut key = Zeroizing::new([0u8; KEY_SIZE]);
		key.copy_from_slice(bytes);
		Ok(Self { key })
	}

	/// Parses a standard base64 encoded 32-byte key.
	pub fn from_base64(encoded: &SecretString) -> Result<Self> {
		let mut bytes = STANDARD
			.decode(encoded.expose().trim())
			.map_err(|e| RotationError::InvalidRequest(format!("master key is not base64: {e}")))?;
		let key = Self::from_bytes(&bytes);
		bytes.zeroize();
		key
	}

	pub fn seal(&self, plaintext: &SecretString) -> Result<SealedSecret> {
		let dek = generate_key();
		let (ciphertext, nonce) = encrypt_with(&dek, plaintext.expose().as_bytes())?;
		let (wrapped_key, key_nonce) = encrypt_with(&self.key, dek.as_slice())?;
		Ok(SealedSecret {
			ciphertext,
			nonce,
			wrapped_key,
			key_nonce,
		})
	}

	pub fn open(&self, sealed: &SealedSecret) -> Result<SecretString> {
		let dek_bytes = decrypt_with(&self.key, &sealed.wrapped_key, &sealed.key_nonce)?;
		if dek_bytes.len() != KEY_SIZE {
			return Err(RotationError::InvalidKeySize {
				expected: KEY_SIZE,
				actual: dek_bytes.len(),
			});
		}
		let mut dek = Zeroizing::new([0u8; KEY_SIZE]);
		dek.copy_from_slice(&dek_bytes);

		let plaintext = decrypt_with(&dek, &sealed.ciphertext, &sealed.nonce)?;
		let value = String::from_utf8(plaintext.to_vec())
			.map_err(|_| RotationError::Decryption("secret is not valid UTF-8".to_string()))?;
		Ok(SecretString::new(value))
	}
}
