// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secret generation policy for rotated passwords.
//!
//! Minimum counts per character class are placed deterministically and the
//! remainder is filled from the classes that were asked for, then the whole
//! buffer is shuffled. The minimums are therefore guaranteed, not sampled.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use warden_common_secret::SecretString;

pub const MIN_PASSWORD_LENGTH: usize = 1;
pub const MAX_PASSWORD_LENGTH: usize = 250;
pub const DEFAULT_PASSWORD_LENGTH: usize = 48;
pub const DEFAULT_ALLOWED_SYMBOLS: &str = "-_.~!*";

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PasswordPolicyError {
	#[error("password length {0} is outside {MIN_PASSWORD_LENGTH}..={MAX_PASSWORD_LENGTH}")]
	InvalidLength(usize),

	#[error("required characters ({required}) exceed password length ({length})")]
	RequiredExceedsLength { required: usize, length: usize },

	#[error("symbols are required but no allowed symbols are configured")]
	NoAllowedSymbols,

	#[error("allowed symbols must be printable non-alphanumeric ASCII: {0:?}")]
	InvalidSymbol(char),

	#[error("generated password violated policy: {0}")]
	Unsatisfied(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequiredCharacters {
	pub lowercase: usize,
	pub uppercase: usize,
	pub digits: usize,
	pub symbols: usize,
}

impl RequiredCharacters {
	/// Sum of the per-class minimums, `None` if it overflows.
	pub fn total(&self) -> Option<usize> {
		self.lowercase
			.checked_add(self.uppercase)?
			.checked_add(self.digits)?
			.checked_add(self.symbols)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordRequirements {
	pub length: usize,
	pub required: RequiredCharacters,
	#[serde(default)]
	pub allowed_symbols: Option<String>,
}

impl Default for PasswordRequirements {
	fn default() -> Self {
		Self {
			length: DEFAULT_PASSWORD_LENGTH,
			required: RequiredCharacters {
				lowercase: 1,
				uppercase: 1,
				digits: 1,
				symbols: 0,
			},
			allowed_symbols: None,
		}
	}
}

impl PasswordRequirements {
	pub fn symbols(&self) -> &str {
		self.allowed_symbols.as_deref().unwrap_or(DEFAULT_ALLOWED_SYMBOLS)
	}

	pub fn validate(&self) -> Result<(), PasswordPolicyError> {
		if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&self.length) {
			return Err(PasswordPolicyError::InvalidLength(self.length));
		}
		match self.required.total() {
			Some(required) if required <= self.length => {}
			required => {
				return Err(PasswordPolicyError::RequiredExceedsLength {
					required: required.unwrap_or(usize::MAX),
					length: self.length,
				});
			}
		}
		if let Some(bad) = self
			.symbols()
			.chars()
			.find(|c| !c.is_ascii_graphic() || c.is_ascii_alphanumeric())
		{
			return Err(PasswordPolicyError::InvalidSymbol(bad));
		}
		if self.required.symbols > 0 && self.symbols().is_empty() {
			return Err(PasswordPolicyError::NoAllowedSymbols);
		}
		Ok(())
	}

	/// Whether `value` meets every length and per-class minimum.
	pub fn is_satisfied_by(&self, value: &str) -> bool {
		let symbols = self.symbols();
		let count = |pred: &dyn Fn(char) -> bool| value.chars().filter(|c| pred(*c)).count();

		value.chars().count() == self.length
			&& count(&|c| c.is_ascii_lowercase()) >= self.required.lowercase
			&& count(&|c| c.is_ascii_uppercase()) >= self.required.uppercase
			&& count(&|c| c.is_ascii_digit()) >= self.required.digits
			&& count(&|c| symbols.contains(c)) >= self.required.symbols
	}
}

/// Generates a password meeting `requirements`.
///
/// When no class has a minimum, the filler is drawn from letters and digits.
pub fn generate_password(
	requirements: &PasswordRequirements,
) -> Result<SecretString, PasswordPolicyError> {
	requirements.validate()?;

	let symbols = requirements.symbols().as_bytes();
	let classes: [(&[u8], usize); 4] = [
		(LOWERCASE, requirements.required.lowercase),
		(UPPERCASE, requirements.required.uppercase),
		(DIGITS, requirements.required.digits),
		(symbols, requirements.required.symbols),
	];

	let mut rng = OsRng;
	let mut buf: Vec<u8> = Vec::with_capacity(requirements.length);

	for (charset, min) in classes {
		for _ in 0..min {
			buf.push(charset[rng.gen_range(0..charset.len())]);
		}
	}

	let mut filler: Vec<u8> = classes
		.iter()
		.filter(|(_, min)| *min > 0)
		.flat_map(|(charset, _)| charset.iter().copied())
		.collect();
	if filler.is_empty() {
		filler = [LOWERCASE, UPPERCASE, DIGITS].concat();
	}
	while buf.len() < requirements.length {
		buf.push(filler[rng.gen_range(0..filler.len())]);
	}

	buf.shuffle(&mut rng);

	let value = String::from_utf8(buf)
		.map_err(|_| PasswordPolicyError::Unsatisfied("non-ascii output"))?;
	if !requirements.is_satisfied_by(&value) {
		return Err(PasswordPolicyError::Unsatisfied("class minimums not met"));
	}
	Ok(SecretString::new(value))
}
