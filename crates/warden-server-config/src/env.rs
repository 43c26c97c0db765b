// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secret loading from `NAME` or `NAME_FILE` environment variables.

use std::path::PathBuf;
use thiserror::Error;
use warden_common_secret::SecretString;

#[derive(Debug, Error)]
pub enum SecretEnvError {
	#[error("both {name} and {name}_FILE are set; use only one")]
	Ambiguous { name: String },

	#[error("failed to read {name}_FILE at {path}: {source}")]
	FileRead {
		name: String,
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

/// Loads a secret from `name`, or from the file named by `name_FILE`.
///
/// Trailing newlines in the file are stripped. Empty values count as unset.
pub fn load_secret_env(name: &str) -> Result<Option<SecretString>, SecretEnvError> {
	let direct = std::env::var(name).ok().filter(|v| !v.is_empty());
	let file_var = format!("{name}_FILE");
	let file = std::env::var(&file_var).ok().filter(|v| !v.is_empty());
	resolve_secret(name, direct, file.map(PathBuf::from))
}

fn resolve_secret(
	name: &str,
	direct: Option<String>,
	file: Option<PathBuf>,
) -> Result<Option<SecretString>, SecretEnvError> {
	match (direct, file) {
		(Some(_), Some(_)) => Err(SecretEnvError::Ambiguous {
			name: name.to_string(),
		}),
		(Some(value), None) => Ok(Some(SecretString::new(value))),
		(None, Some(path)) => {
			let contents = std::fs::read_to_string(&path).map_err(|source| SecretEnvError::FileRead {
				name: name.to_string(),
				path: path.clone(),
				source,
			})?;
			let value = contents.trim_end_matches(&['\r', '\n'][..]).to_string();
			Ok((!value.is_empty()).then(|| SecretString::new(value)))
		}
		(None, None) => Ok(None),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn direct_value() {
		let secret = resolve_secret("KEY", Some("abc".to_string()), None).unwrap().unwrap();
		assert_eq!(secret.expose(), "abc");
	}

	#[test]
	fn file_value_strips_newline() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "from-file").unwrap();
		let secret = resolve_secret("KEY", None, Some(file.path().to_path_buf()))
			.unwrap()
			.unwrap();
		assert_eq!(secret.expose(), "from-file");
	}

	#[test]
	fn both_set_is_rejected() {
		let result = resolve_secret("KEY", Some("a".to_string()), Some(PathBuf::from("/tmp/x")));
		assert!(matches!(result, Err(SecretEnvError::Ambiguous { .. })));
	}

	#[test]
	fn missing_file_is_an_error() {
		let result = resolve_secret("KEY", None, Some(PathBuf::from("/nonexistent/warden-key")));
		assert!(matches!(result, Err(SecretEnvError::FileRead { .. })));
	}

	#[test]
	fn unset_is_none() {
		assert!(resolve_secret("KEY", None, None).unwrap().is_none());
	}
}
