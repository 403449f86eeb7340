//! Secure string type for credentials such as the kitchen PIN or gateway tokens.
//!
//! `SecretString` zeroes its buffer on drop and never prints its content in
//! logs, debug output or serialized configuration dumps.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroizing;

/// A string holding a secret value.
#[derive(Clone)]
pub struct SecretString(Zeroizing<String>);

impl SecretString {
	/// Wraps a secret value.
	pub fn new(s: String) -> Self {
		Self(Zeroizing::new(s))
	}

	/// Exposes the secret as a string slice.
	///
	/// Only call this at the point where the value leaves the process
	/// (an outbound request body or header).
	pub fn expose_secret(&self) -> &str {
		&self.0
	}

	/// Compares a caller-supplied value against the secret.
	///
	/// The comparison time depends only on the input lengths, not on the
	/// position of the first differing byte.
	pub fn matches(&self, candidate: &str) -> bool {
		let secret = self.0.as_bytes();
		let candidate = candidate.as_bytes();
		let mut diff = secret.len() ^ candidate.len();
		for (i, byte) in candidate.iter().enumerate() {
			let expected = secret.get(i % secret.len().max(1)).copied().unwrap_or(0);
			diff |= usize::from(expected ^ byte);
		}
		diff == 0 && !secret.is_empty()
	}

	/// Returns the length of the secret.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true if the secret is empty.
	pub fn is_empty(&self) -> bool {
		self.0.trim().is_empty()
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SecretString(***REDACTED***)")
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "***REDACTED***")
	}
}

impl From<String> for SecretString {
	fn from(s: String) -> Self {
		Self::new(s)
	}
}

impl From<&str> for SecretString {
	fn from(s: &str) -> Self {
		Self::new(s.to_string())
	}
}

impl PartialEq for SecretString {
	fn eq(&self, other: &Self) -> bool {
		self.matches(other.expose_secret())
	}
}

impl Eq for SecretString {}

impl Serialize for SecretString {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str("***REDACTED***")
	}
}

impl<'de> Deserialize<'de> for SecretString {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Ok(SecretString::new(s))
	}
}
