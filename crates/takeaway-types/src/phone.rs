//! Heuristic phone number normalization.
//!
//! Customers type numbers the way they are used to locally ("079 123 45 67").
//! The SMS gateway wants an internationally prefixed number, so numbers are
//! brought into a `+<country><subscriber>` form at write time.

/// Minimum number of digits accepted after normalization.
const MIN_DIGITS: usize = 7;
/// Maximum number of digits allowed by E.164.
const MAX_DIGITS: usize = 15;

/// Normalizes a phone number into an E.164-like `+<digits>` form.
///
/// Separators (spaces, parentheses, dashes, dots) are stripped. A leading
/// `00` is read as the international call prefix; a single leading `0`
/// followed by at least eight digits is read as a national number and gets
/// `default_country` (e.g. `+41`) prepended. Returns `None` when the result
/// is not a `+` followed by 7 to 15 digits.
pub fn normalize_e164(input: &str, default_country: &str) -> Option<String> {
	let compact: String = input
		.trim()
		.chars()
		.filter(|c| !matches!(c, ' ' | '\t' | '(' | ')' | '-' | '.'))
		.collect();
	if compact.is_empty() {
		return None;
	}

	let normalized = if compact.starts_with('+') {
		compact
	} else if let Some(rest) = compact.strip_prefix("00") {
		format!("+{}", rest)
	} else if is_national(&compact) {
		format!("{}{}", default_country, compact.trim_start_matches('0'))
	} else {
		return None;
	};

	let digits = &normalized[1..];
	if !digits.chars().all(|c| c.is_ascii_digit()) {
		return None;
	}
	if digits.len() < MIN_DIGITS || digits.len() > MAX_DIGITS {
		return None;
	}

	Some(normalized)
}

fn is_national(s: &str) -> bool {
	s.len() >= 9 && s.starts_with('0') && s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_already_international() {
		assert_eq!(
			normalize_e164("+41791234567", "+41").as_deref(),
			Some("+41791234567")
		);
		assert_eq!(
			normalize_e164(" +41 79 123 45 67 ", "+41").as_deref(),
			Some("+41791234567")
		);
	}

	#[test]
	fn test_national_number_gets_default_country() {
		assert_eq!(
			normalize_e164("079 123 45 67", "+41").as_deref(),
			Some("+41791234567")
		);
		assert_eq!(
			normalize_e164("(079) 123-45.67", "+41").as_deref(),
			Some("+41791234567")
		);
		assert_eq!(
			normalize_e164("0151 2345678", "+49").as_deref(),
			Some("+491512345678")
		);
	}

	#[test]
	fn test_double_zero_prefix() {
		assert_eq!(
			normalize_e164("0041 79 123 45 67", "+41").as_deref(),
			Some("+41791234567")
		);
	}

	#[test]
	fn test_rejects_garbage() {
		assert_eq!(normalize_e164("abc", "+41"), None);
		assert_eq!(normalize_e164("123", "+41"), None);
		assert_eq!(normalize_e164("", "+41"), None);
		assert_eq!(normalize_e164("   ", "+41"), None);
		assert_eq!(normalize_e164("+41abc791234", "+41"), None);
		// no prefix and not a national number
		assert_eq!(normalize_e164("791234567", "+41"), None);
	}

	#[test]
	fn test_digit_bounds() {
		assert_eq!(normalize_e164("+123456", "+41"), None);
		assert_eq!(
			normalize_e164("+1234567", "+41").as_deref(),
			Some("+1234567")
		);
		assert_eq!(
			normalize_e164("+123456789012345", "+41").as_deref(),
			Some("+123456789012345")
		);
		assert_eq!(normalize_e164("+1234567890123456", "+41"), None);
	}
}
