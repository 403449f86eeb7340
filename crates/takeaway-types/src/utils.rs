//! Small formatting helpers used in logs and messages.

/// Shortens an identifier for log output.
///
/// Shows only the first 8 characters followed by ".." for longer ids.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((idx, _)) => format!("{}..", &id[..idx]),
		None => id.to_string(),
	}
}

/// Formats a minor-unit amount as `12.50 CHF`.
pub fn format_cents(cents: i64, currency: &str) -> String {
	let sign = if cents < 0 { "-" } else { "" };
	let abs = cents.unsigned_abs();
	format!("{}{}.{:02} {}", sign, abs / 100, abs % 100, currency)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("abc"), "abc");
		assert_eq!(truncate_id("12345678"), "12345678");
		assert_eq!(
			truncate_id("3f2a9c1e-7d4b-4c2a-9e1f-0a1b2c3d4e5f"),
			"3f2a9c1e.."
		);
	}

	#[test]
	fn test_format_cents() {
		assert_eq!(format_cents(3800, "CHF"), "38.00 CHF");
		assert_eq!(format_cents(5, "EUR"), "0.05 EUR");
		assert_eq!(format_cents(-250, "CHF"), "-2.50 CHF");
	}
}
