//! Storage-related types for the takeaway system.

use std::str::FromStr;

/// Namespaces used by the order lifecycle in the key/value store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Order documents, keyed by order id.
	Orders,
	/// Index of every order by creation time.
	OrdersByCreation,
	/// Index of orders that are not archived yet, by creation time.
	OpenOrders,
	/// Liveness probe written by the health endpoint.
	Health,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::OrdersByCreation => "orders_created",
			StorageKey::OpenOrders => "orders_open",
			StorageKey::Health => "health",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Orders,
			Self::OrdersByCreation,
			Self::OpenOrders,
			Self::Health,
		].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all().find(|key| key.as_str() == s).ok_or(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_round_trip_names() {
		for key in StorageKey::all() {
			assert_eq!(key.as_str().parse::<StorageKey>(), Ok(key));
		}
		assert!("quotes".parse::<StorageKey>().is_err());
	}
}
