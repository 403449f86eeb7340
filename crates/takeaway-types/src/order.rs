//! Order types for the takeaway shop.
//!
//! An order is stored as a single document: the lines are embedded and never
//! queried on their own. This module also holds the two lifecycle enums
//! (kitchen status and payment status) and the archive predicate.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A persisted customer order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
	/// Unique identifier (UUID v4), assigned at creation.
	pub id: String,
	/// Ordered lines as submitted by the customer.
	pub lines: Vec<OrderLine>,
	/// Total in minor currency units, as submitted.
	pub total_cents: i64,
	/// Kitchen status.
	#[serde(default)]
	pub status: OrderStatus,
	/// Optional contact email.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub customer_email: Option<String>,
	/// Optional contact phone, already normalized to `+<digits>`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub customer_phone: Option<String>,
	/// Whether the ready SMS has been delivered to the gateway.
	#[serde(default)]
	pub sms_notified: bool,
	/// Start of an in-flight ready SMS send, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sms_claimed_at: Option<DateTime<Utc>>,
	/// Payment state reported by the payment provider.
	#[serde(default)]
	pub payment_status: PaymentStatus,
	/// Name of the payment provider that handled this order.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub payment_provider: Option<String>,
	/// Provider-side correlation id (gateway or transaction id).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub payment_ref: Option<String>,
	/// ISO currency code of `total_cents`.
	pub currency: String,
	/// Creation time.
	pub created_at: DateTime<Utc>,
	/// Last status change.
	pub updated_at: DateTime<Utc>,
}

impl Order {
	/// Returns true when the order belongs to the archive view at `now`.
	///
	/// An order is archived once it has been picked up and at least `grace`
	/// has elapsed since its last status change. The boundary instant itself
	/// is archived, so every order lands in exactly one view.
	pub fn is_archived(&self, now: DateTime<Utc>, grace: Duration) -> bool {
		self.status == OrderStatus::PickedUp && now - self.updated_at >= grace
	}
}

/// One menu item selection within an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderLine {
	/// Client-side line id.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	/// Snapshot of the ordered item.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub item: Option<LineItem>,
	/// Quantity, at least 1.
	pub qty: u32,
	/// Unit price when the client sends it on the line instead of the item.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub price_cents: Option<i64>,
	/// Selected choices per option group (group id -> choice ids).
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub specs: BTreeMap<String, Vec<String>>,
	/// Free-text note for the kitchen.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub note: Option<String>,
	/// Fields this version does not know about, kept verbatim.
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The item referenced by an order line.
///
/// Current clients send a full menu snapshot; a bare name is accepted too.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LineItem {
	Snapshot(MenuItemSnapshot),
	Name(String),
}

impl LineItem {
	/// Display name of the item.
	pub fn name(&self) -> &str {
		match self {
			LineItem::Snapshot(item) => &item.name,
			LineItem::Name(name) => name,
		}
	}
}

/// Menu item as it looked when the order was placed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MenuItemSnapshot {
	pub id: String,
	pub name: String,
	pub price_cents: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub emoji: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub options: Vec<OptionGroup>,
}

/// A customization group of a menu item (e.g. sauce, salad).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptionGroup {
	pub id: String,
	pub label: String,
	#[serde(rename = "type")]
	pub kind: OptionKind,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub required: Option<bool>,
	#[serde(default)]
	pub choices: Vec<OptionChoice>,
}

/// Whether one or several choices may be picked in a group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
	Single,
	Multi,
}

/// A single selectable choice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptionChoice {
	pub id: String,
	pub label: String,
}

/// Kitchen status of an order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	/// Accepted, waiting for the kitchen.
	#[default]
	InQueue,
	/// Being prepared.
	Preparing,
	/// Ready for pickup.
	Ready,
	/// Handed over to the customer.
	PickedUp,
}

impl OrderStatus {
	/// All statuses in lifecycle order.
	pub const ALL: [OrderStatus; 4] = [
		OrderStatus::InQueue,
		OrderStatus::Preparing,
		OrderStatus::Ready,
		OrderStatus::PickedUp,
	];

	/// Wire representation.
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::InQueue => "in_queue",
			OrderStatus::Preparing => "preparing",
			OrderStatus::Ready => "ready",
			OrderStatus::PickedUp => "picked_up",
		}
	}

	/// Position along the lifecycle, starting at 0 for `in_queue`.
	pub fn rank(&self) -> u8 {
		match self {
			OrderStatus::InQueue => 0,
			OrderStatus::Preparing => 1,
			OrderStatus::Ready => 2,
			OrderStatus::PickedUp => 3,
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when a string is not one of the four statuses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid status: {0}")]
pub struct InvalidStatus(pub String);

impl FromStr for OrderStatus {
	type Err = InvalidStatus;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		OrderStatus::ALL
			.into_iter()
			.find(|status| status.as_str() == s)
			.ok_or_else(|| InvalidStatus(s.to_string()))
	}
}

/// Payment state of an order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
	#[default]
	Unpaid,
	Paid,
	Failed,
}

impl fmt::Display for PaymentStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PaymentStatus::Unpaid => write!(f, "unpaid"),
			PaymentStatus::Paid => write!(f, "paid"),
			PaymentStatus::Failed => write!(f, "failed"),
		}
	}
}
