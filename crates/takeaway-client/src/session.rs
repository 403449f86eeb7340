//! Orders placed in one customer session.
//!
//! The ids are kept newest first in a small JSON file so a returning
//! customer still sees their orders. [`StatusBoard`] polls those orders and
//! reports each one the first time it is seen ready.

use crate::{ClientError, OrderClient};
use futures::future::join_all;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use takeaway_types::{OrderResponse, OrderStatus};

/// Persistent list of order ids, newest first.
#[derive(Debug, Clone)]
pub struct SessionStore {
	path: PathBuf,
	ids: Vec<String>,
}

impl SessionStore {
	/// Loads the ids stored at `path`.
	///
	/// A missing or unreadable file, a body that is not a JSON array and
	/// non-string entries all read as absent.
	pub async fn load(path: impl AsRef<Path>) -> Self {
		let path = path.as_ref().to_path_buf();
		let ids = match tokio::fs::read(&path).await {
			Ok(bytes) => parse_ids(&bytes),
			Err(e) => {
				if e.kind() != std::io::ErrorKind::NotFound {
					tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable session file");
				}
				Vec::new()
			},
		};
		Self { path, ids }
	}

	pub fn ids(&self) -> &[String] {
		&self.ids
	}

	/// Puts `id` in front. Returns false when it was already the newest entry.
	pub fn add(&mut self, id: &str) -> bool {
		if self.ids.first().map(String::as_str) == Some(id) {
			return false;
		}
		self.ids.retain(|existing| existing != id);
		self.ids.insert(0, id.to_string());
		true
	}

	/// Forgets `id`. Returns whether it was present.
	pub fn remove(&mut self, id: &str) -> bool {
		let before = self.ids.len();
		self.ids.retain(|existing| existing != id);
		self.ids.len() != before
	}

	/// Writes the ids back to disk via a temporary file and rename.
	pub async fn persist(&self) -> Result<(), ClientError> {
		let bytes =
			serde_json::to_vec(&self.ids).map_err(|e| ClientError::Session(e.to_string()))?;
		if let Some(parent) = self.path.parent() {
			if !parent.as_os_str().is_empty() {
				tokio::fs::create_dir_all(parent)
					.await
					.map_err(|e| ClientError::Session(e.to_string()))?;
			}
		}
		let temp = self.path.with_extension("tmp");
		tokio::fs::write(&temp, bytes)
			.await
			.map_err(|e| ClientError::Session(e.to_string()))?;
		tokio::fs::rename(&temp, &self.path)
			.await
			.map_err(|e| ClientError::Session(e.to_string()))
	}
}

fn parse_ids(bytes: &[u8]) -> Vec<String> {
	match serde_json::from_slice::<serde_json::Value>(bytes) {
		Ok(serde_json::Value::Array(entries)) => {
			let mut ids: Vec<String> = Vec::with_capacity(entries.len());
			for id in entries.iter().filter_map(|entry| entry.as_str()) {
				if !ids.iter().any(|known| known == id) {
					ids.push(id.to_string());
				}
			}
			ids
		},
		_ => Vec::new(),
	}
}

/// Last known state of one session order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSnapshot {
	pub id: String,
	/// `None` while the order could not be fetched.
	pub order: Option<OrderResponse>,
}

impl OrderSnapshot {
	fn is_picked_up(&self) -> bool {
		matches!(&self.order, Some(order) if order.status == OrderStatus::PickedUp)
	}
}

/// Result of one poll over the session orders.
#[derive(Debug, Clone, Default)]
pub struct StatusRefresh {
	/// Open orders first, picked-up orders last, otherwise newest first.
	pub orders: Vec<OrderSnapshot>,
	/// Orders seen ready for the first time.
	pub newly_ready: Vec<String>,
}

/// Polls session orders and remembers which ready orders were announced.
#[derive(Debug, Default)]
pub struct StatusBoard {
	announced: HashSet<String>,
}

impl StatusBoard {
	pub fn new() -> Self {
		Self::default()
	}

	/// Fetches every order of the session concurrently.
	pub async fn refresh(&mut self, client: &OrderClient, session: &SessionStore) -> StatusRefresh {
		let fetches = session.ids().iter().map(|id| async move {
			let order = match client.get_order(id).await {
				Ok(order) => Some(order),
				Err(e) => {
					tracing::debug!(order_id = %id, error = %e, "Order refresh failed");
					None
				},
			};
			OrderSnapshot {
				id: id.clone(),
				order,
			}
		});
		let snapshots = join_all(fetches).await;
		self.apply(snapshots)
	}

	fn apply(&mut self, snapshots: Vec<OrderSnapshot>) -> StatusRefresh {
		let mut newly_ready = Vec::new();
		for snapshot in &snapshots {
			let ready = matches!(&snapshot.order, Some(order) if order.status == OrderStatus::Ready);
			if ready && self.announced.insert(snapshot.id.clone()) {
				newly_ready.push(snapshot.id.clone());
			}
		}

		let (mut orders, picked_up): (Vec<_>, Vec<_>) =
			snapshots.into_iter().partition(|s| !s.is_picked_up());
		orders.extend(picked_up);
		StatusRefresh {
			orders,
			newly_ready,
		}
	}
}
