//! SMS notification module for the takeaway ordering system.
//!
//! Customers who leave a phone number get one text message when their order
//! is ready for pickup. This crate defines the provider interface, the
//! concrete providers and a small service that bounds every send with a
//! timeout. Deciding *whether* to send is the order lifecycle's job.

use async_trait::async_trait;
use std::time::Duration;
use takeaway_types::{ConfigSchema, ImplementationRegistry};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod bulkgate;
	pub mod log;
}

/// Errors that can occur while sending an SMS.
#[derive(Debug, Error)]
pub enum NotifyError {
	/// The provider could not be reached.
	#[error("Network error: {0}")]
	Network(String),
	/// The provider answered but refused the message.
	#[error("Provider rejected message: {0}")]
	Rejected(String),
	/// The provider did not answer within the configured time.
	#[error("Send timed out after {0:?}")]
	Timeout(Duration),
	/// The provider configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// What a provider reports back after accepting a message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmsReceipt {
	/// Provider-side message id, when the provider returns one.
	pub message_id: Option<String>,
}

/// Interface implemented by every SMS provider.
#[async_trait]
pub trait SmsInterface: Send + Sync {
	/// Returns the configuration schema for this provider.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Sends `text` to the E.164 number `to`.
	async fn send(&self, to: &str, text: &str) -> Result<SmsReceipt, NotifyError>;
}

/// Type alias for SMS provider factory functions.
pub type SmsFactory = fn(&toml::Value) -> Result<Box<dyn SmsInterface>, NotifyError>;

/// Registry trait for SMS provider implementations.
pub trait SmsRegistry: ImplementationRegistry<Factory = SmsFactory> {}

/// Get all registered SMS provider implementations.
pub fn get_all_implementations() -> Vec<(&'static str, SmsFactory)> {
	use implementations::{bulkgate, log};

	vec![
		(bulkgate::Registry::NAME, bulkgate::Registry::factory()),
		(log::Registry::NAME, log::Registry::factory()),
	]
}

/// Sends the ready message through the configured provider.
pub struct NotificationService {
	provider: Box<dyn SmsInterface>,
	ready_message: String,
	timeout: Duration,
}

impl NotificationService {
	/// Creates a service around one provider.
	pub fn new(provider: Box<dyn SmsInterface>, ready_message: String, timeout: Duration) -> Self {
		Self {
			provider,
			ready_message,
			timeout,
		}
	}

	/// Timeout applied to every send.
	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	/// Sends the pickup message to `to`.
	///
	/// A provider that does not answer within the timeout yields
	/// [`NotifyError::Timeout`]; the in-flight request is dropped.
	pub async fn send_ready(&self, to: &str) -> Result<SmsReceipt, NotifyError> {
		match tokio::time::timeout(self.timeout, self.provider.send(to, &self.ready_message)).await {
			Ok(result) => result,
			Err(_) => Err(NotifyError::Timeout(self.timeout)),
		}
	}
}
