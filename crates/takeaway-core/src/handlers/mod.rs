//! Side effects of the order lifecycle.
//!
//! The notification handler sends the ready SMS; the payment handler opens
//! checkout sessions and applies provider webhooks to orders.

pub mod notification;
pub mod payment;

pub use notification::{DispatchOutcome, NotificationDispatcher, SkipReason};
pub use payment::{PaymentHandler, PaymentHandlerError};
