//! State management for orders.
//!
//! The order store is the only writer of order documents; handlers and the
//! HTTP layer go through it for every read and mutation.

pub mod order;

pub use order::{OrderStore, OrderStoreError, OrderStoreSettings, SmsClaim};
