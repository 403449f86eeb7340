//! Common types module for the takeaway ordering system.
//!
//! This module defines the core data types shared by every crate of the
//! workspace: the order document and its lifecycle enums, the HTTP request
//! and response shapes, configuration validation helpers and a handful of
//! small utilities.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Order document, order lines and lifecycle states.
pub mod order;
/// Phone number normalization.
pub mod phone;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Redacting wrapper for secrets loaded from configuration.
pub mod secret_string;
/// Storage types for managing persistent data.
pub mod storage;
/// Utility functions for formatting identifiers and amounts.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use api::*;
pub use order::*;
pub use phone::normalize_e164;
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use storage::*;
pub use utils::{format_cents, truncate_id};
pub use validation::*;
