//! Registry trait for self-registering implementations.
//!
//! Storage backends, SMS providers and payment providers each expose a
//! `Registry` unit struct so the service can discover them by the name used
//! in configuration.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation,
	/// e.g. `"file"` for `[storage.implementations.file]` or `"bulkgate"` for
	/// `[notification.implementations.bulkgate]`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Returns the factory that builds this implementation from its TOML table.
	fn factory() -> Self::Factory;
}
