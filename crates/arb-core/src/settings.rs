//! Read access to hot-reloadable settings.

/// Source of the current value of a settings section.
///
/// Implemented by the application's config handle, which swaps values
/// under a lock when the config file changes. Components call `current()`
/// once per unit of work and use that copy throughout.
pub trait ConfigSource<T>: Send + Sync {
    fn current(&self) -> T;
}

/// Settings that never change. Used in tests and for static wiring.
#[derive(Debug, Clone, Default)]
pub struct FixedConfig<T>(pub T);

impl<T: Clone + Send + Sync> ConfigSource<T> for FixedConfig<T> {
    fn current(&self) -> T {
        self.0.clone()
    }
}
