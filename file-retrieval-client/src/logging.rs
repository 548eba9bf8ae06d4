//! Logging utilities.

use slog::Logger;

/// Extension trait for `slog::Logger`
pub trait LoggerExtensions {
    /// Create a new child logger with a `src` key containing the name of the given component.
    fn new_with_component_name<T>(&self) -> Self;
}

impl LoggerExtensions for Logger {
    fn new_with_component_name<T>(&self) -> Self {
        self.new(slog::o!("src" => component_name::<T>()))
    }
}

/// Short name of a type: no module path, no generic parameters.
fn component_name<T>() -> &'static str {
    let type_name = std::any::type_name::<T>();
    let without_generics = type_name.split('<').next().unwrap_or(type_name);

    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}
