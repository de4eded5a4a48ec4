//! Built-in handlers.
//!
//! Each handler module exposes an `entry()` returning its registration
//! record; [`builtin_registry`] collects them in a fixed order.

pub mod ping;

use crate::dispatch::HandlerRegistry;

/// Registry holding every built-in handler.
pub fn builtin_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(ping::entry());
    registry
}
