//! Handler registry: the process-wide mapping from handler name to handler.
//!
//! The registry is populated once at process start from the fixed set of
//! compiled-in handlers and is read-only thereafter. The trigger engine must
//! never skip a misconfigured job because of a registration race, so there is
//! no dynamic registration during steady-state operation.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::core::JobHandler;

/// Errors from handler registration and resolution.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A handler name was registered twice. Fatal at process start.
    #[error("duplicate handler registration: {0}")]
    Duplicate(String),

    /// No handler is registered under the requested name. Terminal for the
    /// fire that hit it; never retried.
    #[error("unknown handler: {0}")]
    Unknown(String),
}

/// Builder that collects handlers before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl RegistryBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler to a name.
    ///
    /// Fails if the name is already bound; duplicate registration is a
    /// configuration error that should abort process start.
    pub fn register(
        mut self,
        name: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) -> Result<Self, RegistryError> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.handlers.insert(name, handler);
        Ok(self)
    }

    /// Freeze the registry. No further registration is possible.
    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

/// Immutable name → handler map, shared across the scheduler.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Resolve a handler by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn JobHandler>, RegistryError> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))
    }

    /// Whether a handler is registered under the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Iterate over registered handler names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
