//! Named handler registry.
//!
//! Statically configured consumers refer to handlers by name. The registry
//! maps those names to factories and turns a configured
//! `topic → handler` map into loop [`Binding`]s.

use crate::consumer::Binding;
use crate::error::{ConsumeError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use stream_bus_core::{ConsumerBinding, MessageHandler};

type HandlerFactory =
    Arc<dyn Fn() -> anyhow::Result<Arc<dyn MessageHandler>> + Send + Sync + 'static>;

/// Handler name → factory.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    factories: BTreeMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any previous entry.
    #[must_use]
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Arc<dyn MessageHandler>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Register a shared handler instance under `name`.
    #[must_use]
    pub fn register_instance(
        self,
        name: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        self.register(name, move || Ok(Arc::clone(&handler)))
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Construct the handler registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumeError::Config`] if `name` is unknown or its factory fails.
    pub fn build(&self, name: &str) -> Result<Arc<dyn MessageHandler>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            ConsumeError::Config(format!(
                "unknown handler '{name}' (available: {})",
                self.names().join(", ")
            ))
        })?;

        factory().map_err(|e| {
            ConsumeError::Config(format!("handler '{name}' could not be constructed: {e:#}"))
        })
    }

    /// Resolve configured consumers into bindings, in topic order.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumeError::Config`] for the first handler that cannot be built.
    pub fn bindings_from_config(
        &self,
        consumers: &BTreeMap<String, ConsumerBinding>,
    ) -> Result<Vec<Binding>> {
        consumers
            .iter()
            .map(|(topic, binding)| {
                let handler = self.build(binding.handler())?;
                Ok(Binding::new(topic.clone(), handler).with_options(binding.options()))
            })
            .collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("names", &self.names())
            .finish()
    }
}
