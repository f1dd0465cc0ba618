//! Backend construction by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::error::{BackendError, BackendResult};
use crate::traits::Backend;

type Factory = Box<dyn Fn() -> BackendResult<Arc<dyn Backend>> + Send + Sync>;

/// Named backend factories. `auto` resolves to the first registration,
/// so hosts register their preferred backend first.
#[derive(Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, Factory>,
    order: Vec<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> BackendResult<Arc<dyn Backend>> + Send + Sync + 'static,
    ) {
        let name = name.into();
        self.order.push(name.clone());
        self.factories.insert(name, Box::new(factory));
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Builds the named backend; `auto` detects the first registered.
    pub fn create(&self, name: &str) -> BackendResult<Arc<dyn Backend>> {
        let resolved = if name == "auto" {
            self.order.first().ok_or(BackendError::NoBackends)?
        } else {
            self.factories
                .get_key_value(name)
                .map(|(k, _)| k)
                .ok_or_else(|| BackendError::UnknownBackend(name.to_string()))?
        };
        let backend = (self.factories[resolved])()?;
        info!(backend = %resolved, "loaded backend");
        Ok(backend)
    }
}
