//! Transform trait and registry
//!
//! A transform reshapes one event into the payload bytes handed to a sink.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::{CapturedEvent, ContractError};

/// Payload-shaping capability
///
/// Pure function of the event; implementations must be safe to call
/// concurrently from several channel tasks.
pub trait Transform: Send + Sync {
    /// Configured name
    fn name(&self) -> &str;

    /// Produce the payload for one event
    fn map(&self, event: &CapturedEvent) -> Result<Bytes, ContractError>;
}

/// Name -> transform mapping, built once at startup
#[derive(Clone, Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, Arc<dyn Transform>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transform under its own name
    ///
    /// # Errors
    /// Returns a validation error if the name is already taken
    pub fn register(&mut self, transform: Arc<dyn Transform>) -> Result<(), ContractError> {
        let name = transform.name().to_string();
        if self.transforms.contains_key(&name) {
            return Err(ContractError::config_validation(
                format!("transforms[name={name}]"),
                "duplicate transform name",
            ));
        }
        self.transforms.insert(name, transform);
        Ok(())
    }

    /// Resolve a transform by name
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Transform>, ContractError> {
        self.transforms
            .get(name)
            .cloned()
            .ok_or_else(|| ContractError::UnknownTransform {
                name: name.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("transforms", &self.names())
            .finish()
    }
}
