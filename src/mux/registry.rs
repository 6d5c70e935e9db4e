// MIT License - Copyright (c) 2026 envisalink-bridge contributors

use std::collections::HashMap;
use std::sync::Arc;

use crate::mux::consumer::{Consumer, ConsumerId};

/// The set of active consumers, keyed by identity.
#[derive(Default)]
pub(crate) struct Registry {
    consumers: HashMap<ConsumerId, Arc<dyn Consumer>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a consumer, replacing any prior entry with the same identity.
    /// Returns the replaced entry.
    pub fn insert(&mut self, consumer: Arc<dyn Consumer>) -> Option<Arc<dyn Consumer>> {
        self.consumers.insert(consumer.id().clone(), consumer)
    }

    /// Remove a consumer. Returns `true` if it was present.
    pub fn remove(&mut self, id: &ConsumerId) -> bool {
        self.consumers.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Consumer>> {
        self.consumers.values()
    }
}
