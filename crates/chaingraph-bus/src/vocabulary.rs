use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{BusError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delivery {
    /// Handled before `publish` returns.
    Synchronous,
    /// Handled on a later turn of the event loop.
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSpec {
    pub name: &'static str,
    pub delivery: Delivery,
    /// Handling marks the graph modified and schedules a snapshot.
    pub dirty: bool,
}

/// The closed set of message names a bus accepts.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    specs: HashMap<&'static str, MessageSpec>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(mut self, name: &'static str, delivery: Delivery, dirty: bool) -> Self {
        self.specs.insert(
            name,
            MessageSpec {
                name,
                delivery,
                dirty,
            },
        );
        self
    }

    pub fn deferred(self, name: &'static str) -> Self {
        self.declare(name, Delivery::Deferred, false)
    }

    pub fn synchronous(self, name: &'static str) -> Self {
        self.declare(name, Delivery::Synchronous, false)
    }

    pub fn dirty(self, name: &'static str) -> Self {
        self.declare(name, Delivery::Deferred, true)
    }

    pub fn spec(&self, name: &str) -> Result<MessageSpec> {
        self.specs
            .get(name)
            .copied()
            .ok_or_else(|| BusError::UndeclaredMessage(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn dirty_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.specs.values().filter(|s| s.dirty).map(|s| s.name)
    }
}
