// MIT License - Copyright (c) 2026 envisalink-bridge contributors

use std::fmt;

use crate::event::{ConsumerStatus, DeviceUpdate};

/// Opaque, stable identity of a registered consumer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(String);

impl ConsumerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConsumerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConsumerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The fixed capability interface every registered consumer exposes.
///
/// Called from the controller task: implementations must not block.
pub trait Consumer: Send + Sync {
    fn id(&self) -> &ConsumerId;

    /// Push a connection status.
    fn status(&self, status: ConsumerStatus);

    /// Deliver a fanned-out device update.
    fn update(&self, update: &DeviceUpdate);
}
