// ── Preference store contract ──
//
// The durable key-value store lives outside the core (see the
// netspeed-config crate). The core only needs the status flag and the
// persisted configuration.

use std::sync::{Arc, Mutex, PoisonError};

use crate::error::CoreError;
use crate::model::Configuration;

/// Durable preferences the core reads and writes.
pub trait PreferenceStore: Send + Sync {
    /// Is the indicator supposed to be running.
    fn status(&self) -> bool;

    fn set_status(&self, status: bool) -> Result<(), CoreError>;

    /// The configuration assembled from the persisted keys.
    fn configuration(&self) -> Configuration;
}

impl<S: PreferenceStore + ?Sized> PreferenceStore for Arc<S> {
    fn status(&self) -> bool {
        (**self).status()
    }

    fn set_status(&self, status: bool) -> Result<(), CoreError> {
        (**self).set_status(status)
    }

    fn configuration(&self) -> Configuration {
        (**self).configuration()
    }
}

/// Volatile store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryPrefs>,
}

#[derive(Debug, Default)]
struct MemoryPrefs {
    status: bool,
    configuration: Configuration,
}

impl MemoryStore {
    pub fn new(status: bool, configuration: Configuration) -> Self {
        Self {
            inner: Mutex::new(MemoryPrefs {
                status,
                configuration,
            }),
        }
    }
}

impl PreferenceStore for MemoryStore {
    fn status(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    fn set_status(&self, status: bool) -> Result<(), CoreError> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status = status;
        Ok(())
    }

    fn configuration(&self) -> Configuration {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .configuration
            .clone()
    }
}
