//! Framework configuration.

use serde::{Deserialize, Serialize};

/// Process-scoped settings applied to every broker and reporter manager
/// created through a [`crate::Framework`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    /// Seed every broker with the built-in host dispatcher.
    pub register_builtin_dispatcher: bool,
    /// Discover dispatchers declared in the plugin table when a broker is created.
    pub discover_dispatchers: bool,
    /// Discover reporters declared in the plugin table when a manager is created.
    pub discover_reporters: bool,
    /// Buffer capacity of streams opened through [`crate::Broker::subscribe`].
    /// Zero is raised to one; streams are never rendezvous channels.
    pub stream_capacity: usize,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            register_builtin_dispatcher: true,
            discover_dispatchers: true,
            discover_reporters: true,
            stream_capacity: 1024,
        }
    }
}
