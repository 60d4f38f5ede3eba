//! Process-scoped broker state.

use crate::broker::Broker;
use crate::config::FrameworkConfig;
use crate::plugin::PluginRegistry;
use crate::registry::Registry;
use crate::reporter::ReporterManager;

/// Owns the plugin table, the per-host broker and reporter manager
/// registries, and the configuration they are created with.
///
/// Embedders typically create one framework at startup, declare their
/// plugins on it, and pass it to [`Broker::create`] and
/// [`ReporterManager::create`].
#[derive(Debug, Default)]
pub struct Framework {
    config: FrameworkConfig,
    plugins: PluginRegistry,
    brokers: Registry<Broker>,
    managers: Registry<ReporterManager>,
}

impl Framework {
    /// Framework with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Framework with `config`.
    #[must_use]
    pub fn with_config(config: FrameworkConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    /// Plugin table consulted by discovery.
    #[must_use]
    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub(crate) fn brokers(&self) -> &Registry<Broker> {
        &self.brokers
    }

    pub(crate) fn managers(&self) -> &Registry<ReporterManager> {
        &self.managers
    }

    /// Drop every reporter manager, then every broker.
    pub fn reset_all(&self) {
        ReporterManager::reset_all(self);
        Broker::reset_all(self);
    }
}
