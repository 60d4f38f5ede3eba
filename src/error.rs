//! Error types for the notice broker.
//!
//! Errors are strongly typed using thiserror. Lookup misses are never errors:
//! registries and collectors return `Option` for those.

use thiserror::Error;

/// Errors raised while discovering extensions from plugins.
///
/// Discovery never aborts on these: the failing type is skipped and the error
/// is reported back to the caller alongside the successfully added items.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PluginError {
    #[error("Failed to load plugin {plugin} for {type_name}: {reason}")]
    LoadFailed {
        plugin: String,
        type_name: String,
        reason: String,
    },

    #[error("No factory registered for {type_name} in plugin {plugin}")]
    FactoryMissing {
        plugin: String,
        type_name: String,
    },

    #[error("Failed to manufacture {type_name} from plugin {plugin}")]
    ManufactureFailed {
        plugin: String,
        type_name: String,
    },
}

impl PluginError {
    /// Name of the extension type that failed.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::LoadFailed { type_name, .. }
            | Self::FactoryMissing { type_name, .. }
            | Self::ManufactureFailed { type_name, .. } => type_name,
        }
    }

    /// Name of the plugin the failing type belongs to.
    #[must_use]
    pub fn plugin(&self) -> &str {
        match self {
            Self::LoadFailed { plugin, .. }
            | Self::FactoryMissing { plugin, .. }
            | Self::ManufactureFailed { plugin, .. } => plugin,
        }
    }
}

/// Top-level error type for the notice broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// A weak handle was dereferenced after its registry entry was removed.
    #[error("Handle to {type_name} has expired")]
    ExpiredHandle {
        type_name: &'static str,
    },

    /// A notice stream was read after it was unsubscribed.
    #[error("Notice stream for {notice} disconnected")]
    Disconnected {
        notice: &'static str,
    },

    /// The observed host was destroyed before the operation could use it.
    #[error("Host expired; cannot subscribe to {notice}")]
    HostExpired {
        notice: &'static str,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),
}

impl BrokerError {
    /// Returns true if a handle was used after its owner was reset.
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        matches!(self, Self::ExpiredHandle { .. })
    }

    /// Returns true if the observed host has been destroyed.
    #[must_use]
    pub const fn is_host_expired(&self) -> bool {
        matches!(self, Self::HostExpired { .. })
    }

    /// Returns true if this is a plugin discovery error.
    #[must_use]
    pub const fn is_plugin(&self) -> bool {
        matches!(self, Self::Plugin(_))
    }

    /// Returns true if this is a stream timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type alias for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_error_load_failed() {
        let err = PluginError::LoadFailed {
            plugin: "audit".to_string(),
            type_name: "audit::Reporter".to_string(),
            reason: "missing symbol".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("Failed to load plugin audit"));
        assert!(msg.contains("missing symbol"));
        assert_eq!(err.plugin(), "audit");
        assert_eq!(err.type_name(), "audit::Reporter");
    }

    #[test]
    fn test_plugin_error_manufacture_failed() {
        let err = PluginError::ManufactureFailed {
            plugin: "audit".to_string(),
            type_name: "audit::Reporter".to_string(),
        };
        assert!(format!("{err}").contains("Failed to manufacture audit::Reporter"));
    }

    #[test]
    fn test_broker_error_expired_handle() {
        let err = BrokerError::ExpiredHandle { type_name: "ReporterManager" };
        assert!(err.is_expired());
        assert!(!err.is_timeout());
        assert!(format!("{err}").contains("ReporterManager"));
    }

    #[test]
    fn test_broker_error_from_plugin() {
        let err: BrokerError = PluginError::FactoryMissing {
            plugin: "p".to_string(),
            type_name: "t".to_string(),
        }
        .into();
        assert!(err.is_plugin());
        assert!(format!("{err}").contains("No factory registered for t"));
    }

    #[test]
    fn test_broker_error_timeout() {
        let err = BrokerError::Timeout { duration_ms: 250 };
        assert!(err.is_timeout());
        assert!(format!("{err}").contains("250ms"));
    }

    #[test]
    fn test_broker_error_disconnected() {
        let err = BrokerError::Disconnected { notice: "ObjectsChanged" };
        assert!(!err.is_expired());
        assert!(format!("{err}").contains("stream for ObjectsChanged disconnected"));
    }

    #[test]
    fn test_broker_error_host_expired() {
        let err = BrokerError::HostExpired { notice: "ObjectsChanged" };
        assert!(err.is_host_expired());
        assert!(!err.is_expired());
        assert!(format!("{err}").contains("Host expired"));
    }
}
