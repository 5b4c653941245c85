mod telemetry;


use std::path::Path;

use serde::Deserialize;

pub use telemetry::TelemetryConfig;

use crate::error::GatewayError;

/// Top-level gateway configuration, loaded from TOML.
///
/// # Example
///
/// ```toml
/// batch_soft_delete = "strict"
///
/// [telemetry]
/// log_filter = "auditable_gateway=debug,info"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    /// How `remove_many` treats non-auditable entities under a soft delete.
    #[serde(default)]
    pub batch_soft_delete: BatchSoftDelete,
    /// Log output configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl GatewayConfig {
    /// Parse a configuration document.
    pub fn from_toml_str(source: &str) -> Result<Self, GatewayError> {
        toml::from_str(source).map_err(|e| GatewayError::Configuration(e.to_string()))
    }

    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }
}

/// Policy for batch soft deletes that meet an entity type without the
/// auditable capability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchSoftDelete {
    /// Skip such entities silently; the batch carries on.
    #[default]
    Skip,
    /// Fail with `EntityNotSoftDeletable`, as a single-entity soft delete does.
    Strict,
}
