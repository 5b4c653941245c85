//! Audit-stamping persistence gateway.
//!
//! [`AuditGateway`] wraps an [`auditable_store::Session`]: it stamps
//! creation, modification, deletion and restoration columns on auditable
//! entities, turns their removals into soft deletes, and relies on the query
//! filters installed by [`AuditGateway::configure_model`] to hide
//! soft-deleted rows from default reads.

pub mod builder;
pub mod config;
pub mod error;
pub mod filters;
pub mod gateway;
pub mod telemetry;

pub use builder::AuditGatewayBuilder;
pub use config::{BatchSoftDelete, GatewayConfig, TelemetryConfig};
pub use error::GatewayError;
pub use filters::{apply_global_filters, is_visible};
pub use gateway::{AuditGateway, DeleteMode};
