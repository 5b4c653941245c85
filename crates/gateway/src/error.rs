use thiserror::Error;

/// Errors that can occur during gateway operations and setup.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A soft delete was requested for an entity whose type is not auditable.
    /// The caller may retry as a hard delete.
    #[error("entity {entity_type}/{id} is not soft deletable")]
    EntityNotSoftDeletable { entity_type: &'static str, id: i64 },

    /// The persistence engine could not register a query filter at setup time.
    #[error("query filter installation failed: {0}")]
    FilterInstallation(String),

    /// An error from the persistence engine, passed through unchanged.
    #[error("store error: {0}")]
    Store(#[from] auditable_store::StoreError),

    /// The gateway was misconfigured (e.g. missing required components).
    #[error("configuration error: {0}")]
    Configuration(String),
}
