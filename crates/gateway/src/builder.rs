use std::sync::Arc;

use auditable_core::{ActorLookup, Anonymous, Clock, SystemClock};
use auditable_store::{Model, Session, Storage};
use tracing::debug;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::gateway::AuditGateway;

/// Fluent builder for constructing an [`AuditGateway`].
///
/// A [`Storage`] backend and a built [`Model`] must be supplied. The clock
/// defaults to [`SystemClock`], the actor lookup to [`Anonymous`] and the
/// configuration to [`GatewayConfig::default`].
pub struct AuditGatewayBuilder {
    storage: Option<Arc<dyn Storage>>,
    model: Option<Arc<Model>>,
    actor: Arc<dyn ActorLookup>,
    clock: Arc<dyn Clock>,
    config: GatewayConfig,
}

impl AuditGatewayBuilder {
    pub fn new() -> Self {
        Self {
            storage: None,
            model: None,
            actor: Arc::new(Anonymous),
            clock: Arc::new(SystemClock),
            config: GatewayConfig::default(),
        }
    }

    /// Set the storage backend flushed to by the gateway's session.
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the model. Build it with [`AuditGateway::configure_model`] applied
    /// so soft-deleted rows stay hidden from default reads.
    #[must_use]
    pub fn model(mut self, model: Arc<Model>) -> Self {
        self.model = Some(model);
        self
    }

    /// Set the source of the acting user recorded in `*_by_id` columns.
    #[must_use]
    pub fn actor(mut self, actor: Arc<dyn ActorLookup>) -> Self {
        self.actor = actor;
        self
    }

    /// Set the source of the timestamps recorded in `*_at` columns.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Consume the builder and produce an [`AuditGateway`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Configuration`] if the storage backend or the
    /// model is missing.
    pub fn build(self) -> Result<AuditGateway, GatewayError> {
        let storage = self
            .storage
            .ok_or_else(|| GatewayError::Configuration("storage backend is required".into()))?;

        let model = self
            .model
            .ok_or_else(|| GatewayError::Configuration("model is required".into()))?;

        debug!(
            batch_soft_delete = ?self.config.batch_soft_delete,
            "audit gateway built"
        );

        Ok(AuditGateway {
            session: Session::new(storage, model),
            actor: self.actor,
            clock: self.clock,
            config: self.config,
        })
    }
}

impl Default for AuditGatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}
