use std::sync::Arc;

use auditable_core::{
    ActorLookup, AuditField, AuditFields, AuditableCapability, CREATION_FIELDS, Clock,
    DELETION_FIELDS, Entity, MODIFICATION_FIELDS, RESTORATION_FIELDS,
};
use auditable_store::{EntityEntry, EntityState, ModelBuilder, Query, Session};
use tracing::{debug, info, instrument, warn};

use crate::builder::AuditGatewayBuilder;
use crate::config::{BatchSoftDelete, GatewayConfig};
use crate::error::GatewayError;
use crate::filters::{apply_global_filters, is_visible};

/// How [`AuditGateway::remove`] disposes of an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeleteMode {
    /// Stamp the deletion columns and keep the row. Requires the auditable
    /// capability.
    #[default]
    Soft,
    /// Physically remove the row.
    Hard,
}

/// Reads the clock and the current actor for one stamp.
struct Stamper<'a> {
    clock: &'a dyn Clock,
    actor: &'a dyn ActorLookup,
}

impl Stamper<'_> {
    fn created(&self, audit: &mut AuditFields) {
        audit.created_at = Some(self.clock.now());
        audit.created_by_id = self.actor.current_actor();
        audit.is_deleted = Some(false);
        audit.is_modified = Some(false);
    }

    fn modified(&self, audit: &mut AuditFields) {
        audit.modified_at = Some(self.clock.now());
        audit.modified_by_id = self.actor.current_actor();
        audit.is_modified = Some(true);
    }

    fn deleted(&self, audit: &mut AuditFields) {
        audit.deleted_at = Some(self.clock.now());
        audit.deleted_by_id = self.actor.current_actor();
        audit.is_deleted = Some(true);
    }

    fn restored(&self, audit: &mut AuditFields) {
        audit.restored_at = Some(self.clock.now());
        audit.restored_by_id = self.actor.current_actor();
        audit.is_restored = Some(true);
        audit.deleted_at = None;
        audit.deleted_by_id = Some(String::new());
        audit.is_deleted = Some(false);
    }
}

/// Apply `stamp` to the audit columns of the entry's entity and flag `fields`
/// for the next flush. Returns `false`, touching nothing, when the entity is
/// not auditable.
fn stamp_entry<E: Entity>(
    entry: &mut EntityEntry<'_, E>,
    fields: &[AuditField],
    stamp: impl FnOnce(&mut AuditFields),
) -> bool {
    let Some(auditable) = entry.entity_mut().as_auditable_mut() else {
        return false;
    };
    stamp(auditable.audit_mut());
    entry.mark_fields_dirty(fields.iter().map(|field| field.column()));
    true
}

/// Soft-remove an auditable entity through the session.
fn soft_remove<'s, E: Entity>(
    session: &'s mut Session,
    stamper: &Stamper<'_>,
    entity: E,
) -> Result<EntityEntry<'s, E>, GatewayError> {
    let mut entry = session.entry(entity)?;
    match entry.state() {
        // Storage never saw it.
        EntityState::New => entry.set_state(EntityState::Detached),
        state => {
            if state != EntityState::Persisted {
                entry.set_state(EntityState::Persisted);
            }
            stamp_entry(&mut entry, DELETION_FIELDS, |audit| stamper.deleted(audit));
        }
    }
    Ok(entry)
}

/// Persistence gateway that stamps audit columns on every write and turns
/// removals of auditable entities into soft deletes.
///
/// Entities without the auditable capability pass through to the underlying
/// [`Session`] unchanged. Default reads hide soft-deleted rows when the model
/// was prepared with [`AuditGateway::configure_model`].
///
/// Stamps are applied in memory; nothing reaches storage until
/// [`AuditGateway::save_changes`].
pub struct AuditGateway {
    pub(crate) session: Session,
    pub(crate) actor: Arc<dyn ActorLookup>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: GatewayConfig,
}

impl std::fmt::Debug for AuditGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditGateway")
            .field("session", &self.session)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AuditGateway {
    pub fn builder() -> AuditGatewayBuilder {
        AuditGatewayBuilder::new()
    }

    /// Install the soft-delete read filter on every auditable root entity type
    /// registered in `builder`. Call during model setup, after every entity
    /// type is registered and before [`ModelBuilder::build`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::FilterInstallation`] if the engine cannot
    /// apply query filters.
    pub fn configure_model(builder: &mut ModelBuilder) -> Result<(), GatewayError> {
        let installed = apply_global_filters::<AuditableCapability, _>(builder, is_visible)?;
        info!(installed, "soft-delete query filters installed");
        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The underlying session, for operations the gateway does not wrap.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Mutable access to the underlying session. Writes made through it are
    /// not stamped.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Begin tracking `entity` as new, stamping its creation columns first.
    #[instrument(name = "gateway.create", skip_all, fields(entity_type = E::ENTITY_TYPE, entity_id = entity.id()))]
    pub fn create<E: Entity>(&mut self, mut entity: E) -> Result<EntityEntry<'_, E>, GatewayError> {
        if let Some(auditable) = entity.as_auditable_mut() {
            let stamper = Stamper {
                clock: self.clock.as_ref(),
                actor: self.actor.as_ref(),
            };
            stamper.created(auditable.audit_mut());
            debug!("creation stamped");
        }
        Ok(self.session.track_as_new(entity)?)
    }

    /// [`AuditGateway::create`] for every element.
    pub fn create_many<E, I>(&mut self, entities: I) -> Result<(), GatewayError>
    where
        E: Entity,
        I: IntoIterator<Item = E>,
    {
        for entity in entities {
            self.create(entity)?;
        }
        Ok(())
    }

    /// Begin tracking `entity` as existing and stamp its modification columns,
    /// which alone are written on the next flush.
    #[instrument(name = "gateway.track", skip_all, fields(entity_type = E::ENTITY_TYPE, entity_id = entity.id()))]
    pub fn track<E: Entity>(&mut self, entity: E) -> Result<EntityEntry<'_, E>, GatewayError> {
        let stamper = Stamper {
            clock: self.clock.as_ref(),
            actor: self.actor.as_ref(),
        };
        let mut entry = self.session.track_as_existing(entity)?;
        if stamp_entry(&mut entry, MODIFICATION_FIELDS, |audit| stamper.modified(audit)) {
            debug!("modification stamped");
        }
        Ok(entry)
    }

    /// [`AuditGateway::track`] for every element.
    pub fn track_many<E, I>(&mut self, entities: I) -> Result<(), GatewayError>
    where
        E: Entity,
        I: IntoIterator<Item = E>,
    {
        for entity in entities {
            self.track(entity)?;
        }
        Ok(())
    }

    /// Stamp the modification columns of `entity` and mark its whole row for
    /// writing.
    ///
    /// The creation columns are never rewritten: a tracked instance's stamp
    /// is carried onto `entity`, and the flush leaves the stored values alone.
    #[instrument(name = "gateway.update", skip_all, fields(entity_type = E::ENTITY_TYPE, entity_id = entity.id()))]
    pub fn update<E: Entity>(&mut self, mut entity: E) -> Result<EntityEntry<'_, E>, GatewayError> {
        let stamper = Stamper {
            clock: self.clock.as_ref(),
            actor: self.actor.as_ref(),
        };
        let created = self
            .session
            .tracked_entity::<E>(entity.id())
            .and_then(|tracked| tracked.as_auditable())
            .map(|tracked| {
                let audit = tracked.audit();
                (audit.created_at, audit.created_by_id.clone())
            });

        let mut stamped = false;
        if let Some(auditable) = entity.as_auditable_mut() {
            let audit = auditable.audit_mut();
            if let Some((created_at, created_by_id)) = created {
                audit.created_at = created_at.or(audit.created_at);
                audit.created_by_id = created_by_id.or(audit.created_by_id.take());
            }
            stamper.modified(audit);
            stamped = true;
        }
        let mut entry = self.session.update(entity)?;
        if stamped {
            entry.mark_all_dirty_except(CREATION_FIELDS.iter().map(|field| field.column()));
            entry.mark_fields_dirty(MODIFICATION_FIELDS.iter().map(|field| field.column()));
            debug!("modification stamped");
        }
        Ok(entry)
    }

    /// [`AuditGateway::update`] for every element.
    pub fn update_many<E, I>(&mut self, entities: I) -> Result<(), GatewayError>
    where
        E: Entity,
        I: IntoIterator<Item = E>,
    {
        for entity in entities {
            self.update(entity)?;
        }
        Ok(())
    }

    /// Remove `entity`.
    ///
    /// A soft delete stamps the deletion columns and keeps the row; an entity
    /// only tracked as new is detached instead. A hard delete hands the entity
    /// to the session for physical removal.
    ///
    /// # Errors
    ///
    /// A soft delete of an entity without the auditable capability fails with
    /// [`GatewayError::EntityNotSoftDeletable`] and leaves the session
    /// untouched.
    ///
    /// A soft delete of an untracked entity whose row does not exist makes
    /// the next [`AuditGateway::save_changes`] fail with a concurrency error,
    /// and every flush after it, until the session is cleared.
    #[instrument(name = "gateway.remove", skip_all, fields(entity_type = E::ENTITY_TYPE, entity_id = entity.id(), mode = ?mode))]
    pub fn remove<E: Entity>(
        &mut self,
        entity: E,
        mode: DeleteMode,
    ) -> Result<EntityEntry<'_, E>, GatewayError> {
        match mode {
            DeleteMode::Hard => Ok(self.session.remove(entity)?),
            DeleteMode::Soft => {
                if entity.as_auditable().is_none() {
                    return Err(GatewayError::EntityNotSoftDeletable {
                        entity_type: E::ENTITY_TYPE,
                        id: entity.id(),
                    });
                }
                let stamper = Stamper {
                    clock: self.clock.as_ref(),
                    actor: self.actor.as_ref(),
                };
                let entry = soft_remove(&mut self.session, &stamper, entity)?;
                debug!(state = %entry.state(), "soft delete applied");
                Ok(entry)
            }
        }
    }

    /// [`AuditGateway::remove`] for every element.
    ///
    /// Under a soft delete the capability is checked per element, through
    /// [`Entity::as_auditable`]. Elements without it are skipped when the
    /// configured [`BatchSoftDelete`] policy is `Skip`, while the rest of the
    /// batch is soft-deleted. With `Strict` the whole batch is rejected before
    /// anything is touched.
    #[instrument(name = "gateway.remove_many", skip_all, fields(entity_type = E::ENTITY_TYPE, mode = ?mode))]
    pub fn remove_many<E, I>(&mut self, entities: I, mode: DeleteMode) -> Result<(), GatewayError>
    where
        E: Entity,
        I: IntoIterator<Item = E>,
    {
        if mode == DeleteMode::Hard {
            return Ok(self.session.remove_many(entities)?);
        }

        let entities: Vec<E> = entities.into_iter().collect();
        if self.config.batch_soft_delete == BatchSoftDelete::Strict
            && let Some(entity) = entities.iter().find(|entity| entity.as_auditable().is_none())
        {
            return Err(GatewayError::EntityNotSoftDeletable {
                entity_type: E::ENTITY_TYPE,
                id: entity.id(),
            });
        }

        let stamper = Stamper {
            clock: self.clock.as_ref(),
            actor: self.actor.as_ref(),
        };
        let mut skipped = 0_usize;
        for entity in entities {
            if entity.as_auditable().is_none() {
                skipped += 1;
                continue;
            }
            soft_remove(&mut self.session, &stamper, entity)?;
        }
        if skipped > 0 {
            warn!(skipped, "entities without soft delete support left in place");
        }
        Ok(())
    }

    /// Undo a soft delete: begin tracking `entity` as existing, stamp its
    /// restoration columns and clear its deletion columns.
    ///
    /// Entities without the auditable capability are tracked unchanged.
    #[instrument(name = "gateway.restore", skip_all, fields(entity_type = E::ENTITY_TYPE, entity_id = entity.id()))]
    pub fn restore<E: Entity>(&mut self, entity: E) -> Result<EntityEntry<'_, E>, GatewayError> {
        let stamper = Stamper {
            clock: self.clock.as_ref(),
            actor: self.actor.as_ref(),
        };
        let mut entry = self.session.track_as_existing(entity)?;
        if stamp_entry(&mut entry, RESTORATION_FIELDS, |audit| stamper.restored(audit)) {
            debug!("restoration stamped");
        }
        Ok(entry)
    }

    /// [`AuditGateway::restore`] for every element.
    pub fn restore_many<E, I>(&mut self, entities: I) -> Result<(), GatewayError>
    where
        E: Entity,
        I: IntoIterator<Item = E>,
    {
        for entity in entities {
            self.restore(entity)?;
        }
        Ok(())
    }

    /// Flush pending writes. Returns the number of rows affected.
    pub async fn save_changes(&mut self) -> Result<usize, GatewayError> {
        Ok(self.session.save_changes().await?)
    }

    /// A default read of `E`, hiding soft-deleted rows.
    pub fn query<E: Entity>(&self) -> Query<'_, E> {
        self.session.query::<E>()
    }

    /// Soft-deleted rows of `E`, bypassing the default read filter.
    pub fn deleted<E: Entity>(&self) -> Query<'_, E> {
        self.session
            .query::<E>()
            .ignore_query_filters()
            .filter(|entity: &E| {
                entity
                    .as_auditable()
                    .is_some_and(|auditable| auditable.is_deleted())
            })
    }

    /// The `E` with identity `id`: the session's own instance when tracked,
    /// otherwise a filtered read from storage.
    pub async fn find<E: Entity>(&self, id: i64) -> Result<Option<E>, GatewayError> {
        Ok(self.session.find::<E>(id).await?)
    }
}
