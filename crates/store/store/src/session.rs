use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use auditable_core::{AnyEntity, Entity};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::model::Model;
use crate::query::{Query, decode_row};
use crate::state::EntityState;
use crate::storage::{Row, Storage};

/// Columns of a tracked entity that the next flush writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DirtyFields {
    /// Nothing to write.
    #[default]
    Clean,
    /// The whole row.
    All,
    /// Only the named columns.
    Columns(BTreeSet<&'static str>),
    /// The whole row except the named columns.
    AllExcept(BTreeSet<&'static str>),
}

impl DirtyFields {
    /// Add `column` to the set. A whole-row mark absorbs it.
    pub fn mark(&mut self, column: &'static str) {
        match self {
            Self::Clean => *self = Self::Columns(BTreeSet::from([column])),
            Self::All => {}
            Self::Columns(columns) => {
                columns.insert(column);
            }
            Self::AllExcept(excluded) => {
                excluded.remove(column);
            }
        }
    }

    pub fn mark_all(&mut self) {
        *self = Self::All;
    }

    /// Mark the whole row except `excluded`.
    pub fn mark_all_except(&mut self, excluded: impl IntoIterator<Item = &'static str>) {
        *self = Self::AllExcept(excluded.into_iter().collect());
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !matches!(self, Self::Clean)
    }

    /// Whether the next flush writes `column`.
    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        match self {
            Self::Clean => false,
            Self::All => true,
            Self::Columns(columns) => columns.contains(column),
            Self::AllExcept(excluded) => !excluded.contains(column),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct EntityKey {
    type_id: TypeId,
    id: i64,
}

impl EntityKey {
    fn of<E: Entity>(id: i64) -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            id,
        }
    }
}

/// A write the next flush must issue for one entity.
enum PendingWrite {
    Insert(Row),
    Update(Row),
    Delete,
}

struct Tracked<E> {
    entity: E,
    state: EntityState,
    dirty: DirtyFields,
}

/// Type-erased tracked entity, so one session can hold every entity type.
trait TrackedObject: Send + Sync {
    fn key(&self) -> EntityKey;
    fn table(&self) -> &'static str;
    fn id(&self) -> i64;
    fn state(&self) -> EntityState;
    fn pending_write(&self) -> Result<Option<PendingWrite>, StoreError>;
    /// Record that the pending write reached storage.
    fn accept(&mut self);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<E: Entity> TrackedObject for Tracked<E> {
    fn key(&self) -> EntityKey {
        EntityKey::of::<E>(self.entity.id())
    }

    fn table(&self) -> &'static str {
        E::ENTITY_TYPE
    }

    fn id(&self) -> i64 {
        self.entity.id()
    }

    fn state(&self) -> EntityState {
        self.state
    }

    fn pending_write(&self) -> Result<Option<PendingWrite>, StoreError> {
        let write = match (self.state, &self.dirty) {
            (EntityState::New, _) => PendingWrite::Insert(encode_row(&self.entity)?),
            (EntityState::Persisted, DirtyFields::Clean) => return Ok(None),
            (EntityState::Persisted, DirtyFields::All) => {
                PendingWrite::Update(encode_row(&self.entity)?)
            }
            (EntityState::Persisted, DirtyFields::AllExcept(excluded)) => {
                let mut row = encode_row(&self.entity)?;
                row.retain(|column, _| !excluded.contains(column.as_str()));
                PendingWrite::Update(row)
            }
            (EntityState::Persisted, DirtyFields::Columns(columns)) => {
                let mut row = encode_row(&self.entity)?;
                let changes = columns
                    .iter()
                    .map(|&column| {
                        let value = row.remove(column).unwrap_or(serde_json::Value::Null);
                        (column.to_owned(), value)
                    })
                    .collect();
                PendingWrite::Update(changes)
            }
            (EntityState::PendingDelete, _) => PendingWrite::Delete,
            (EntityState::Transient | EntityState::Detached, _) => return Ok(None),
        };
        Ok(Some(write))
    }

    fn accept(&mut self) {
        self.dirty = DirtyFields::Clean;
        self.state = match self.state {
            EntityState::New | EntityState::Persisted => EntityState::Persisted,
            EntityState::PendingDelete | EntityState::Detached => EntityState::Detached,
            EntityState::Transient => EntityState::Transient,
        };
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn encode_row<E: Entity>(entity: &E) -> Result<Row, StoreError> {
    match serde_json::to_value(entity)? {
        serde_json::Value::Object(row) => Ok(row),
        other => Err(StoreError::Serialization(format!(
            "{} {} serialized to {other} instead of an object",
            E::ENTITY_TYPE,
            entity.id()
        ))),
    }
}

fn downcast_mut<E: Entity>(slot: &mut dyn TrackedObject) -> Result<&mut Tracked<E>, StoreError> {
    slot.as_any_mut()
        .downcast_mut::<Tracked<E>>()
        .ok_or_else(|| StoreError::Tracking(format!("slot is not a {}", E::ENTITY_TYPE)))
}

/// Handle on a tracked entity: its current value, tracking state and the
/// columns the next flush will write.
pub struct EntityEntry<'s, E: Entity> {
    tracked: &'s mut Tracked<E>,
}

impl<E: Entity> EntityEntry<'_, E> {
    #[must_use]
    pub fn state(&self) -> EntityState {
        self.tracked.state
    }

    /// Move the entity to `state`. Leaving the current state discards any
    /// pending column marks.
    pub fn set_state(&mut self, state: EntityState) {
        let previous = self.tracked.state;
        if previous == state {
            return;
        }
        self.tracked.state = state;
        self.tracked.dirty = DirtyFields::Clean;
        debug!(
            entity_type = E::ENTITY_TYPE,
            entity_id = self.tracked.entity.id(),
            from = %previous,
            to = %state,
            "entity state changed"
        );
    }

    #[must_use]
    pub fn entity(&self) -> &E {
        &self.tracked.entity
    }

    pub fn entity_mut(&mut self) -> &mut E {
        &mut self.tracked.entity
    }

    /// Flag `column` to be written on the next flush.
    pub fn mark_field_dirty(&mut self, column: &'static str) {
        self.tracked.dirty.mark(column);
    }

    /// Flag every column in `columns`.
    pub fn mark_fields_dirty(&mut self, columns: impl IntoIterator<Item = &'static str>) {
        for column in columns {
            self.tracked.dirty.mark(column);
        }
    }

    /// Flag the whole row.
    pub fn mark_all_dirty(&mut self) {
        self.tracked.dirty.mark_all();
    }

    /// Flag the whole row except `excluded`, which keeps its stored value.
    /// Has no effect on an entity tracked as new, whose insert writes every
    /// column.
    pub fn mark_all_dirty_except(&mut self, excluded: impl IntoIterator<Item = &'static str>) {
        if self.tracked.state != EntityState::New {
            self.tracked.dirty.mark_all_except(excluded);
        }
    }

    #[must_use]
    pub fn dirty_fields(&self) -> &DirtyFields {
        &self.tracked.dirty
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.tracked.dirty.is_dirty()
    }
}

impl<E: Entity> fmt::Debug for EntityEntry<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityEntry")
            .field("entity_type", &E::ENTITY_TYPE)
            .field("id", &self.tracked.entity.id())
            .field("state", &self.tracked.state)
            .field("dirty", &self.tracked.dirty)
            .finish()
    }
}

/// A unit of work over a [`Storage`] backend.
///
/// The session tracks entity instances and their states in memory; nothing
/// reaches storage until [`Session::save_changes`]. A session is meant to be
/// owned by one logical operation at a time.
pub struct Session {
    storage: Arc<dyn Storage>,
    model: Arc<Model>,
    entries: Vec<Box<dyn TrackedObject>>,
    index: HashMap<EntityKey, usize>,
}

impl Session {
    pub fn new(storage: Arc<dyn Storage>, model: Arc<Model>) -> Self {
        Self {
            storage,
            model,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    #[must_use]
    pub fn model(&self) -> &Model {
        &self.model
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Get or create the slot for `entity`. An already tracked instance with
    /// the same identity is replaced by `entity`, keeping its state.
    fn slot<E: Entity>(&mut self, entity: E) -> Result<&mut Tracked<E>, StoreError> {
        self.model.entity_type_of::<E>()?;
        let key = EntityKey::of::<E>(entity.id());

        if let Some(&idx) = self.index.get(&key) {
            let tracked = downcast_mut::<E>(self.entries[idx].as_mut())?;
            tracked.entity = entity;
            return Ok(tracked);
        }

        self.entries.push(Box::new(Tracked {
            entity,
            state: EntityState::Transient,
            dirty: DirtyFields::Clean,
        }));
        let idx = self.entries.len() - 1;
        self.index.insert(key, idx);
        downcast_mut::<E>(self.entries[idx].as_mut())
    }

    /// The handle for `entity`, without changing its state. An entity the
    /// session has never seen comes back [`EntityState::Transient`].
    pub fn entry<E: Entity>(&mut self, entity: E) -> Result<EntityEntry<'_, E>, StoreError> {
        let tracked = self.slot(entity)?;
        Ok(EntityEntry { tracked })
    }

    /// Begin tracking `entity` as new; it is inserted on the next flush.
    pub fn track_as_new<E: Entity>(&mut self, entity: E) -> Result<EntityEntry<'_, E>, StoreError> {
        let mut entry = self.entry(entity)?;
        entry.set_state(EntityState::New);
        Ok(entry)
    }

    /// Begin tracking `entity` as already present in storage and unchanged.
    /// Entities already tracked as new stay new.
    pub fn track_as_existing<E: Entity>(
        &mut self,
        entity: E,
    ) -> Result<EntityEntry<'_, E>, StoreError> {
        let mut entry = self.entry(entity)?;
        if entry.state() != EntityState::New {
            entry.set_state(EntityState::Persisted);
        }
        Ok(entry)
    }

    /// Track `entity` with its whole row marked for writing.
    pub fn update<E: Entity>(&mut self, entity: E) -> Result<EntityEntry<'_, E>, StoreError> {
        let mut entry = self.entry(entity)?;
        if entry.state() != EntityState::New {
            entry.set_state(EntityState::Persisted);
            entry.mark_all_dirty();
        }
        Ok(entry)
    }

    /// [`Session::update`] for every element.
    pub fn update_many<E, I>(&mut self, entities: I) -> Result<(), StoreError>
    where
        E: Entity,
        I: IntoIterator<Item = E>,
    {
        for entity in entities {
            self.update(entity)?;
        }
        Ok(())
    }

    /// Mark `entity` for physical removal on the next flush. An entity that
    /// was only tracked as new is detached instead, since storage never saw it.
    pub fn remove<E: Entity>(&mut self, entity: E) -> Result<EntityEntry<'_, E>, StoreError> {
        let mut entry = self.entry(entity)?;
        if entry.state() == EntityState::New {
            entry.set_state(EntityState::Detached);
        } else {
            entry.set_state(EntityState::PendingDelete);
        }
        Ok(entry)
    }

    /// [`Session::remove`] for every element.
    pub fn remove_many<E, I>(&mut self, entities: I) -> Result<(), StoreError>
    where
        E: Entity,
        I: IntoIterator<Item = E>,
    {
        for entity in entities {
            self.remove(entity)?;
        }
        Ok(())
    }

    fn tracked<E: Entity>(&self, id: i64) -> Option<&Tracked<E>> {
        let idx = *self.index.get(&EntityKey::of::<E>(id))?;
        self.entries[idx].as_any().downcast_ref::<Tracked<E>>()
    }

    /// Tracking state of the `E` with identity `id`.
    #[must_use]
    pub fn state_of<E: Entity>(&self, id: i64) -> EntityState {
        self.tracked::<E>(id)
            .map_or(EntityState::Transient, |tracked| tracked.state)
    }

    /// The in-memory instance of the `E` with identity `id`, if the session
    /// holds one.
    #[must_use]
    pub fn tracked_entity<E: Entity>(&self, id: i64) -> Option<&E> {
        self.tracked::<E>(id).map(|tracked| &tracked.entity)
    }

    /// Number of entities the next flush considers.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|tracked| tracked.state().is_tracked())
            .count()
    }

    /// Whether the next flush would write anything.
    pub fn has_changes(&self) -> Result<bool, StoreError> {
        for tracked in &self.entries {
            if tracked.pending_write()?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Stop tracking everything without writing.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Flush pending writes to storage. Returns the number of rows affected.
    ///
    /// New entities are inserted, dirty persisted entities have exactly their
    /// dirty columns written, and entities pending deletion are removed.
    /// Transient and detached entries are dropped from the session.
    pub async fn save_changes(&mut self) -> Result<usize, StoreError> {
        let (mut inserted, mut updated, mut deleted) = (0usize, 0usize, 0usize);

        for tracked in &mut self.entries {
            let Some(write) = tracked.pending_write()? else {
                continue;
            };
            let (table, id) = (tracked.table(), tracked.id());
            match write {
                PendingWrite::Insert(row) => {
                    self.storage.insert(table, id, row).await?;
                    inserted += 1;
                }
                PendingWrite::Update(changes) => {
                    if !self.storage.update(table, id, changes).await? {
                        return Err(StoreError::Concurrency {
                            table: table.to_owned(),
                            id,
                        });
                    }
                    updated += 1;
                }
                PendingWrite::Delete => {
                    if !self.storage.delete(table, id).await? {
                        return Err(StoreError::Concurrency {
                            table: table.to_owned(),
                            id,
                        });
                    }
                    deleted += 1;
                }
            }
            tracked.accept();
        }

        self.entries.retain(|tracked| tracked.state().is_tracked());
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, tracked)| (tracked.key(), idx))
            .collect();

        info!(inserted, updated, deleted, "changes saved");
        Ok(inserted + updated + deleted)
    }

    /// Start a read of `E` rows from storage.
    #[must_use]
    pub fn query<E: Entity>(&self) -> Query<'_, E> {
        Query::new(self)
    }

    /// Look up the `E` with identity `id`.
    ///
    /// A tracked instance is returned as is. Otherwise storage is read and
    /// the default query filter applies.
    pub async fn find<E: Entity>(&self, id: i64) -> Result<Option<E>, StoreError> {
        self.model.entity_type_of::<E>()?;
        if let Some(tracked) = self.tracked::<E>(id)
            && tracked.state.is_tracked()
        {
            return Ok(Some(tracked.entity.clone()));
        }

        let Some(row) = self.storage.get(E::ENTITY_TYPE, id).await? else {
            return Ok(None);
        };
        let entity: E = decode_row(row)?;
        let visible = self
            .model
            .query_filter_for(E::ENTITY_TYPE)
            .is_none_or(|filter| filter(&entity as &dyn AnyEntity));
        Ok(visible.then_some(entity))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("model", &self.model)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}
