use std::marker::PhantomData;

use auditable_core::{AnyEntity, Entity};

use crate::error::StoreError;
use crate::session::Session;
use crate::storage::Row;

type Predicate<'s, E> = Box<dyn Fn(&E) -> bool + Send + Sync + 's>;

/// A read of `E` rows from storage.
///
/// By default the model's query filter for `E` (inherited from its root
/// type) is applied; [`Query::ignore_query_filters`] bypasses it. Reads see
/// flushed state only and do not attach results to the session.
pub struct Query<'s, E: Entity> {
    session: &'s Session,
    ignore_query_filters: bool,
    predicates: Vec<Predicate<'s, E>>,
    _entity: PhantomData<fn() -> E>,
}

impl<'s, E: Entity> Query<'s, E> {
    pub(crate) fn new(session: &'s Session) -> Self {
        Self {
            session,
            ignore_query_filters: false,
            predicates: Vec::new(),
            _entity: PhantomData,
        }
    }

    /// Skip the default query filter for this read.
    #[must_use]
    pub fn ignore_query_filters(mut self) -> Self {
        self.ignore_query_filters = true;
        self
    }

    /// Keep only rows matching `predicate`, in addition to any query filter.
    #[must_use]
    pub fn filter(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 's) -> Self {
        self.predicates.push(Box::new(predicate));
        self
    }

    /// Run the read, returning matching rows ordered by id.
    pub async fn to_list(self) -> Result<Vec<E>, StoreError> {
        let model = self.session.model();
        model.entity_type_of::<E>()?;
        let query_filter = if self.ignore_query_filters {
            None
        } else {
            model.query_filter_for(E::ENTITY_TYPE)
        };

        let rows = self.session.storage().scan(E::ENTITY_TYPE).await?;
        let mut matching = Vec::with_capacity(rows.len());
        for row in rows {
            let entity: E = decode_row(row)?;
            if query_filter.is_some_and(|filter| !filter(&entity as &dyn AnyEntity)) {
                continue;
            }
            if self.predicates.iter().all(|predicate| predicate(&entity)) {
                matching.push(entity);
            }
        }
        Ok(matching)
    }

    /// The first matching row by id.
    pub async fn first(self) -> Result<Option<E>, StoreError> {
        Ok(self.to_list().await?.into_iter().next())
    }

    /// Number of matching rows.
    pub async fn count(self) -> Result<usize, StoreError> {
        Ok(self.to_list().await?.len())
    }
}

pub(crate) fn decode_row<E: Entity>(row: Row) -> Result<E, StoreError> {
    serde_json::from_value(serde_json::Value::Object(row)).map_err(|e| {
        StoreError::Serialization(format!("cannot decode {} row: {e}", E::ENTITY_TYPE))
    })
}
