use std::sync::Arc;

use auditable_core::{AnyEntity, AuditFields, Capability};
use auditable_store::{EntityType, ModelBuilder, QueryFilter};
use tracing::debug;

use crate::error::GatewayError;

/// Default visibility of an auditable row: visible unless `is_deleted` is
/// explicitly `true`.
#[must_use]
pub fn is_visible(audit: &AuditFields) -> bool {
    audit.is_deleted != Some(true)
}

/// Install `predicate` as the default read filter of every entity type that
/// declares the capability `C`.
///
/// Only hierarchy roots receive a filter; derived types inherit their root's
/// filter through the model. Must run during model setup, before the model is
/// built. Returns the number of entity types that received a filter.
pub fn apply_global_filters<C, F>(
    builder: &mut ModelBuilder,
    predicate: F,
) -> Result<usize, GatewayError>
where
    C: Capability,
    F: Fn(&C::View) -> bool + Send + Sync + 'static,
{
    let roots: Vec<&'static str> = builder
        .entity_types_implementing::<C>()
        .filter(|ty| ty.is_root())
        .map(EntityType::name)
        .collect();

    let predicate = Arc::new(predicate);
    for &name in &roots {
        let predicate = Arc::clone(&predicate);
        let filter: QueryFilter = Arc::new(move |entity: &dyn AnyEntity| {
            C::project(entity).is_none_or(|view| predicate(view))
        });
        builder
            .has_query_filter(name, filter)
            .map_err(|e| GatewayError::FilterInstallation(format!("{name}: {e}")))?;
        debug!(entity_type = name, capability = C::NAME, "query filter installed");
    }
    Ok(roots.len())
}
