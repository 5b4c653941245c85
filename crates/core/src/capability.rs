use crate::audit::{AuditFields, Auditable};
use crate::entity::AnyEntity;

/// Capability name carried in [`Entity::CAPABILITIES`](crate::Entity::CAPABILITIES)
/// by auditable entity types.
pub const AUDITABLE: &str = "auditable";

/// A named set of behaviour an entity type may implement.
///
/// A capability is checked at the type level through [`Capability::NAME`]
/// (against the names an entity type declares) and at the instance level
/// through [`Capability::project`].
pub trait Capability: 'static {
    /// Name listed by implementing types in `Entity::CAPABILITIES`.
    const NAME: &'static str;

    /// What a predicate over this capability sees.
    type View: ?Sized;

    /// View `entity` through this capability, if its type implements it.
    fn project(entity: &dyn AnyEntity) -> Option<&Self::View>;

    /// Whether a type declaring `capabilities` implements this capability.
    #[must_use]
    fn declared_by(capabilities: &[&str]) -> bool {
        capabilities.contains(&Self::NAME)
    }
}

/// The [`Auditable`] capability. Predicates see the entity's [`AuditFields`].
#[derive(Debug, Clone, Copy)]
pub struct AuditableCapability;

impl Capability for AuditableCapability {
    const NAME: &'static str = AUDITABLE;
    type View = AuditFields;

    fn project(entity: &dyn AnyEntity) -> Option<&AuditFields> {
        entity.auditable().map(|audit| audit.audit())
    }
}
