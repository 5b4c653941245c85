pub mod actor;
pub mod audit;
pub mod capability;
pub mod clock;
pub mod entity;

pub use actor::{ActorLookup, Anonymous, SharedActor, StaticActor};
pub use audit::{
    AuditField, AuditFields, Auditable, CREATION_FIELDS, DELETION_FIELDS, MODIFICATION_FIELDS,
    RESTORATION_FIELDS,
};
pub use capability::{AUDITABLE, AuditableCapability, Capability};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::{AnyEntity, Entity};
