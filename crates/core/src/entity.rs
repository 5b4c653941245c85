use std::any::Any;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::audit::Auditable;

/// A type that can be persisted through the store.
///
/// Entities are plain data: they serialize to a row keyed by [`Entity::id`]
/// inside the table named by [`Entity::ENTITY_TYPE`].
///
/// Participation in auditing is opted into by implementing [`Auditable`],
/// listing [`AUDITABLE`](crate::capability::AUDITABLE) in
/// [`Entity::CAPABILITIES`] and returning `Some(self)` from the two
/// `as_auditable*` projections. A type either does all three or none.
///
/// ```
/// use auditable_core::{AUDITABLE, AuditFields, Auditable, Entity};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Invoice {
///     id: i64,
///     total_cents: i64,
///     #[serde(flatten)]
///     audit: AuditFields,
/// }
///
/// impl Auditable for Invoice {
///     fn audit(&self) -> &AuditFields {
///         &self.audit
///     }
///     fn audit_mut(&mut self) -> &mut AuditFields {
///         &mut self.audit
///     }
/// }
///
/// impl Entity for Invoice {
///     const ENTITY_TYPE: &'static str = "invoices";
///     const CAPABILITIES: &'static [&'static str] = &[AUDITABLE];
///
///     fn id(&self) -> i64 {
///         self.id
///     }
///     fn as_auditable(&self) -> Option<&dyn Auditable> {
///         Some(self)
///     }
///     fn as_auditable_mut(&mut self) -> Option<&mut dyn Auditable> {
///         Some(self)
///     }
/// }
/// ```
pub trait Entity: Any + Clone + Send + Sync + Serialize + DeserializeOwned {
    /// Schema name of the entity type; doubles as the storage table name.
    const ENTITY_TYPE: &'static str;

    /// Declared base entity type, `None` for a hierarchy root.
    const BASE_TYPE: Option<&'static str> = None;

    /// Names of the capabilities this type implements.
    const CAPABILITIES: &'static [&'static str] = &[];

    /// Identity, unique per instance within the entity type.
    fn id(&self) -> i64;

    /// Audit view of this entity, if the type is auditable.
    fn as_auditable(&self) -> Option<&dyn Auditable> {
        None
    }

    /// Mutable audit view of this entity, if the type is auditable.
    fn as_auditable_mut(&mut self) -> Option<&mut dyn Auditable> {
        None
    }
}

/// Object-safe view over any [`Entity`].
///
/// Query filters and capability projections operate on `&dyn AnyEntity` so a
/// single predicate can be shared by every entity type.
pub trait AnyEntity: Any + Send + Sync {
    /// Schema name of the concrete type.
    fn entity_type(&self) -> &'static str;

    /// Identity of this instance.
    fn entity_id(&self) -> i64;

    /// Upcast for downcasting back to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Audit view, if the concrete type is auditable.
    fn auditable(&self) -> Option<&dyn Auditable>;
}

impl<E: Entity> AnyEntity for E {
    fn entity_type(&self) -> &'static str {
        E::ENTITY_TYPE
    }

    fn entity_id(&self) -> i64 {
        self.id()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn auditable(&self) -> Option<&dyn Auditable> {
        self.as_auditable()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::audit::AuditFields;
    use crate::capability::AUDITABLE;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Tag {
        id: i64,
        label: String,
    }

    impl Entity for Tag {
        const ENTITY_TYPE: &'static str = "tags";

        fn id(&self) -> i64 {
            self.id
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Note {
        id: i64,
        #[serde(flatten)]
        audit: AuditFields,
    }

    impl Auditable for Note {
        fn audit(&self) -> &AuditFields {
            &self.audit
        }

        fn audit_mut(&mut self) -> &mut AuditFields {
            &mut self.audit
        }
    }

    impl Entity for Note {
        const ENTITY_TYPE: &'static str = "notes";
        const CAPABILITIES: &'static [&'static str] = &[AUDITABLE];

        fn id(&self) -> i64 {
            self.id
        }

        fn as_auditable(&self) -> Option<&dyn Auditable> {
            Some(self)
        }

        fn as_auditable_mut(&mut self) -> Option<&mut dyn Auditable> {
            Some(self)
        }
    }

    #[test]
    fn plain_entity_has_no_audit_view() {
        let tag = Tag {
            id: 3,
            label: "urgent".into(),
        };
        let erased: &dyn AnyEntity = &tag;
        assert_eq!(erased.entity_type(), "tags");
        assert_eq!(erased.entity_id(), 3);
        assert!(erased.auditable().is_none());
        assert!(Tag::BASE_TYPE.is_none());
        assert!(Tag::CAPABILITIES.is_empty());
    }

    #[test]
    fn auditable_entity_projects_through_any_entity() {
        let mut note = Note {
            id: 9,
            audit: AuditFields::default(),
        };
        note.as_auditable_mut()
            .expect("note is auditable")
            .audit_mut()
            .is_deleted = Some(true);

        let erased: &dyn AnyEntity = &note;
        let audit = erased.auditable().expect("auditable view");
        assert!(audit.is_deleted());
        assert!(erased.as_any().downcast_ref::<Note>().is_some());
    }
}
