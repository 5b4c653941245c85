use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit metadata carried by every auditable entity.
///
/// The tri-state flags distinguish "never set" (`None`) from an explicit
/// `false`; filtering treats both as not deleted. Field names are the column
/// names used in storage, so the struct is meant to be `#[serde(flatten)]`-ed
/// into the owning entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFields {
    pub is_deleted: Option<bool>,
    pub is_modified: Option<bool>,
    pub is_restored: Option<bool>,

    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub restored_at: Option<DateTime<Utc>>,

    pub created_by_id: Option<String>,
    pub modified_by_id: Option<String>,
    pub deleted_by_id: Option<String>,
    pub restored_by_id: Option<String>,
}

/// Capability implemented by entity types that take part in auditing and
/// soft delete.
pub trait Auditable: Send + Sync {
    fn audit(&self) -> &AuditFields;

    fn audit_mut(&mut self) -> &mut AuditFields;

    /// Whether the entity is soft-deleted. An unset flag counts as `false`.
    fn is_deleted(&self) -> bool {
        self.audit().is_deleted.unwrap_or(false)
    }
}

/// A stamped audit column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditField {
    IsDeleted,
    IsModified,
    IsRestored,
    CreatedAt,
    ModifiedAt,
    DeletedAt,
    RestoredAt,
    CreatedById,
    ModifiedById,
    DeletedById,
    RestoredById,
}

impl AuditField {
    /// Column name of the field in a stored row.
    #[must_use]
    pub fn column(self) -> &'static str {
        match self {
            Self::IsDeleted => "is_deleted",
            Self::IsModified => "is_modified",
            Self::IsRestored => "is_restored",
            Self::CreatedAt => "created_at",
            Self::ModifiedAt => "modified_at",
            Self::DeletedAt => "deleted_at",
            Self::RestoredAt => "restored_at",
            Self::CreatedById => "created_by_id",
            Self::ModifiedById => "modified_by_id",
            Self::DeletedById => "deleted_by_id",
            Self::RestoredById => "restored_by_id",
        }
    }
}

/// Columns stamped once at creation and never rewritten.
pub const CREATION_FIELDS: &[AuditField] = &[AuditField::CreatedAt, AuditField::CreatedById];

/// Columns written when an entity is updated or attached as modified.
pub const MODIFICATION_FIELDS: &[AuditField] = &[
    AuditField::IsModified,
    AuditField::ModifiedAt,
    AuditField::ModifiedById,
];

/// Columns written by a soft delete.
pub const DELETION_FIELDS: &[AuditField] = &[
    AuditField::DeletedAt,
    AuditField::DeletedById,
    AuditField::IsDeleted,
];

/// Columns written by a restore.
pub const RESTORATION_FIELDS: &[AuditField] = &[
    AuditField::DeletedAt,
    AuditField::DeletedById,
    AuditField::IsDeleted,
    AuditField::RestoredAt,
    AuditField::RestoredById,
    AuditField::IsRestored,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_match_serialized_names() {
        let fields = AuditFields {
            is_deleted: Some(true),
            is_modified: Some(true),
            is_restored: Some(true),
            created_at: Some(Utc::now()),
            modified_at: Some(Utc::now()),
            deleted_at: Some(Utc::now()),
            restored_at: Some(Utc::now()),
            created_by_id: Some("a".into()),
            modified_by_id: Some("b".into()),
            deleted_by_id: Some("c".into()),
            restored_by_id: Some("d".into()),
        };
        let value = serde_json::to_value(&fields).unwrap();
        let row = value.as_object().unwrap();

        let all = [
            AuditField::IsDeleted,
            AuditField::IsModified,
            AuditField::IsRestored,
            AuditField::CreatedAt,
            AuditField::ModifiedAt,
            AuditField::DeletedAt,
            AuditField::RestoredAt,
            AuditField::CreatedById,
            AuditField::ModifiedById,
            AuditField::DeletedById,
            AuditField::RestoredById,
        ];
        assert_eq!(row.len(), all.len());
        for field in all {
            assert!(row.contains_key(field.column()), "missing {field:?}");
        }
    }

    #[test]
    fn unset_deleted_flag_counts_as_live() {
        struct Record(AuditFields);
        impl Auditable for Record {
            fn audit(&self) -> &AuditFields {
                &self.0
            }
            fn audit_mut(&mut self) -> &mut AuditFields {
                &mut self.0
            }
        }

        let mut record = Record(AuditFields::default());
        assert!(!record.is_deleted());
        record.audit_mut().is_deleted = Some(false);
        assert!(!record.is_deleted());
        record.audit_mut().is_deleted = Some(true);
        assert!(record.is_deleted());
    }

    #[test]
    fn restoration_covers_deletion_columns() {
        for field in DELETION_FIELDS {
            assert!(RESTORATION_FIELDS.contains(field));
        }
        assert_eq!(MODIFICATION_FIELDS.len(), 3);
        assert_eq!(RESTORATION_FIELDS.len(), 6);
    }

    #[test]
    fn creation_columns_are_stamped_by_no_later_operation() {
        for field in CREATION_FIELDS {
            assert!(!MODIFICATION_FIELDS.contains(field));
            assert!(!DELETION_FIELDS.contains(field));
            assert!(!RESTORATION_FIELDS.contains(field));
        }
    }
}
