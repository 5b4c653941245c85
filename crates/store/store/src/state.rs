use std::fmt;

/// Where a tracked entity stands relative to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntityState {
    /// Not known to the session.
    #[default]
    Transient,
    /// Tracked, not yet written to storage. Inserted on the next flush.
    New,
    /// Tracked and present in storage. Dirty fields are written on the next flush.
    Persisted,
    /// Tracked and marked for physical removal on the next flush.
    PendingDelete,
    /// Explicitly untracked. Nothing is written for it.
    Detached,
}

impl EntityState {
    /// Whether the session writes anything for an entity in this state.
    #[must_use]
    pub fn is_tracked(self) -> bool {
        matches!(self, Self::New | Self::Persisted | Self::PendingDelete)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::New => "new",
            Self::Persisted => "persisted",
            Self::PendingDelete => "pending_delete",
            Self::Detached => "detached",
        }
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
