use std::sync::{PoisonError, RwLock};

/// Resolves the identifier of the actor performing the current operation.
pub trait ActorLookup: Send + Sync {
    /// The current actor, or `None` before authentication.
    fn current_actor(&self) -> Option<String>;
}

/// No authenticated actor; every stamp records `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl ActorLookup for Anonymous {
    fn current_actor(&self) -> Option<String> {
        None
    }
}

/// A fixed actor, e.g. a service account.
#[derive(Debug, Clone)]
pub struct StaticActor {
    id: String,
}

impl StaticActor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl ActorLookup for StaticActor {
    fn current_actor(&self) -> Option<String> {
        Some(self.id.clone())
    }
}

/// An actor slot that can be filled or cleared at runtime, e.g. once a
/// request has been authenticated.
#[derive(Debug, Default)]
pub struct SharedActor {
    current: RwLock<Option<String>>,
}

impl SharedActor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the actor returned by subsequent lookups.
    pub fn sign_in(&self, id: impl Into<String>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(id.into());
    }

    /// Clear the actor.
    pub fn sign_out(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl ActorLookup for SharedActor {
    fn current_actor(&self) -> Option<String> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_has_no_actor() {
        assert!(Anonymous.current_actor().is_none());
    }

    #[test]
    fn static_actor_is_fixed() {
        let actor = StaticActor::new("svc-billing");
        assert_eq!(actor.current_actor().as_deref(), Some("svc-billing"));
    }

    #[test]
    fn shared_actor_follows_sign_in() {
        let actor = SharedActor::new();
        assert!(actor.current_actor().is_none());

        actor.sign_in("alice");
        assert_eq!(actor.current_actor().as_deref(), Some("alice"));

        actor.sign_in("bob");
        assert_eq!(actor.current_actor().as_deref(), Some("bob"));

        actor.sign_out();
        assert!(actor.current_actor().is_none());
    }
}
