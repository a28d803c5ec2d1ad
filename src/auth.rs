//! Who is performing an operation.

use std::sync::RwLock;

use crate::ids::ActorId;

/// Answers "who is the current actor". Implementations wrap whatever
/// authentication service the application uses.
pub trait AuthProvider: Send + Sync {
    /// The signed-in actor, or `None` when nobody is signed in.
    fn current_actor_id(&self) -> Option<ActorId>;
}

/// An [`AuthProvider`] whose actor is set directly. Used by embedded callers,
/// the simulator and tests.
#[derive(Debug, Default)]
pub struct StaticAuth {
    actor: RwLock<Option<ActorId>>,
}

impl StaticAuth {
    /// Nobody signed in.
    #[must_use]
    pub fn signed_out() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn signed_in(actor: ActorId) -> Self {
        Self {
            actor: RwLock::new(Some(actor)),
        }
    }

    /// Switch the current actor. `None` signs out.
    pub fn set_actor(&self, actor: Option<ActorId>) {
        match self.actor.write() {
            Ok(mut guard) => *guard = actor,
            Err(poisoned) => *poisoned.into_inner() = actor,
        }
    }
}

impl AuthProvider for StaticAuth {
    fn current_actor_id(&self) -> Option<ActorId> {
        match self.actor.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_and_out() {
        let auth = StaticAuth::signed_out();
        assert_eq!(auth.current_actor_id(), None);

        let u1 = ActorId::new("u1").unwrap();
        auth.set_actor(Some(u1.clone()));
        assert_eq!(auth.current_actor_id(), Some(u1));

        auth.set_actor(None);
        assert_eq!(auth.current_actor_id(), None);
    }
}
