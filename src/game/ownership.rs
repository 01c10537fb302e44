//! Entity ownership registry
//!
//! Maps each connected peer to the player entity it controls. Entries outlive
//! scene loads and are dropped only when the peer leaves.

use hashbrown::HashMap;

use crate::game::entities::{ActorId, EntityId};

#[derive(Debug, Default)]
pub struct OwnershipRegistry {
    by_actor: HashMap<ActorId, EntityId>,
}

impl OwnershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `entity` as the player entity of `actor`, returning the entity
    /// it replaced, if any.
    pub fn register(&mut self, actor: ActorId, entity: EntityId) -> Option<EntityId> {
        self.by_actor.insert(actor, entity)
    }

    pub fn entity_of(&self, actor: ActorId) -> Option<EntityId> {
        self.by_actor.get(&actor).copied()
    }

    pub fn owns_player(&self, actor: ActorId) -> bool {
        self.by_actor.contains_key(&actor)
    }

    /// Drop the entry for a departed peer
    pub fn remove_actor(&mut self, actor: ActorId) -> Option<EntityId> {
        self.by_actor.remove(&actor)
    }

    /// Drop whichever entry points at `entity`
    pub fn remove_entity(&mut self, entity: EntityId) -> Option<ActorId> {
        let actor = self
            .by_actor
            .iter()
            .find(|(_, e)| **e == entity)
            .map(|(a, _)| *a)?;
        self.by_actor.remove(&actor);
        Some(actor)
    }

    pub fn len(&self) -> usize {
        self.by_actor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_actor.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_actor.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = OwnershipRegistry::new();
        assert_eq!(registry.register(1, 1001), None);
        assert_eq!(registry.entity_of(1), Some(1001));
        assert!(registry.owns_player(1));
        assert!(!registry.owns_player(2));
    }

    #[test]
    fn test_reregister_returns_previous() {
        let mut registry = OwnershipRegistry::new();
        registry.register(1, 1001);
        assert_eq!(registry.register(1, 1002), Some(1001));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_actor() {
        let mut registry = OwnershipRegistry::new();
        registry.register(1, 1001);
        registry.register(2, 2001);

        assert_eq!(registry.remove_actor(2), Some(2001));
        assert_eq!(registry.entity_of(2), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_entity() {
        let mut registry = OwnershipRegistry::new();
        registry.register(1, 1001);
        assert_eq!(registry.remove_entity(1001), Some(1));
        assert_eq!(registry.remove_entity(1001), None);
        assert!(registry.is_empty());
    }
}
