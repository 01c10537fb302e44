//! Replicated entity records and the per-peer world replica
//!
//! Every peer keeps the same set of spawn records, driven by `Instantiate`
//! and `Destroy` messages. Behaviour for each kind lives with the component
//! that owns it (team selection, match coordinator, ball handler).

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::game::constants::net::ENTITY_SERIAL_BITS;
use crate::util::vec3::Vec3;

/// Peer identifier assigned by the substrate on join
pub type ActorId = u32;

/// Replicated entity identifier
pub type EntityId = u64;

/// Entity id for the `serial`-th allocation of `actor`
#[inline]
pub fn entity_id(actor: ActorId, serial: u32) -> EntityId {
    (u64::from(actor) << ENTITY_SERIAL_BITS) | u64::from(serial)
}

/// The local actor has handed out every serial it owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Actor {0} has no entity ids left")]
pub struct IdsExhausted(pub ActorId);

/// One of the two playable teams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    Left,
    Right,
}

impl Team {
    pub const ALL: [Team; 2] = [Team::Left, Team::Right];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Team::Left => 0,
            Team::Right => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Team> {
        match index {
            0 => Some(Team::Left),
            1 => Some(Team::Right),
            _ => None,
        }
    }

    /// Clamp a selection index into a team: 0 stays left, anything above
    /// (including the unselected marker) becomes right.
    pub fn clamp_selection(selection: u8) -> Team {
        if selection == 0 {
            Team::Left
        } else {
            Team::Right
        }
    }

    /// Read a persisted team value, clamping it the same way
    pub fn from_persisted(value: i32) -> Team {
        Self::clamp_selection(value.clamp(0, u8::MAX as i32) as u8)
    }
}

/// Kind of replicated entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Team selection marker, lives only in the team selection scene
    Selector,
    /// Arena player, survives scene loads
    Player,
    /// The round's ball
    Ball,
}

impl EntityKind {
    /// Whether the entity is kept across scene transitions
    pub fn survives_scene_load(self) -> bool {
        matches!(self, EntityKind::Player)
    }
}

/// Replicated creation record, identical on every peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnRecord {
    pub entity: EntityId,
    pub owner: ActorId,
    pub kind: EntityKind,
    pub position: Vec3,
}

/// Arena player state
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerEntity {
    pub id: EntityId,
    pub owner: ActorId,
    pub team: Team,
    /// Captured at creation, restored by `ResetPosition`
    pub spawn_point: Vec3,
    pub position: Vec3,
    /// Normalised movement direction sampled from input
    pub direction: Vec3,
}

impl PlayerEntity {
    pub fn from_record(record: &SpawnRecord, team: Team) -> Self {
        Self {
            id: record.entity,
            owner: record.owner,
            team,
            spawn_point: record.position,
            position: record.position,
            direction: Vec3::ZERO,
        }
    }

    pub fn reset_position(&mut self) {
        self.position = self.spawn_point;
    }

    /// Set direction from horizontal/vertical axes, normalised so diagonal
    /// movement has the same speed.
    pub fn set_direction(&mut self, horizontal: f32, vertical: f32) {
        self.direction = Vec3::new(horizontal, 0.0, vertical).normalize();
    }

    /// Advance one simulation step
    pub fn step(&mut self, speed: f32, dt: f32) {
        self.position += self.direction * (speed * dt);
    }
}

/// Per-peer replica of every instantiated entity
#[derive(Debug)]
pub struct World {
    local_actor: ActorId,
    next_serial: u32,
    entities: HashMap<EntityId, SpawnRecord>,
}

impl World {
    pub fn new(local_actor: ActorId) -> Self {
        Self {
            local_actor,
            next_serial: 1,
            entities: HashMap::new(),
        }
    }

    /// Allocate an id no other peer can produce
    pub fn allocate_id(&mut self) -> Result<EntityId, IdsExhausted> {
        let serial = self.next_serial;
        self.next_serial = serial
            .checked_add(1)
            .ok_or(IdsExhausted(self.local_actor))?;
        Ok(entity_id(self.local_actor, serial))
    }

    /// Insert a record; returns false if the id is already present
    pub fn insert(&mut self, record: SpawnRecord) -> bool {
        if self.entities.contains_key(&record.entity) {
            return false;
        }
        self.entities.insert(record.entity, record);
        true
    }

    pub fn remove(&mut self, entity: EntityId) -> Option<SpawnRecord> {
        self.entities.remove(&entity)
    }

    pub fn get(&self, entity: EntityId) -> Option<&SpawnRecord> {
        self.entities.get(&entity)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    /// Whether the local peer owns the entity
    pub fn is_mine(&self, entity: EntityId) -> bool {
        self.get(entity).is_some_and(|r| r.owner == self.local_actor)
    }

    pub fn owned_by(&self, actor: ActorId) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .entities
            .values()
            .filter(|r| r.owner == actor)
            .map(|r| r.entity)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn of_kind(&self, kind: EntityKind) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .entities
            .values()
            .filter(|r| r.kind == kind)
            .map(|r| r.entity)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Drop every scene-scoped entity, returning what was removed
    pub fn scene_teardown(&mut self) -> Vec<SpawnRecord> {
        let doomed: Vec<EntityId> = self
            .entities
            .values()
            .filter(|r| !r.kind.survives_scene_load())
            .map(|r| r.entity)
            .collect();
        doomed
            .into_iter()
            .filter_map(|id| self.entities.remove(&id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
