//! Team selection
//!
//! Each peer owns one `TeamSelector` whose index starts unselected and moves
//! within `[0, 2]` on input. The index is streamed to the other peers, who
//! feed changes into `TeamSelection::change_team`. The host derives `ready`
//! from the two slots and, once ready, may confirm: every selector is locked
//! and its team persisted.

use hashbrown::HashMap;
use tracing::{debug, info};

use crate::game::constants::net::FIRST_ACTOR;
use crate::game::constants::team::{MAX_SELECTION, SLOTS, UNSELECTED};
use crate::game::constants::team_key;
use crate::game::entities::{ActorId, EntityId, Team};
use crate::game::input::SelectStep;
use crate::net::authority::Authority;
use crate::net::protocol::StreamUpdate;
use crate::settings::{SettingsError, SettingsStore};

/// One player's selection marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamSelector {
    pub entity: EntityId,
    pub owner: ActorId,
    team_index: u8,
    can_choose: bool,
}

impl TeamSelector {
    pub fn new(entity: EntityId, owner: ActorId) -> Self {
        Self {
            entity,
            owner,
            team_index: UNSELECTED,
            can_choose: true,
        }
    }

    pub fn team_index(&self) -> u8 {
        self.team_index
    }

    pub fn is_locked(&self) -> bool {
        !self.can_choose
    }

    /// Index one step in `step` direction, if still in bounds and unlocked
    fn next_index(&self, step: SelectStep) -> Option<u8> {
        if !self.can_choose {
            return None;
        }
        match step {
            SelectStep::Left if self.team_index > 0 => Some(self.team_index - 1),
            SelectStep::Right if self.team_index < MAX_SELECTION => Some(self.team_index + 1),
            _ => None,
        }
    }

    /// Write side of the state stream
    pub fn stream_sample(&self) -> StreamUpdate {
        StreamUpdate {
            entity: self.entity,
            team_index: self.team_index,
        }
    }

    /// Read side of the state stream; returns the new index if it changed
    fn apply_stream(&mut self, team_index: u8) -> Option<u8> {
        if team_index == self.team_index {
            return None;
        }
        self.team_index = team_index;
        Some(team_index)
    }

    /// Stop further changes; returns the team that gets persisted
    fn lock(&mut self) -> Team {
        self.can_choose = false;
        Team::clamp_selection(self.team_index)
    }
}

/// Why a confirm did not go ahead
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfirmError {
    #[error("Only the host can confirm teams")]
    NotAuthoritative,
    #[error("Teams are not ready")]
    NotReady,
    #[error("Teams were already confirmed")]
    AlreadyConfirmed,
}

/// Shared selection panel state plus every selector replica
#[derive(Debug)]
pub struct TeamSelection {
    slots: [u8; SLOTS],
    ready: bool,
    confirmed: bool,
    selectors: HashMap<EntityId, TeamSelector>,
}

impl TeamSelection {
    pub fn new() -> Self {
        Self {
            slots: [UNSELECTED; SLOTS],
            ready: false,
            confirmed: false,
            selectors: HashMap::new(),
        }
    }

    /// Panel slot showing `actor`'s choice: the first actor is player 1
    pub fn slot_for(actor: ActorId) -> usize {
        if actor == FIRST_ACTOR {
            0
        } else {
            1
        }
    }

    /// Both slots chosen and different
    pub fn slots_ready(slots: &[u8; SLOTS]) -> bool {
        slots[0] != UNSELECTED && slots[1] != UNSELECTED && slots[0] != slots[1]
    }

    /// Update the indicator for `actor`. On the host this also recomputes
    /// `ready`, until the teams are confirmed. There is no rejection path:
    /// the change always succeeds.
    pub fn change_team(&mut self, actor: ActorId, team_index: u8, authority: &Authority) -> bool {
        let slot = Self::slot_for(actor);
        self.slots[slot] = team_index.min(MAX_SELECTION);
        if authority.is_authoritative() && !self.confirmed {
            self.ready = Self::slots_ready(&self.slots);
        }
        debug!(
            "Actor {} now shows team index {} (ready: {})",
            actor, self.slots[slot], self.ready
        );
        true
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn slots(&self) -> [u8; SLOTS] {
        self.slots
    }

    pub fn add_selector(&mut self, selector: TeamSelector) {
        self.selectors.insert(selector.entity, selector);
    }

    pub fn remove_selector(&mut self, entity: EntityId) -> Option<TeamSelector> {
        self.selectors.remove(&entity)
    }

    pub fn selector(&self, entity: EntityId) -> Option<&TeamSelector> {
        self.selectors.get(&entity)
    }

    /// Selector owned by `actor`, if it has spawned
    pub fn selector_of(&self, actor: ActorId) -> Option<&TeamSelector> {
        self.selectors.values().find(|s| s.owner == actor)
    }

    pub fn selector_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.selectors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Apply a select-left/right press to the local peer's own selector
    pub fn local_step(&mut self, step: SelectStep, authority: &Authority) -> Option<u8> {
        let local = authority.local();
        let (entity, next) = {
            let selector = self.selector_of(local)?;
            (selector.entity, selector.next_index(step)?)
        };

        if self.change_team(local, next, authority) {
            if let Some(selector) = self.selectors.get_mut(&entity) {
                selector.team_index = next;
            }
            Some(next)
        } else {
            None
        }
    }

    /// Stream sample from a remote selector
    pub fn apply_stream(&mut self, update: StreamUpdate, authority: &Authority) -> bool {
        let Some(selector) = self.selectors.get_mut(&update.entity) else {
            return false;
        };
        if selector.owner == authority.local() {
            return false;
        }
        match selector.apply_stream(update.team_index) {
            Some(index) => {
                let owner = selector.owner;
                self.change_team(owner, index, authority)
            }
            None => false,
        }
    }

    /// Host-side gate for confirming. Returns the selectors the lock must be
    /// sent to; nothing changes until `mark_confirmed`.
    pub fn begin_confirm(&self, authority: &Authority) -> Result<Vec<EntityId>, ConfirmError> {
        if !authority.is_authoritative() {
            return Err(ConfirmError::NotAuthoritative);
        }
        if self.confirmed {
            return Err(ConfirmError::AlreadyConfirmed);
        }
        if !self.ready {
            return Err(ConfirmError::NotReady);
        }
        Ok(self.selector_ids())
    }

    /// The lock went out to every selector
    pub fn mark_confirmed(&mut self) {
        self.ready = false;
        self.confirmed = true;
    }

    /// Lock a selector and persist its owner's team
    pub fn disable_choose(
        &mut self,
        entity: EntityId,
        settings: &mut dyn SettingsStore,
    ) -> Result<Option<Team>, SettingsError> {
        let Some(selector) = self.selectors.get_mut(&entity) else {
            return Ok(None);
        };
        let team = selector.lock();
        settings.set_int(&team_key(selector.owner), team.index() as i32)?;
        info!("Actor {} locked team {:?}", selector.owner, team);
        Ok(Some(team))
    }
}

impl Default for TeamSelection {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettings;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn host() -> Authority {
        Authority::new(1, Some(1))
    }

    fn guest() -> Authority {
        Authority::new(2, Some(1))
    }

    fn selection_with_both() -> TeamSelection {
        let mut selection = TeamSelection::new();
        selection.add_selector(TeamSelector::new(1001, 1));
        selection.add_selector(TeamSelector::new(2001, 2));
        selection
    }

    #[test]
    fn test_ready_iff_distinct_and_selected() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut selection = TeamSelection::new();
        let authority = host();

        for _ in 0..500 {
            let actor = rng.gen_range(1..=2);
            let index = rng.gen_range(0..=2);
            selection.change_team(actor, index, &authority);

            let [a, b] = selection.slots();
            let expected = a != UNSELECTED && b != UNSELECTED && a != b;
            assert_eq!(selection.is_ready(), expected);
        }
    }

    #[test]
    fn test_distinct_teams_become_ready() {
        let mut selection = TeamSelection::new();
        selection.change_team(1, 0, &host());
        assert!(!selection.is_ready());
        selection.change_team(2, 1, &host());
        assert!(selection.is_ready());
    }

    #[test]
    fn test_same_team_not_ready() {
        let mut selection = TeamSelection::new();
        selection.change_team(1, 0, &host());
        selection.change_team(2, 0, &host());
        assert!(!selection.is_ready());
    }

    #[test]
    fn test_guest_never_computes_ready() {
        let mut selection = TeamSelection::new();
        selection.change_team(1, 0, &guest());
        selection.change_team(2, 1, &guest());
        assert_eq!(selection.slots(), [0, 1]);
        assert!(!selection.is_ready());
    }

    #[test]
    fn test_local_step_bounds() {
        let mut selection = selection_with_both();
        let authority = host();

        assert_eq!(selection.local_step(SelectStep::Right, &authority), None);
        assert_eq!(selection.local_step(SelectStep::Left, &authority), Some(1));
        assert_eq!(selection.local_step(SelectStep::Left, &authority), Some(0));
        assert_eq!(selection.local_step(SelectStep::Left, &authority), None);
        assert_eq!(selection.selector(1001).unwrap().team_index(), 0);
        assert_eq!(selection.slots()[0], 0);
        // Remote selector untouched
        assert_eq!(selection.selector(2001).unwrap().team_index(), UNSELECTED);
    }

    #[test]
    fn test_stream_applies_only_changes_from_remote() {
        let mut selection = selection_with_both();
        let authority = host();

        let unchanged = StreamUpdate {
            entity: 2001,
            team_index: UNSELECTED,
        };
        assert!(!selection.apply_stream(unchanged, &authority));

        let changed = StreamUpdate {
            entity: 2001,
            team_index: 1,
        };
        assert!(selection.apply_stream(changed, &authority));
        assert_eq!(selection.slots(), [UNSELECTED, 1]);

        let own = StreamUpdate {
            entity: 1001,
            team_index: 0,
        };
        assert!(!selection.apply_stream(own, &authority));
    }

    #[test]
    fn test_confirm_gates() {
        let mut selection = selection_with_both();
        assert_eq!(
            selection.begin_confirm(&guest()),
            Err(ConfirmError::NotAuthoritative)
        );
        assert_eq!(selection.begin_confirm(&host()), Err(ConfirmError::NotReady));

        selection.change_team(1, 0, &host());
        selection.change_team(2, 1, &host());
        assert_eq!(selection.begin_confirm(&host()), Ok(vec![1001, 2001]));
        // Still retryable until the lock is recorded
        assert!(selection.is_ready());
        assert_eq!(selection.begin_confirm(&host()), Ok(vec![1001, 2001]));

        selection.mark_confirmed();
        assert!(!selection.is_ready());
        assert_eq!(
            selection.begin_confirm(&host()),
            Err(ConfirmError::AlreadyConfirmed)
        );
    }

    #[test]
    fn test_late_change_after_confirm_keeps_ready_clear() {
        let mut selection = selection_with_both();
        let authority = host();
        selection.change_team(1, 0, &authority);
        selection.change_team(2, 1, &authority);
        selection.begin_confirm(&authority).unwrap();
        selection.mark_confirmed();

        selection.change_team(2, 0, &authority);
        selection.change_team(2, 1, &authority);
        assert_eq!(selection.slots(), [0, 1]);
        assert!(!selection.is_ready());
    }

    #[test]
    fn test_disable_choose_locks_and_persists() {
        let mut selection = selection_with_both();
        let mut settings = MemorySettings::new();
        let authority = host();
        selection.local_step(SelectStep::Left, &authority);

        let team = selection.disable_choose(1001, &mut settings).unwrap();
        assert_eq!(team, Some(Team::Right));
        assert_eq!(settings.get_int("player1Team"), 1);
        assert!(selection.selector(1001).unwrap().is_locked());
        assert_eq!(selection.local_step(SelectStep::Left, &authority), None);
    }

    #[test]
    fn test_unselected_persists_clamped() {
        let mut selection = selection_with_both();
        let mut settings = MemorySettings::new();
        selection.disable_choose(2001, &mut settings).unwrap();
        assert_eq!(settings.get_int("player2Team"), 1);
    }

    #[test]
    fn test_disable_unknown_selector() {
        let mut selection = TeamSelection::new();
        let mut settings = MemorySettings::new();
        assert_eq!(selection.disable_choose(42, &mut settings).unwrap(), None);
    }
}
