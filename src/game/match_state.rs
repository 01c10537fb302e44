//! Match coordinator
//!
//! Score table, round phases, tracked players and the current ball. Every
//! peer applies the same broadcasts to its own coordinator; only the
//! authority plans rounds. Planning returns the broadcast sequence instead of
//! sending it, so the coordinator stays independent of the substrate.

use rand::Rng;
use smallvec::SmallVec;
use tracing::{debug, info};

use crate::config::GameConfig;
use crate::game::arena::{sample_portal_positions, ArenaError};
use crate::game::entities::{ActorId, EntityId, EntityKind, PlayerEntity, SpawnRecord, Team, World};
use crate::game::match_result::MatchResult;
use crate::net::authority::Authority;
use crate::util::vec3::Vec3;

/// Round/match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// No ball yet (team selection, or arena before the first spawn)
    Idle,
    /// Ball live, goals count
    InRound,
    /// A goal was scored; waiting for the next round
    RoundEnding,
    /// Terminal
    MatchComplete,
}

/// Score per team, capped at the score limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreTable {
    scores: [u32; 2],
    max_score: u32,
}

impl ScoreTable {
    pub fn new(max_score: u32) -> Self {
        Self {
            scores: [0; 2],
            max_score,
        }
    }

    pub fn get(&self, team: Team) -> u32 {
        self.scores[team.index()]
    }

    pub fn scores(&self) -> [u32; 2] {
        self.scores
    }

    pub fn max_score(&self) -> u32 {
        self.max_score
    }

    pub fn has_winner(&self) -> bool {
        self.scores.iter().any(|&s| s >= self.max_score)
    }

    /// Add one point; returns the new score, or `None` once the limit is hit
    pub fn increment(&mut self, team: Team) -> Option<u32> {
        let score = &mut self.scores[team.index()];
        if *score >= self.max_score {
            return None;
        }
        *score += 1;
        Some(*score)
    }
}

/// Broadcast sequence for one round transition, in send order
#[derive(Debug, Clone, PartialEq)]
pub struct RoundPlan {
    pub team: Team,
    /// Player entities that receive `ResetPosition`
    pub resets: SmallVec<[EntityId; 2]>,
    /// Ball to destroy, if one is live
    pub old_ball: Option<EntityId>,
    pub new_ball: SpawnRecord,
    pub portals: Vec<Vec3>,
}

/// Result of asking for a new round
#[derive(Debug, Clone, PartialEq)]
pub enum RoundRequest {
    Planned(RoundPlan),
    /// Caller is not authoritative
    Suppressed,
    /// The match is already over
    MatchOver,
}

/// Effect of an applied `AddScore`
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Scored { team: Team, score: u32 },
    /// The score limit was reached; the authority must destroy `ball`
    MatchWon {
        result: MatchResult,
        ball: Option<EntityId>,
    },
    /// Match already complete; nothing changed
    Ignored,
}

#[derive(Debug)]
pub struct MatchCoordinator {
    phase: MatchPhase,
    scores: ScoreTable,
    /// Broadcast targets for `ResetPosition`, in spawn order
    players: SmallVec<[PlayerEntity; 2]>,
    ball: Option<EntityId>,
    portals: Vec<Vec3>,
    local_team: Option<Team>,
    result: Option<MatchResult>,
}

impl MatchCoordinator {
    pub fn new(max_score: u32) -> Self {
        Self {
            phase: MatchPhase::Idle,
            scores: ScoreTable::new(max_score),
            players: SmallVec::new(),
            ball: None,
            portals: Vec::new(),
            local_team: None,
            result: None,
        }
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn scores(&self) -> &ScoreTable {
        &self.scores
    }

    pub fn ball(&self) -> Option<EntityId> {
        self.ball
    }

    pub fn portals(&self) -> &[Vec3] {
        &self.portals
    }

    pub fn result(&self) -> Option<&MatchResult> {
        self.result.as_ref()
    }

    /// Team whose win indicator is shown, if any
    pub fn winner(&self) -> Option<Team> {
        self.result.as_ref().map(|r| r.winner)
    }

    pub fn local_team(&self) -> Option<Team> {
        self.local_team
    }

    pub fn set_local_team(&mut self, team: Team) {
        self.local_team = Some(team);
    }

    pub fn is_complete(&self) -> bool {
        self.phase == MatchPhase::MatchComplete
    }

    pub fn track_player(&mut self, player: PlayerEntity) {
        if self.players.iter().any(|p| p.id == player.id) {
            return;
        }
        self.players.push(player);
    }

    pub fn players(&self) -> &[PlayerEntity] {
        &self.players
    }

    pub fn player(&self, entity: EntityId) -> Option<&PlayerEntity> {
        self.players.iter().find(|p| p.id == entity)
    }

    pub fn player_mut(&mut self, entity: EntityId) -> Option<&mut PlayerEntity> {
        self.players.iter_mut().find(|p| p.id == entity)
    }

    /// Drop every player entity owned by `actor` from the broadcast list
    pub fn untrack_actor(&mut self, actor: ActorId) -> usize {
        let before = self.players.len();
        self.players.retain(|p| p.owner != actor);
        before - self.players.len()
    }

    /// A ball replica was instantiated
    pub fn on_ball_spawned(&mut self, entity: EntityId) {
        self.ball = Some(entity);
        if matches!(self.phase, MatchPhase::Idle | MatchPhase::RoundEnding) {
            self.phase = MatchPhase::InRound;
        }
    }

    /// A ball replica was destroyed
    pub fn on_ball_destroyed(&mut self, entity: EntityId) {
        if self.ball == Some(entity) {
            self.ball = None;
        }
    }

    /// Goal trigger fired locally: freeze until the next round
    pub fn on_goal(&mut self) {
        if self.phase == MatchPhase::InRound {
            self.phase = MatchPhase::RoundEnding;
        }
    }

    /// Plan `NewRound(team)`. Host-only; a guest gets `Suppressed` and
    /// nothing is touched.
    pub fn plan_new_round<R: Rng + ?Sized>(
        &self,
        team: Team,
        authority: &Authority,
        world: &mut World,
        config: &GameConfig,
        rng: &mut R,
    ) -> Result<RoundRequest, ArenaError> {
        if !authority.is_authoritative() {
            debug!("NewRound({:?}) suppressed on non-authoritative peer", team);
            return Ok(RoundRequest::Suppressed);
        }
        if self.is_complete() {
            return Ok(RoundRequest::MatchOver);
        }

        let portals =
            sample_portal_positions(&config.portal_candidates, config.portal_count, rng)?;
        let new_ball = SpawnRecord {
            entity: world.allocate_id()?,
            owner: authority.local(),
            kind: EntityKind::Ball,
            position: config.ball_origin,
        };

        Ok(RoundRequest::Planned(RoundPlan {
            team,
            resets: self.players.iter().map(|p| p.id).collect(),
            old_ball: self.ball,
            new_ball,
            portals,
        }))
    }

    /// `ResetPosition` addressed to `entity`
    pub fn apply_reset_position(&mut self, entity: EntityId) -> bool {
        match self.player_mut(entity) {
            Some(player) => {
                player.reset_position();
                true
            }
            None => false,
        }
    }

    /// `PlacePortals`
    pub fn apply_place_portals(&mut self, positions: Vec<Vec3>) {
        self.portals = positions;
    }

    /// `AddScore(team)`, applied identically on every peer
    pub fn apply_add_score(&mut self, team: Team) -> ScoreOutcome {
        if self.is_complete() {
            return ScoreOutcome::Ignored;
        }
        let Some(score) = self.scores.increment(team) else {
            return ScoreOutcome::Ignored;
        };

        if score >= self.scores.max_score() {
            let result = MatchResult::score_limit(team, self.scores.scores());
            info!("Match complete: {}", result.summary());
            self.phase = MatchPhase::MatchComplete;
            self.result = Some(result.clone());
            return ScoreOutcome::MatchWon {
                result,
                ball: self.ball,
            };
        }

        info!("{:?} scored, now {:?}", team, self.scores.scores());
        ScoreOutcome::Scored { team, score }
    }

    /// A peer left the arena. Before completion each remaining peer declares
    /// its own team the winner.
    pub fn on_peer_left(&mut self, actor: ActorId) -> Option<MatchResult> {
        self.untrack_actor(actor);
        if self.is_complete() {
            return None;
        }
        let team = self.local_team?;
        let result = MatchResult::forfeit(team, self.scores.scores());
        info!("Actor {} left early: {}", actor, result.summary());
        self.phase = MatchPhase::MatchComplete;
        self.result = Some(result.clone());
        Some(result)
    }
}
