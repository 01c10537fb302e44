//! Peer session - the per-peer service container and tick loop
//!
//! A `PeerSession` is built once per room join and owns every coordinator the
//! peer needs. Each tick it drains the substrate, dispatches invocations
//! through the handler table, samples input, runs deferred work and streams
//! its selector state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::config::GameConfig;
use crate::game::arena::{sample_portal_positions, spawn_point, ArenaError};
use crate::game::ball::{BallHandler, BounceCoefficients, Contact, ContactKind, DeferredTask};
use crate::game::constants::net::MATCH_VIEW;
use crate::game::constants::team_key;
use crate::game::entities::{
    ActorId, EntityId, EntityKind, IdsExhausted, PlayerEntity, SpawnRecord, Team, World,
};
use crate::game::input::{InputBuffer, InputSender, TickInput};
use crate::game::match_result::MatchResult;
use crate::game::match_state::{MatchCoordinator, RoundPlan, RoundRequest, ScoreOutcome};
use crate::game::ownership::OwnershipRegistry;
use crate::game::scheduler::{Scheduler, TaskHandle};
use crate::game::team_selection::{ConfirmError, TeamSelection, TeamSelector};
use crate::lobby::scene::{Scene, SceneDirector};
use crate::metrics::Metrics;
use crate::net::authority::Authority;
use crate::net::protocol::{Envelope, PeerMessage, RpcCall, RpcKind, Target};
use crate::net::router::Router;
use crate::net::session::{notify, SessionEvent, SessionListener};
use crate::net::substrate::{Inbound, Substrate, SubstrateError};
use crate::settings::SettingsStore;
use crate::util::vec3::Vec3;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Substrate(#[from] SubstrateError),
    #[error(transparent)]
    Confirm(#[from] ConfirmError),
    #[error(transparent)]
    Arena(#[from] ArenaError),
    #[error(transparent)]
    Ids(#[from] IdsExhausted),
}

/// Things the presentation layer reacts to, drained once per tick
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    SceneLoaded(Scene),
    /// The host's ready button became (un)available
    ReadyChanged(bool),
    TeamLocked { actor: ActorId, team: Team },
    ScoreChanged([u32; 2]),
    /// Win indicator revealed
    MatchEnded(MatchResult),
    LeftRoom,
}

pub struct PeerSession<S: Substrate, K: SettingsStore> {
    substrate: S,
    settings: K,
    config: GameConfig,
    metrics: Arc<Metrics>,
    authority: Authority,
    world: World,
    registry: OwnershipRegistry,
    scenes: SceneDirector,
    selection: TeamSelection,
    matches: MatchCoordinator,
    ball: Option<BallHandler>,
    scheduler: Scheduler<DeferredTask>,
    router: Arc<Router<PeerSession<S, K>>>,
    input: InputBuffer,
    rng: StdRng,
    in_room: bool,
    last_ready: bool,
    notices: Vec<SessionNotice>,
}

impl<S: Substrate, K: SettingsStore> PeerSession<S, K> {
    pub fn new(substrate: S, settings: K, config: GameConfig, metrics: Arc<Metrics>) -> Self {
        let local = substrate.local_actor();
        let authority = Authority::new(local, substrate.host_actor());
        info!(
            "Peer session for actor {} (authoritative: {})",
            local,
            authority.is_authoritative()
        );

        let mut router: Router<PeerSession<S, K>> = Router::new();
        router
            .register(RpcKind::ResetPosition, on_reset_position::<S, K>)
            .register(RpcKind::AddScore, on_add_score::<S, K>)
            .register(RpcKind::DisableChoose, on_disable_choose::<S, K>)
            .register(RpcKind::PlacePortals, on_place_portals::<S, K>);
        debug_assert!(router.is_complete());

        Self {
            substrate,
            settings,
            matches: MatchCoordinator::new(config.max_score),
            config,
            metrics,
            authority,
            world: World::new(local),
            registry: OwnershipRegistry::new(),
            scenes: SceneDirector::new(),
            selection: TeamSelection::new(),
            ball: None,
            scheduler: Scheduler::new(),
            router: Arc::new(router),
            input: InputBuffer::default(),
            rng: StdRng::from_entropy(),
            in_room: true,
            last_ready: false,
            notices: Vec::new(),
        }
    }

    /// Replace the portal sampling RNG with a seeded one
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn local_actor(&self) -> ActorId {
        self.authority.local()
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn scene(&self) -> Scene {
        self.scenes.current()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn registry(&self) -> &OwnershipRegistry {
        &self.registry
    }

    pub fn selection(&self) -> &TeamSelection {
        &self.selection
    }

    pub fn match_state(&self) -> &MatchCoordinator {
        &self.matches
    }

    pub fn ball_handler(&self) -> Option<&BallHandler> {
        self.ball.as_ref()
    }

    pub fn settings(&self) -> &K {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn is_in_room(&self) -> bool {
        self.in_room
    }

    /// Handle for whatever produces player intents
    pub fn input_sender(&self) -> InputSender {
        self.input.sender()
    }

    /// The local peer's own player entity, once spawned
    pub fn local_player(&self) -> Option<&PlayerEntity> {
        let entity = self.registry.entity_of(self.local_actor())?;
        self.matches.player(entity)
    }

    /// Enter team selection and spawn the local selector
    pub fn join(&mut self) -> Result<EntityId, SessionError> {
        self.load_local_scene(Scene::TeamSelection);
        let record = SpawnRecord {
            entity: self.world.allocate_id()?,
            owner: self.local_actor(),
            kind: EntityKind::Selector,
            position: Vec3::ZERO,
        };
        let entity = record.entity;
        self.send(Target::All, PeerMessage::Instantiate(record))?;
        Ok(entity)
    }

    /// Run one simulation step
    pub fn tick(&mut self, dt: Duration) -> Vec<SessionNotice> {
        let started = Instant::now();

        for inbound in self.substrate.poll() {
            match inbound {
                Inbound::Message(envelope) => self.handle_message(envelope),
                Inbound::Session(event) => self.handle_session_event(event),
                Inbound::Undecodable => Metrics::incr(&self.metrics.decode_failures),
            }
        }

        let input = self.input.sample();
        if !input.is_empty() {
            self.apply_input(input);
        }

        for task in self.scheduler.advance(dt) {
            self.run_deferred(task);
        }

        self.step_local_player(dt);
        self.write_stream();

        let ready = self.selection.is_ready();
        if ready != self.last_ready {
            self.last_ready = ready;
            self.notices.push(SessionNotice::ReadyChanged(ready));
        }

        self.metrics.record_tick_time(started.elapsed());
        std::mem::take(&mut self.notices)
    }

    /// Host presses the ready button: lock every selector, close the room and
    /// move everyone to the arena
    pub fn confirm_team(&mut self) -> Result<(), SessionError> {
        let selectors = match self.selection.begin_confirm(&self.authority) {
            Ok(selectors) => selectors,
            Err(e) => {
                if e == ConfirmError::NotAuthoritative {
                    Metrics::incr(&self.metrics.authority_suppressed);
                }
                debug!("ConfirmTeam refused: {}", e);
                return Err(e.into());
            }
        };

        // Confirmed only once everything is sent; a repeated DisableChoose is
        // harmless on receivers
        for entity in selectors {
            self.send(
                Target::All,
                PeerMessage::Rpc {
                    view: entity,
                    call: RpcCall::DisableChoose,
                },
            )?;
        }
        self.substrate.set_room_open(false)?;
        self.send(Target::All, PeerMessage::LoadScene { scene: Scene::Arena })?;
        self.selection.mark_confirmed();
        info!("Teams confirmed, loading arena");
        Ok(())
    }

    /// Authority-only round advance. Every peer may call it; on a guest it
    /// is a no-op.
    pub fn request_new_round(&mut self, team: Team) -> Result<RoundRequest, SessionError> {
        let request = self.matches.plan_new_round(
            team,
            &self.authority,
            &mut self.world,
            &self.config,
            &mut self.rng,
        )?;
        match &request {
            RoundRequest::Planned(plan) => {
                Metrics::incr(&self.metrics.rounds_started);
                self.broadcast_round(plan)?;
            }
            RoundRequest::Suppressed => Metrics::incr(&self.metrics.authority_suppressed),
            RoundRequest::MatchOver => debug!("NewRound({:?}) after match end ignored", team),
        }
        Ok(request)
    }

    /// Physics contact on the live ball. Returns the impulse to apply, which
    /// only the authority ever gets.
    pub fn on_ball_collision(&self, contact: Contact) -> Option<Vec3> {
        let handler = self.ball.as_ref()?;
        let bounce = BounceCoefficients {
            wall: self.config.wall_bounce,
            player: self.config.player_bounce,
        };
        let impulse = handler.on_collision(contact, &self.authority, bounce);
        if impulse.is_none() && contact.kind != ContactKind::Other {
            Metrics::incr(&self.metrics.authority_suppressed);
        }
        impulse
    }

    /// Live ball entered the goal trigger tagged with `team`
    pub fn on_ball_trigger(&mut self, team: Team) -> Option<TaskHandle> {
        if !self.scenes.is(Scene::Arena) || self.matches.is_complete() {
            return None;
        }
        let handler = self.ball.as_mut()?;
        let handle = handler.on_trigger_enter(team, &mut self.scheduler, self.config.goal_delay)?;
        self.matches.on_goal();
        debug!("Goal for {:?}, round request deferred", team);
        Some(handle)
    }

    /// Leave the room; teardown follows when the substrate confirms
    pub fn leave_room(&mut self) {
        if !self.in_room {
            return;
        }
        self.in_room = false;
        self.substrate.leave_room();
    }

    fn send(&mut self, target: Target, message: PeerMessage) -> Result<(), SubstrateError> {
        let bytes = self.substrate.send(target, message)?;
        self.metrics.record_sent(bytes);
        Ok(())
    }

    fn send_or_warn(&mut self, target: Target, message: PeerMessage) {
        if let Err(e) = self.send(target, message) {
            warn!("Actor {} failed to send: {}", self.local_actor(), e);
        }
    }

    fn broadcast_round(&mut self, plan: &RoundPlan) -> Result<(), SubstrateError> {
        info!("NewRound: {:?} scored", plan.team);
        for &player in &plan.resets {
            self.send(
                Target::All,
                PeerMessage::Rpc {
                    view: player,
                    call: RpcCall::ResetPosition,
                },
            )?;
        }
        if let Some(ball) = plan.old_ball {
            self.send(Target::All, PeerMessage::Destroy { entity: ball })?;
        }
        self.send(Target::All, PeerMessage::Instantiate(plan.new_ball.clone()))?;
        self.send(
            Target::All,
            PeerMessage::Rpc {
                view: MATCH_VIEW,
                call: RpcCall::PlacePortals {
                    positions: plan.portals.clone(),
                },
            },
        )?;
        self.send(
            Target::All,
            PeerMessage::Rpc {
                view: MATCH_VIEW,
                call: RpcCall::AddScore { team: plan.team },
            },
        )
    }

    fn handle_message(&mut self, envelope: Envelope) {
        Metrics::incr(&self.metrics.messages_received);
        match &envelope.message {
            PeerMessage::Rpc { view, .. } => {
                let view = *view;
                let router = Arc::clone(&self.router);
                match router.dispatch(self, &envelope) {
                    Ok(kind) => debug!("Dispatched {:?} on view {}", kind, view),
                    Err(e) => warn!("Dropped invocation from actor {}: {}", envelope.sender, e),
                }
            }
            PeerMessage::Stream(update) => {
                if self.scenes.is(Scene::TeamSelection) {
                    self.selection.apply_stream(*update, &self.authority);
                }
            }
            PeerMessage::Instantiate(record) => self.on_instantiate(record.clone()),
            PeerMessage::Destroy { entity } => {
                if let Some(record) = self.world.remove(*entity) {
                    self.forget_entity(&record);
                }
            }
            PeerMessage::LoadScene { scene } => self.on_load_scene(*scene),
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        notify(&mut self.authority, event);
        notify(self, event);
    }

    fn apply_input(&mut self, input: TickInput) {
        if self.scenes.is(Scene::TeamSelection) {
            for step in input.selections {
                self.selection.local_step(step, &self.authority);
            }
        }

        if let Some((horizontal, vertical)) = input.movement {
            if let Some(entity) = self.registry.entity_of(self.local_actor()) {
                if let Some(player) = self.matches.player_mut(entity) {
                    player.set_direction(horizontal, vertical);
                }
            }
        }

        if input.confirm {
            // Refusals are logged inside
            let _ = self.confirm_team();
        }
    }

    fn run_deferred(&mut self, task: DeferredTask) {
        match task {
            DeferredTask::RequestNewRound { ball, team } => {
                if let Some(handler) = self.ball.as_mut().filter(|h| h.ball() == ball) {
                    handler.mark_fired();
                }
                if let Err(e) = self.request_new_round(team) {
                    warn!("NewRound({:?}) failed: {}", team, e);
                }
            }
        }
    }

    fn step_local_player(&mut self, dt: Duration) {
        if !self.scenes.is(Scene::Arena) {
            return;
        }
        let Some(entity) = self.registry.entity_of(self.local_actor()) else {
            return;
        };
        let speed = self.config.player_speed;
        if let Some(player) = self.matches.player_mut(entity) {
            player.step(speed, dt.as_secs_f32());
        }
    }

    /// Write side of the selector state stream
    fn write_stream(&mut self) {
        if !self.in_room || !self.scenes.is(Scene::TeamSelection) {
            return;
        }
        let Some(update) = self
            .selection
            .selector_of(self.local_actor())
            .map(TeamSelector::stream_sample)
        else {
            return;
        };
        self.send_or_warn(Target::Others, PeerMessage::Stream(update));
    }

    fn on_instantiate(&mut self, record: SpawnRecord) {
        if !self.world.insert(record.clone()) {
            debug!("Entity {} already instantiated", record.entity);
            return;
        }
        match record.kind {
            EntityKind::Selector => {
                self.selection
                    .add_selector(TeamSelector::new(record.entity, record.owner));
            }
            EntityKind::Player => {
                let team = Team::from_persisted(self.settings.get_int(&team_key(record.owner)));
                self.matches
                    .track_player(PlayerEntity::from_record(&record, team));
                self.registry.register(record.owner, record.entity);
                debug!("Player {} of actor {} on {:?}", record.entity, record.owner, team);
            }
            EntityKind::Ball => {
                if let Some(previous) = self.ball.replace(BallHandler::new(record.entity)) {
                    previous.on_destroyed(&mut self.scheduler);
                }
                self.matches.on_ball_spawned(record.entity);
            }
        }
    }

    /// Drop per-kind state of an entity already removed from the world
    fn forget_entity(&mut self, record: &SpawnRecord) {
        match record.kind {
            EntityKind::Selector => {
                self.selection.remove_selector(record.entity);
            }
            EntityKind::Player => {
                self.registry.remove_entity(record.entity);
                self.matches.untrack_actor(record.owner);
            }
            EntityKind::Ball => {
                self.matches.on_ball_destroyed(record.entity);
                if self.ball.as_ref().is_some_and(|h| h.ball() == record.entity) {
                    if let Some(handler) = self.ball.take() {
                        if handler.on_destroyed(&mut self.scheduler) {
                            debug!("Pending round request for ball {} cancelled", record.entity);
                        }
                    }
                }
            }
        }
    }

    fn load_local_scene(&mut self, scene: Scene) {
        let transition = self.scenes.load(scene);
        for record in self.world.scene_teardown() {
            self.forget_entity(&record);
        }
        if !transition.is_reload() {
            self.notices.push(SessionNotice::SceneLoaded(scene));
        }
    }

    fn on_load_scene(&mut self, scene: Scene) {
        self.load_local_scene(scene);
        if scene == Scene::Arena {
            if let Err(e) = self.enter_arena() {
                warn!("Arena entry failed: {}", e);
            }
        }
    }

    fn enter_arena(&mut self) -> Result<(), SessionError> {
        let local = self.local_actor();
        let team = Team::from_persisted(self.settings.get_int(&team_key(local)));
        self.matches.set_local_team(team);

        if self.registry.owns_player(local) {
            debug!("Ignoring arena reload for actor {}: player already spawned", local);
        } else {
            let record = SpawnRecord {
                entity: self.world.allocate_id()?,
                owner: local,
                kind: EntityKind::Player,
                position: spawn_point(&self.config.spawn_points, team),
            };
            info!("Spawning player {} for actor {} on {:?}", record.entity, local, team);
            self.send(Target::All, PeerMessage::Instantiate(record))?;
        }

        if self.authority.is_authoritative() {
            let ball = SpawnRecord {
                entity: self.world.allocate_id()?,
                owner: local,
                kind: EntityKind::Ball,
                position: self.config.ball_origin,
            };
            self.send(Target::All, PeerMessage::Instantiate(ball))?;

            let positions = sample_portal_positions(
                &self.config.portal_candidates,
                self.config.portal_count,
                &mut self.rng,
            )?;
            self.send(
                Target::All,
                PeerMessage::Rpc {
                    view: MATCH_VIEW,
                    call: RpcCall::PlacePortals { positions },
                },
            )?;
        }
        Ok(())
    }

    fn end_match(&mut self, result: MatchResult) {
        Metrics::incr(&self.metrics.matches_completed);
        self.notices.push(SessionNotice::MatchEnded(result));
    }
}

impl<S: Substrate, K: SettingsStore> SessionListener for PeerSession<S, K> {
    fn on_peer_joined(&mut self, actor: ActorId) {
        info!("Actor {} sees actor {} join", self.local_actor(), actor);
    }

    fn on_peer_left(&mut self, actor: ActorId) {
        info!("Actor {} sees actor {} leave", self.local_actor(), actor);

        self.registry.remove_actor(actor);
        for entity in self.world.owned_by(actor) {
            if let Some(record) = self.world.remove(entity) {
                self.forget_entity(&record);
            }
        }

        match self.scenes.current() {
            Scene::TeamSelection => self.leave_room(),
            Scene::Arena => {
                if let Some(result) = self.matches.on_peer_left(actor) {
                    Metrics::incr(&self.metrics.forfeits);
                    self.end_match(result);
                }
            }
            Scene::Launcher => {}
        }
    }

    fn on_left_room(&mut self) {
        let local = self.local_actor();
        info!("Actor {} left the room", local);

        self.in_room = false;
        if let Some(handler) = self.ball.take() {
            handler.on_destroyed(&mut self.scheduler);
        }
        self.scheduler.clear();
        self.world = World::new(local);
        self.registry.clear();
        self.selection = TeamSelection::new();
        self.matches = MatchCoordinator::new(self.config.max_score);
        self.load_local_scene(Scene::Launcher);
        self.notices.push(SessionNotice::LeftRoom);
    }
}

fn rpc_view(envelope: &Envelope) -> Option<(EntityId, &RpcCall)> {
    match &envelope.message {
        PeerMessage::Rpc { view, call } => Some((*view, call)),
        _ => None,
    }
}

fn on_reset_position<S: Substrate, K: SettingsStore>(
    session: &mut PeerSession<S, K>,
    envelope: &Envelope,
) {
    let Some((view, _)) = rpc_view(envelope) else {
        return;
    };
    if !session.matches.apply_reset_position(view) {
        debug!("ResetPosition for unknown player {}", view);
    }
}

fn on_add_score<S: Substrate, K: SettingsStore>(
    session: &mut PeerSession<S, K>,
    envelope: &Envelope,
) {
    let Some((_, RpcCall::AddScore { team })) = rpc_view(envelope) else {
        return;
    };
    match session.matches.apply_add_score(*team) {
        ScoreOutcome::Scored { .. } => {
            Metrics::incr(&session.metrics.goals);
            let scores = session.matches.scores().scores();
            session.notices.push(SessionNotice::ScoreChanged(scores));
        }
        ScoreOutcome::MatchWon { result, ball } => {
            Metrics::incr(&session.metrics.goals);
            session
                .notices
                .push(SessionNotice::ScoreChanged(result.scores));
            if session.authority.is_authoritative() {
                if let Some(entity) = ball {
                    session.send_or_warn(Target::All, PeerMessage::Destroy { entity });
                }
            }
            session.end_match(result);
        }
        ScoreOutcome::Ignored => debug!("AddScore({:?}) after match end ignored", team),
    }
}

fn on_disable_choose<S: Substrate, K: SettingsStore>(
    session: &mut PeerSession<S, K>,
    envelope: &Envelope,
) {
    let Some((view, _)) = rpc_view(envelope) else {
        return;
    };
    let owner = session.selection.selector(view).map(|s| s.owner);
    match session.selection.disable_choose(view, &mut session.settings) {
        Ok(Some(team)) => {
            if let Some(actor) = owner {
                session.notices.push(SessionNotice::TeamLocked { actor, team });
            }
        }
        Ok(None) => debug!("DisableChoose for unknown selector {}", view),
        Err(e) => warn!("Failed to persist team for selector {}: {}", view, e),
    }
}

fn on_place_portals<S: Substrate, K: SettingsStore>(
    session: &mut PeerSession<S, K>,
    envelope: &Envelope,
) {
    if let Some((_, RpcCall::PlacePortals { positions })) = rpc_view(envelope) {
        session.matches.apply_place_portals(positions.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::entity_id;
    use crate::game::input::PlayerIntent;
    use crate::game::match_result::MatchEndReason;
    use crate::game::match_state::MatchPhase;
    use crate::net::loopback::{LoopbackEndpoint, LoopbackHub};
    use crate::settings::MemorySettings;

    type TestPeer = PeerSession<LoopbackEndpoint, MemorySettings>;

    const DT: Duration = Duration::from_millis(33);

    fn peer(hub: &LoopbackHub, seed: u64) -> TestPeer {
        peer_with(hub, seed, GameConfig::default())
    }

    fn peer_with(hub: &LoopbackHub, seed: u64, config: GameConfig) -> TestPeer {
        let endpoint = hub.join().unwrap();
        let mut peer = PeerSession::new(
            endpoint,
            MemorySettings::new(),
            config,
            Arc::new(Metrics::new()),
        )
        .with_seed(seed);
        peer.join().unwrap();
        peer
    }

    fn pump(a: &mut TestPeer, b: &mut TestPeer, ticks: usize) -> (Vec<SessionNotice>, Vec<SessionNotice>) {
        let mut seen = (Vec::new(), Vec::new());
        for _ in 0..ticks {
            seen.0.extend(a.tick(DT));
            seen.1.extend(b.tick(DT));
        }
        seen
    }

    fn submit(peer: &TestPeer, intents: &[PlayerIntent]) {
        let sender = peer.input_sender();
        for intent in intents {
            sender.try_send(*intent).unwrap();
        }
    }

    /// Host picks team 0, guest picks team 1
    fn selected() -> (LoopbackHub, TestPeer, TestPeer) {
        let hub = LoopbackHub::new();
        let mut host = peer(&hub, 1);
        let mut guest = peer(&hub, 2);
        submit(&host, &[PlayerIntent::SelectLeft, PlayerIntent::SelectLeft]);
        submit(&guest, &[PlayerIntent::SelectLeft]);
        pump(&mut host, &mut guest, 3);
        (hub, host, guest)
    }

    fn in_arena() -> (LoopbackHub, TestPeer, TestPeer) {
        let (hub, mut host, mut guest) = selected();
        host.confirm_team().unwrap();
        pump(&mut host, &mut guest, 4);
        (hub, host, guest)
    }

    fn score_goal(host: &mut TestPeer, guest: &mut TestPeer, team: Team) {
        let delay = host.config().goal_delay;
        assert!(host.on_ball_trigger(team).is_some());
        host.tick(delay);
        guest.tick(delay);
        pump(host, guest, 2);
    }

    #[test]
    fn test_join_spawns_selectors_everywhere() {
        let hub = LoopbackHub::new();
        let mut host = peer(&hub, 1);
        let mut guest = peer(&hub, 2);
        pump(&mut host, &mut guest, 2);

        for session in [&host, &guest] {
            assert_eq!(session.scene(), Scene::TeamSelection);
            assert_eq!(
                session.selection().selector_ids(),
                vec![entity_id(1, 1), entity_id(2, 1)]
            );
        }
        assert!(host.authority().is_authoritative());
        assert!(!guest.authority().is_authoritative());
    }

    #[test]
    fn test_distinct_selection_enables_ready() {
        let (_hub, host, guest) = selected();
        assert_eq!(host.selection().slots(), [0, 1]);
        assert_eq!(guest.selection().slots(), [0, 1]);
        assert!(host.selection().is_ready());
        // Only the host derives ready
        assert!(!guest.selection().is_ready());
    }

    #[test]
    fn test_confirm_locks_and_loads_arena() {
        let (hub, mut host, mut guest) = selected();
        host.confirm_team().unwrap();
        let (host_notices, guest_notices) = pump(&mut host, &mut guest, 4);

        for (session, notices) in [(&host, &host_notices), (&guest, &guest_notices)] {
            assert_eq!(session.scene(), Scene::Arena);
            assert_eq!(session.settings().get_int("player1Team"), 0);
            assert_eq!(session.settings().get_int("player2Team"), 1);
            assert!(notices.contains(&SessionNotice::SceneLoaded(Scene::Arena)));
            assert!(notices.contains(&SessionNotice::TeamLocked {
                actor: 2,
                team: Team::Right
            }));
            assert!(session.selection().selector_ids().is_empty());
            assert_eq!(
                session.world().of_kind(EntityKind::Player),
                vec![entity_id(1, 2), entity_id(2, 2)]
            );
            assert_eq!(session.match_state().ball(), Some(entity_id(1, 3)));
            assert_eq!(session.match_state().phase(), MatchPhase::InRound);
            assert_eq!(session.match_state().portals().len(), 2);
        }
        assert!(host_notices.contains(&SessionNotice::ReadyChanged(false)));
        assert!(!hub.is_open());
        assert!(matches!(hub.join(), Err(SubstrateError::RoomClosed)));

        let spawns = host.config().spawn_points;
        assert_eq!(host.local_player().unwrap().spawn_point, spawns[0]);
        assert_eq!(guest.local_player().unwrap().spawn_point, spawns[1]);
        assert_eq!(guest.match_state().local_team(), Some(Team::Right));
    }

    #[test]
    fn test_stream_in_flight_at_confirm_keeps_ready_clear() {
        let (_hub, mut host, mut guest) = selected();
        submit(&guest, &[PlayerIntent::SelectRight]);
        guest.tick(DT);
        submit(&guest, &[PlayerIntent::SelectLeft]);
        guest.tick(DT);

        host.confirm_team().unwrap();
        let (host_notices, _) = pump(&mut host, &mut guest, 4);

        assert_eq!(host.scene(), Scene::Arena);
        assert!(!host.selection().is_ready());
        assert!(!host_notices.contains(&SessionNotice::ReadyChanged(true)));
    }

    #[test]
    fn test_same_team_stays_not_ready() {
        let hub = LoopbackHub::new();
        let mut host = peer(&hub, 1);
        let mut guest = peer(&hub, 2);
        submit(&host, &[PlayerIntent::SelectLeft, PlayerIntent::SelectLeft]);
        submit(&guest, &[PlayerIntent::SelectLeft, PlayerIntent::SelectLeft]);
        pump(&mut host, &mut guest, 3);

        assert_eq!(host.selection().slots(), [0, 0]);
        assert!(!host.selection().is_ready());
        assert!(matches!(
            host.confirm_team(),
            Err(SessionError::Confirm(ConfirmError::NotReady))
        ));
        assert_eq!(host.scene(), Scene::TeamSelection);
    }

    #[test]
    fn test_guest_cannot_confirm() {
        let (_hub, mut host, mut guest) = selected();
        assert!(matches!(
            guest.confirm_team(),
            Err(SessionError::Confirm(ConfirmError::NotAuthoritative))
        ));
        pump(&mut host, &mut guest, 2);
        assert_eq!(host.scene(), Scene::TeamSelection);
        assert_eq!(Metrics::get(&guest.metrics().authority_suppressed), 1);
    }

    #[test]
    fn test_goal_starts_new_round() {
        let (_hub, mut host, mut guest) = in_arena();
        let first_ball = host.match_state().ball().unwrap();
        let spawn = host.local_player().unwrap().spawn_point;

        submit(&host, &[PlayerIntent::Move { horizontal: 1.0, vertical: 0.0 }]);
        pump(&mut host, &mut guest, 3);
        submit(&host, &[PlayerIntent::Move { horizontal: 0.0, vertical: 0.0 }]);
        pump(&mut host, &mut guest, 1);
        assert_ne!(host.local_player().unwrap().position, spawn);

        assert!(host.on_ball_trigger(Team::Right).is_some());
        assert!(host.on_ball_trigger(Team::Right).is_none());
        guest.on_ball_trigger(Team::Right);
        assert_eq!(host.match_state().phase(), MatchPhase::RoundEnding);

        let half = host.config().goal_delay / 2;
        host.tick(half);
        guest.tick(half);
        assert_eq!(host.match_state().scores().scores(), [0, 0]);

        host.tick(half);
        let mut guest_notices = guest.tick(half);
        let (host_notices, later) = pump(&mut host, &mut guest, 2);
        guest_notices.extend(later);

        for session in [&host, &guest] {
            assert_eq!(session.match_state().scores().scores(), [0, 1]);
            let ball = session.match_state().ball().unwrap();
            assert_ne!(ball, first_ball);
            assert!(!session.world().contains(first_ball));
            assert_eq!(session.world().of_kind(EntityKind::Ball), vec![ball]);
            assert_eq!(session.match_state().phase(), MatchPhase::InRound);
            let portals = session.match_state().portals();
            assert_ne!(portals[0], portals[1]);
        }
        assert_eq!(host.match_state().portals(), guest.match_state().portals());
        assert_eq!(host.local_player().unwrap().position, spawn);
        assert!(host_notices.contains(&SessionNotice::ScoreChanged([0, 1])));
        assert!(guest_notices.contains(&SessionNotice::ScoreChanged([0, 1])));
        assert_eq!(Metrics::get(&host.metrics().rounds_started), 1);
        assert!(host.ball_handler().unwrap().trigger_armed());
    }

    #[test]
    fn test_score_limit_ends_match() {
        let (_hub, mut host, mut guest) = in_arena();
        for _ in 0..3 {
            score_goal(&mut host, &mut guest, Team::Left);
        }

        for session in [&host, &guest] {
            let state = session.match_state();
            assert!(state.is_complete());
            assert_eq!(state.scores().scores(), [3, 0]);
            assert_eq!(state.winner(), Some(Team::Left));
            assert_eq!(state.result().unwrap().reason, MatchEndReason::ScoreLimit);
            assert_eq!(state.ball(), None);
            assert!(session.world().of_kind(EntityKind::Ball).is_empty());
            assert_eq!(Metrics::get(&session.metrics().matches_completed), 1);
        }

        assert!(host.on_ball_trigger(Team::Left).is_none());
        assert_eq!(
            host.request_new_round(Team::Left).unwrap(),
            RoundRequest::MatchOver
        );
        pump(&mut host, &mut guest, 2);
        assert_eq!(guest.match_state().scores().scores(), [3, 0]);
    }

    #[test]
    fn test_long_match_keeps_entity_ids_apart() {
        let config = GameConfig {
            max_score: 5000,
            ..GameConfig::default()
        };
        let hub = LoopbackHub::new();
        let mut host = peer_with(&hub, 1, config.clone());
        let mut guest = peer_with(&hub, 2, config);
        submit(&host, &[PlayerIntent::SelectLeft, PlayerIntent::SelectLeft]);
        submit(&guest, &[PlayerIntent::SelectLeft]);
        pump(&mut host, &mut guest, 3);
        host.confirm_team().unwrap();
        pump(&mut host, &mut guest, 4);
        let players = host.world().of_kind(EntityKind::Player);

        for _ in 0..1100 {
            score_goal(&mut host, &mut guest, Team::Right);
        }

        for session in [&host, &guest] {
            assert_eq!(session.match_state().scores().scores(), [0, 1100]);
            assert_eq!(session.world().of_kind(EntityKind::Player), players);
            assert_eq!(session.world().of_kind(EntityKind::Ball).len(), 1);
            assert!(session.match_state().ball().is_some());
        }
        assert_eq!(guest.registry().entity_of(2), Some(players[1]));
    }

    #[test]
    fn test_every_invocation_has_a_handler() {
        let hub = LoopbackHub::new();
        let host = peer(&hub, 1);
        assert!(host.router.is_complete());
        for kind in RpcKind::ALL.iter() {
            assert!(host.router.lookup(*kind).is_some());
        }
    }

    #[test]
    fn test_undecodable_frame_is_counted() {
        let (hub, mut host, mut guest) = selected();
        hub.inject_frame(2, vec![0xff, 0xff, 0xff]);
        pump(&mut host, &mut guest, 1);

        assert_eq!(Metrics::get(&guest.metrics().decode_failures), 1);
        assert_eq!(Metrics::get(&host.metrics().decode_failures), 0);
        assert_eq!(guest.scene(), Scene::TeamSelection);
    }

    #[test]
    fn test_guest_round_request_changes_nothing() {
        let (_hub, mut host, mut guest) = in_arena();
        let ball = host.match_state().ball();

        assert_eq!(
            guest.request_new_round(Team::Left).unwrap(),
            RoundRequest::Suppressed
        );
        pump(&mut host, &mut guest, 3);

        for session in [&host, &guest] {
            assert_eq!(session.match_state().scores().scores(), [0, 0]);
            assert_eq!(session.match_state().ball(), ball);
        }
        assert_eq!(Metrics::get(&guest.metrics().authority_suppressed), 1);
    }

    #[test]
    fn test_only_host_bounces_ball() {
        let (_hub, host, guest) = in_arena();
        let wall = Contact {
            kind: ContactKind::Wall,
            normal: Vec3::new(1.0, 0.0, 0.0),
        };
        let expected = Vec3::new(host.config().wall_bounce, 0.0, 0.0);
        assert_eq!(host.on_ball_collision(wall), Some(expected));
        assert_eq!(guest.on_ball_collision(wall), None);
    }

    #[test]
    fn test_guest_leaving_arena_forfeits_to_host() {
        let (_hub, mut host, mut guest) = in_arena();
        guest.leave_room();
        let (host_notices, guest_notices) = pump(&mut host, &mut guest, 2);

        let result = host.match_state().result().unwrap();
        assert_eq!(result.winner, Team::Left);
        assert_eq!(result.reason, MatchEndReason::Forfeit);
        assert!(host_notices
            .iter()
            .any(|n| matches!(n, SessionNotice::MatchEnded(_))));
        assert_eq!(host.registry().entity_of(2), None);
        assert_eq!(host.match_state().players().len(), 1);
        assert_eq!(Metrics::get(&host.metrics().forfeits), 1);

        assert_eq!(guest.scene(), Scene::Launcher);
        assert!(guest_notices.contains(&SessionNotice::LeftRoom));
    }

    #[test]
    fn test_host_leaving_arena_leaves_no_authority() {
        let (_hub, mut host, mut guest) = in_arena();
        host.leave_room();
        pump(&mut host, &mut guest, 2);

        assert!(!guest.authority().is_authoritative());
        assert_eq!(guest.authority().host(), None);
        assert_eq!(guest.match_state().winner(), Some(Team::Right));
        assert_eq!(guest.match_state().ball(), None);
        assert_eq!(
            guest.request_new_round(Team::Right).unwrap(),
            RoundRequest::Suppressed
        );
    }

    #[test]
    fn test_peer_leaving_team_selection_returns_to_launcher() {
        let hub = LoopbackHub::new();
        let mut host = peer(&hub, 1);
        let mut guest = peer(&hub, 2);
        pump(&mut host, &mut guest, 2);

        guest.leave_room();
        pump(&mut host, &mut guest, 2);

        assert_eq!(host.scene(), Scene::Launcher);
        assert_eq!(guest.scene(), Scene::Launcher);
        assert!(!host.is_in_room());
        assert_eq!(hub.member_count(), 0);
    }

    #[test]
    fn test_arena_reload_keeps_players() {
        let (_hub, mut host, mut guest) = in_arena();
        let players = host.world().of_kind(EntityKind::Player);
        let first_ball = host.match_state().ball();

        host.send(Target::All, PeerMessage::LoadScene { scene: Scene::Arena })
            .unwrap();
        pump(&mut host, &mut guest, 3);

        for session in [&host, &guest] {
            assert_eq!(session.world().of_kind(EntityKind::Player), players);
            assert_eq!(session.registry().len(), 2);
            assert!(session.match_state().ball().is_some());
            assert_ne!(session.match_state().ball(), first_ball);
        }
    }

    #[test]
    fn test_ball_destroyed_cancels_pending_request() {
        let (_hub, mut host, mut guest) = in_arena();
        assert!(guest.on_ball_trigger(Team::Left).is_some());

        // Host starts a round first; guest's ball goes away before its
        // deferred request is due
        host.on_ball_trigger(Team::Right);
        let delay = host.config().goal_delay;
        host.tick(delay);
        guest.tick(DT);
        guest.tick(delay);
        pump(&mut host, &mut guest, 2);

        assert_eq!(Metrics::get(&guest.metrics().authority_suppressed), 0);
        assert_eq!(guest.match_state().scores().scores(), [0, 1]);
    }
}
