//! Ball collision and goal-trigger handling
//!
//! One handler exists per ball instance on every peer. Contact impulses are
//! applied by the authority only; goal triggers disarm the handler and defer
//! the round-advance request.

use std::time::Duration;

use crate::game::entities::{EntityId, Team};
use crate::game::scheduler::{Scheduler, TaskHandle};
use crate::net::authority::Authority;
use crate::util::vec3::Vec3;

/// What the ball touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    Wall,
    Player,
    Other,
}

/// Physics contact reported by the simulation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub kind: ContactKind,
    /// Normal of the first contact point
    pub normal: Vec3,
}

/// Bounce coefficients per contact kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BounceCoefficients {
    pub wall: f32,
    pub player: f32,
}

/// Work deferred through the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredTask {
    /// Ask the match coordinator to advance the round
    RequestNewRound { ball: EntityId, team: Team },
}

#[derive(Debug)]
pub struct BallHandler {
    ball: EntityId,
    trigger_armed: bool,
    pending: Option<TaskHandle>,
}

impl BallHandler {
    pub fn new(ball: EntityId) -> Self {
        Self {
            ball,
            trigger_armed: true,
            pending: None,
        }
    }

    pub fn ball(&self) -> EntityId {
        self.ball
    }

    pub fn trigger_armed(&self) -> bool {
        self.trigger_armed
    }

    /// Impulse to apply for a contact, or `None` when this peer must not
    /// touch the ball's physics.
    pub fn on_collision(
        &self,
        contact: Contact,
        authority: &Authority,
        bounce: BounceCoefficients,
    ) -> Option<Vec3> {
        if !authority.is_authoritative() {
            return None;
        }
        let scale = match contact.kind {
            ContactKind::Wall => bounce.wall,
            ContactKind::Player => bounce.player,
            ContactKind::Other => return None,
        };
        Some(contact.normal * scale)
    }

    /// Ball entered the goal trigger of `goal`. The first entry disarms the
    /// trigger and schedules the round-advance request; later entries are
    /// ignored.
    pub fn on_trigger_enter(
        &mut self,
        goal: Team,
        scheduler: &mut Scheduler<DeferredTask>,
        delay: Duration,
    ) -> Option<TaskHandle> {
        if !self.trigger_armed {
            return None;
        }
        self.trigger_armed = false;

        let handle = scheduler.schedule(
            delay,
            DeferredTask::RequestNewRound {
                ball: self.ball,
                team: goal,
            },
        );
        self.pending = Some(handle);
        Some(handle)
    }

    /// The deferred request ran
    pub fn mark_fired(&mut self) {
        self.pending = None;
    }

    /// Ball destroyed: drop the deferred request if it has not run yet
    pub fn on_destroyed(self, scheduler: &mut Scheduler<DeferredTask>) -> bool {
        match self.pending {
            Some(handle) => scheduler.cancel(handle).is_some(),
            None => false,
        }
    }
}
