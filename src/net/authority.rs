//! Authority coordinator
//!
//! Exactly one peer per room is authoritative for match-wide decisions: the
//! peer the substrate designated as host when the room was created. There is
//! no election; if the host leaves, nobody is authoritative afterwards.

use tracing::warn;

use crate::game::entities::ActorId;
use crate::net::session::SessionListener;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    local: ActorId,
    host: Option<ActorId>,
}

impl Authority {
    pub fn new(local: ActorId, host: Option<ActorId>) -> Self {
        Self { local, host }
    }

    /// Whether this peer may take match-wide decisions
    #[inline]
    pub fn is_authoritative(&self) -> bool {
        self.host == Some(self.local)
    }

    pub fn host(&self) -> Option<ActorId> {
        self.host
    }

    pub fn local(&self) -> ActorId {
        self.local
    }
}

impl SessionListener for Authority {
    fn on_peer_left(&mut self, actor: ActorId) {
        if self.host == Some(actor) {
            warn!("Host {} left; no further authoritative decisions", actor);
            self.host = None;
        }
    }

    fn on_left_room(&mut self) {
        self.host = None;
    }
}
