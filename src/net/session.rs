//! Session membership notifications
//!
//! Components that care about room membership implement `SessionListener`
//! and are handed each `SessionEvent` by the peer session.

use serde::{Deserialize, Serialize};

use crate::game::entities::ActorId;

/// Membership events produced by the messaging substrate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Another peer entered the room
    PeerJoined(ActorId),
    /// Another peer left the room
    PeerLeft(ActorId),
    /// The local peer left the room
    SelfLeftRoom,
}

/// Narrow capability set for room lifecycle notifications
pub trait SessionListener {
    fn on_peer_joined(&mut self, _actor: ActorId) {}
    fn on_peer_left(&mut self, _actor: ActorId) {}
    fn on_left_room(&mut self) {}
}

/// Route one event to the matching listener callback
pub fn notify<L: SessionListener + ?Sized>(listener: &mut L, event: SessionEvent) {
    match event {
        SessionEvent::PeerJoined(actor) => listener.on_peer_joined(actor),
        SessionEvent::PeerLeft(actor) => listener.on_peer_left(actor),
        SessionEvent::SelfLeftRoom => listener.on_left_room(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        joined: Vec<ActorId>,
        left: Vec<ActorId>,
        self_left: bool,
    }

    impl SessionListener for Recorder {
        fn on_peer_joined(&mut self, actor: ActorId) {
            self.joined.push(actor);
        }
        fn on_peer_left(&mut self, actor: ActorId) {
            self.left.push(actor);
        }
        fn on_left_room(&mut self) {
            self.self_left = true;
        }
    }

    struct Silent;
    impl SessionListener for Silent {}

    #[test]
    fn test_notify_routes_events() {
        let mut recorder = Recorder::default();
        notify(&mut recorder, SessionEvent::PeerJoined(2));
        notify(&mut recorder, SessionEvent::PeerLeft(2));
        notify(&mut recorder, SessionEvent::SelfLeftRoom);

        assert_eq!(recorder.joined, vec![2]);
        assert_eq!(recorder.left, vec![2]);
        assert!(recorder.self_left);
    }

    #[test]
    fn test_default_callbacks_are_noops() {
        let mut silent = Silent;
        notify(&mut silent, SessionEvent::PeerLeft(3));
    }
}
