//! Messaging substrate seam
//!
//! The substrate provides reliable, ordered delivery of tagged messages
//! between the peers of one room, plus membership events. Transports and
//! session establishment live behind this trait.

use crate::game::entities::ActorId;
use crate::net::protocol::{EncodeError, Envelope, PeerMessage, Target};
use crate::net::session::SessionEvent;

/// Something the substrate delivered to this peer
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(Envelope),
    Session(SessionEvent),
    /// A frame arrived that does not decode; it has been dropped
    Undecodable,
}

#[derive(Debug, thiserror::Error)]
pub enum SubstrateError {
    #[error("Room is closed to new peers")]
    RoomClosed,
    #[error("Not in a room")]
    NotInRoom,
    #[error("Unknown actor {0}")]
    UnknownActor(ActorId),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

pub trait Substrate {
    /// Actor id the substrate assigned to this peer
    fn local_actor(&self) -> ActorId;

    /// Actor designated as host when the room was created, while connected
    fn host_actor(&self) -> Option<ActorId>;

    /// Actors currently in the room
    fn members(&self) -> Vec<ActorId>;

    /// Queue a message for delivery; returns the encoded size in bytes
    fn send(&mut self, target: Target, message: PeerMessage) -> Result<usize, SubstrateError>;

    /// Drain everything delivered since the last poll, in arrival order
    fn poll(&mut self) -> Vec<Inbound>;

    /// Open or close the room to new joins
    fn set_room_open(&mut self, open: bool) -> Result<(), SubstrateError>;

    /// Leave the room; a `SelfLeftRoom` event follows on the next poll
    fn leave_room(&mut self);
}
