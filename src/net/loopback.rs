//! In-process substrate
//!
//! Every peer of a `LoopbackHub` gets an unbounded inbox. Messages are
//! bincode-encoded on send and decoded on poll, so the wire contract is the
//! same one a real transport would carry. Live instantiations and the current
//! scene are cached and replayed to late joiners.

use std::collections::BTreeMap;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::constants::net::FIRST_ACTOR;
use crate::game::entities::{ActorId, EntityId};
use crate::net::protocol::{decode, encode, Envelope, PeerMessage, Target};
use crate::net::session::SessionEvent;
use crate::net::substrate::{Inbound, Substrate, SubstrateError};

#[derive(Debug)]
enum Frame {
    Wire(Vec<u8>),
    Session(SessionEvent),
}

#[derive(Debug)]
struct HubState {
    room_id: Uuid,
    next_actor: ActorId,
    host: Option<ActorId>,
    open: bool,
    peers: BTreeMap<ActorId, Sender<Frame>>,
    scene: Option<Envelope>,
    instantiated: Vec<(EntityId, Envelope)>,
}

impl HubState {
    fn deliver(&self, sender: ActorId, target: Target, bytes: &[u8]) {
        for (actor, inbox) in &self.peers {
            let wanted = match target {
                Target::All => true,
                Target::Others => *actor != sender,
                Target::Actor(to) => *actor == to,
            };
            if wanted && inbox.send(Frame::Wire(bytes.to_vec())).is_err() {
                debug!("Inbox of actor {} is gone", actor);
            }
        }
    }

    fn remember(&mut self, envelope: &Envelope) {
        match &envelope.message {
            PeerMessage::Instantiate(record) => {
                self.instantiated.push((record.entity, envelope.clone()));
            }
            PeerMessage::Destroy { entity } => {
                self.instantiated.retain(|(id, _)| id != entity);
            }
            PeerMessage::LoadScene { .. } => {
                self.instantiated.retain(|(_, env)| match &env.message {
                    PeerMessage::Instantiate(record) => record.kind.survives_scene_load(),
                    _ => false,
                });
                self.scene = Some(envelope.clone());
            }
            PeerMessage::Rpc { .. } | PeerMessage::Stream(_) => {}
        }
    }

    fn forget_actor(&mut self, actor: ActorId) {
        self.instantiated.retain(|(_, env)| env.sender != actor);
    }
}

/// Shared room all loopback endpoints talk through
#[derive(Debug, Clone)]
pub struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState {
                room_id: Uuid::new_v4(),
                next_actor: FIRST_ACTOR,
                host: None,
                open: true,
                peers: BTreeMap::new(),
                scene: None,
                instantiated: Vec::new(),
            })),
        }
    }

    pub fn room_id(&self) -> Uuid {
        self.state.lock().room_id
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn member_count(&self) -> usize {
        self.state.lock().peers.len()
    }

    /// Join the room; the first peer to join becomes host
    pub fn join(&self) -> Result<LoopbackEndpoint, SubstrateError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(SubstrateError::RoomClosed);
        }

        let actor = state.next_actor;
        state.next_actor += 1;
        if state.peers.is_empty() && state.host.is_none() {
            state.host = Some(actor);
        }

        let (tx, rx) = unbounded();

        // Replay cached room state to the newcomer before anything else
        let replay = state
            .scene
            .iter()
            .chain(state.instantiated.iter().map(|(_, env)| env));
        for envelope in replay {
            let bytes = encode(envelope)?;
            let _ = tx.send(Frame::Wire(bytes));
        }

        for inbox in state.peers.values() {
            let _ = inbox.send(Frame::Session(SessionEvent::PeerJoined(actor)));
        }
        state.peers.insert(actor, tx);

        info!("Actor {} joined room {}", actor, state.room_id);

        Ok(LoopbackEndpoint {
            actor,
            hub: self.clone(),
            inbox: rx,
            joined: true,
        })
    }
}

impl Default for LoopbackHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One peer's connection to a `LoopbackHub`
#[derive(Debug)]
pub struct LoopbackEndpoint {
    actor: ActorId,
    hub: LoopbackHub,
    inbox: Receiver<Frame>,
    joined: bool,
}

impl Substrate for LoopbackEndpoint {
    fn local_actor(&self) -> ActorId {
        self.actor
    }

    fn host_actor(&self) -> Option<ActorId> {
        self.hub.state.lock().host
    }

    fn members(&self) -> Vec<ActorId> {
        self.hub.state.lock().peers.keys().copied().collect()
    }

    fn send(&mut self, target: Target, message: PeerMessage) -> Result<usize, SubstrateError> {
        if !self.joined {
            return Err(SubstrateError::NotInRoom);
        }

        let mut state = self.hub.state.lock();
        if let Target::Actor(to) = target {
            if !state.peers.contains_key(&to) {
                return Err(SubstrateError::UnknownActor(to));
            }
        }

        let envelope = Envelope {
            sender: self.actor,
            message,
        };
        let bytes = encode(&envelope)?;
        if !matches!(target, Target::Actor(_)) {
            state.remember(&envelope);
        }
        state.deliver(self.actor, target, &bytes);
        Ok(bytes.len())
    }

    fn poll(&mut self) -> Vec<Inbound> {
        self.inbox
            .try_iter()
            .filter_map(|frame| match frame {
                Frame::Session(event) => Some(Inbound::Session(event)),
                Frame::Wire(bytes) => match decode::<Envelope>(&bytes) {
                    Ok(envelope) => Some(Inbound::Message(envelope)),
                    Err(e) => {
                        warn!("Actor {} dropped undecodable frame: {}", self.actor, e);
                        Some(Inbound::Undecodable)
                    }
                },
            })
            .collect()
    }

    fn set_room_open(&mut self, open: bool) -> Result<(), SubstrateError> {
        if !self.joined {
            return Err(SubstrateError::NotInRoom);
        }
        let mut state = self.hub.state.lock();
        state.open = open;
        info!("Room {} is now {}", state.room_id, if open { "open" } else { "closed" });
        Ok(())
    }

    fn leave_room(&mut self) {
        if !self.joined {
            return;
        }
        self.joined = false;

        let mut state = self.hub.state.lock();
        if let Some(own) = state.peers.remove(&self.actor) {
            let _ = own.send(Frame::Session(SessionEvent::SelfLeftRoom));
        }
        if state.host == Some(self.actor) {
            state.host = None;
        }
        state.forget_actor(self.actor);
        for inbox in state.peers.values() {
            let _ = inbox.send(Frame::Session(SessionEvent::PeerLeft(self.actor)));
        }
        info!("Actor {} left room {}", self.actor, state.room_id);
    }
}

impl Drop for LoopbackEndpoint {
    fn drop(&mut self) {
        self.leave_room();
    }
}

#[cfg(test)]
impl LoopbackHub {
    /// Push raw bytes into `actor`'s inbox as if they came off the wire
    pub(crate) fn inject_frame(&self, actor: ActorId, bytes: Vec<u8>) {
        if let Some(inbox) = self.state.lock().peers.get(&actor) {
            let _ = inbox.send(Frame::Wire(bytes));
        }
    }
}
