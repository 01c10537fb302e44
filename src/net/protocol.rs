use serde::{Deserialize, Serialize};

use crate::game::entities::{ActorId, EntityId, SpawnRecord, Team};
use crate::lobby::scene::Scene;
use crate::util::vec3::Vec3;

/// Delivery target for an outgoing message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// Every peer in the room, including the sender
    All,
    /// Every peer except the sender
    Others,
    /// A single peer
    Actor(ActorId),
}

/// Remote invocations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcCall {
    /// Receiver moves the addressed player entity back to its spawn point
    ResetPosition,
    /// Every peer increments the score of `team`
    AddScore { team: Team },
    /// Receiver locks the addressed selector and persists its team
    DisableChoose,
    /// Every peer moves the goal portals, one position per team
    PlacePortals { positions: Vec<Vec3> },
}

/// Payload-free tag of an `RpcCall`, used as the handler-table key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RpcKind {
    ResetPosition,
    AddScore,
    DisableChoose,
    PlacePortals,
}

impl RpcKind {
    pub const ALL: [RpcKind; 4] = [
        RpcKind::ResetPosition,
        RpcKind::AddScore,
        RpcKind::DisableChoose,
        RpcKind::PlacePortals,
    ];
}

impl RpcCall {
    pub fn kind(&self) -> RpcKind {
        match self {
            RpcCall::ResetPosition => RpcKind::ResetPosition,
            RpcCall::AddScore { .. } => RpcKind::AddScore,
            RpcCall::DisableChoose => RpcKind::DisableChoose,
            RpcCall::PlacePortals { .. } => RpcKind::PlacePortals,
        }
    }
}

/// Periodic per-entity state: the selector's current team index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamUpdate {
    pub entity: EntityId,
    pub team_index: u8,
}

/// Everything peers send each other
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PeerMessage {
    /// Invocation addressed to an entity (or a scene view)
    Rpc { view: EntityId, call: RpcCall },
    /// State stream sample
    Stream(StreamUpdate),
    /// Replicated entity creation
    Instantiate(SpawnRecord),
    /// Replicated entity destruction
    Destroy { entity: EntityId },
    /// Scene change driven by the host
    LoadScene { scene: Scene },
}

/// A delivered message with its sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: ActorId,
    pub message: PeerMessage,
}

/// Encode a message using bincode
/// Uses legacy config for fixed-size integers
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
/// Uses legacy config for fixed-size integers
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);
