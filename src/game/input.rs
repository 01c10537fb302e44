//! Player intents and the per-tick input buffer
//!
//! Input devices push intents from any thread through an `InputSender`; the
//! peer drains the buffer once per tick and folds it into a `TickInput`.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use smallvec::SmallVec;

/// What the local player wants to do
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerIntent {
    /// Move the team choice one step left
    SelectLeft,
    /// Move the team choice one step right
    SelectRight,
    /// Movement axes in [-1, 1]
    Move { horizontal: f32, vertical: f32 },
    /// Host presses the ready button
    ConfirmTeams,
}

/// Direction of a team selection step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectStep {
    Left,
    Right,
}

/// Everything sampled for one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickInput {
    /// Selection steps in press order
    pub selections: SmallVec<[SelectStep; 4]>,
    /// Latest movement axes, if any arrived this tick
    pub movement: Option<(f32, f32)>,
    pub confirm: bool,
}

impl TickInput {
    pub fn from_intents(intents: impl IntoIterator<Item = PlayerIntent>) -> Self {
        let mut input = Self::default();
        for intent in intents {
            match intent {
                PlayerIntent::SelectLeft => input.selections.push(SelectStep::Left),
                PlayerIntent::SelectRight => input.selections.push(SelectStep::Right),
                PlayerIntent::Move {
                    horizontal,
                    vertical,
                } => {
                    input.movement = Some((horizontal.clamp(-1.0, 1.0), vertical.clamp(-1.0, 1.0)))
                }
                PlayerIntent::ConfirmTeams => input.confirm = true,
            }
        }
        input
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty() && self.movement.is_none() && !self.confirm
    }
}

/// Bounded buffer between input devices and the tick loop
pub struct InputBuffer {
    sender: Sender<PlayerIntent>,
    receiver: Receiver<PlayerIntent>,
    capacity: usize,
}

impl InputBuffer {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Create a new sender handle for an input device
    pub fn sender(&self) -> InputSender {
        InputSender {
            sender: self.sender.clone(),
        }
    }

    /// Try to submit an intent (non-blocking)
    ///
    /// Returns true if successful, false if buffer is full
    #[inline]
    pub fn try_submit(&self, intent: PlayerIntent) -> bool {
        self.sender.try_send(intent).is_ok()
    }

    /// Drain everything pending and fold it into one tick's input
    pub fn sample(&self) -> TickInput {
        TickInput::from_intents(self.receiver.try_iter())
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Clonable sender handle for input devices
#[derive(Clone)]
pub struct InputSender {
    sender: Sender<PlayerIntent>,
}

impl InputSender {
    /// Submit an intent (non-blocking)
    #[inline]
    pub fn try_send(&self, intent: PlayerIntent) -> Result<(), InputBufferError> {
        self.sender.try_send(intent).map_err(|e| match e {
            TrySendError::Full(_) => InputBufferError::Full,
            TrySendError::Disconnected(_) => InputBufferError::Disconnected,
        })
    }
}

/// Input buffer errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InputBufferError {
    #[error("Input buffer is full")]
    Full,
    #[error("Input buffer is disconnected")]
    Disconnected,
}
