//! Handler table for remote invocations
//!
//! Handlers are plain `fn` pointers keyed by `RpcKind`, registered once when
//! the session is built.

use hashbrown::HashMap;

use crate::net::protocol::{Envelope, PeerMessage, RpcKind};

pub type Handler<C> = fn(&mut C, &Envelope);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("No handler registered for {0:?}")]
    Unhandled(RpcKind),
    #[error("Envelope does not carry an invocation")]
    NotAnRpc,
}

pub struct Router<C> {
    handlers: HashMap<RpcKind, Handler<C>>,
}

impl<C> Router<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for `kind`, replacing any previous one
    pub fn register(&mut self, kind: RpcKind, handler: Handler<C>) -> &mut Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn lookup(&self, kind: RpcKind) -> Option<Handler<C>> {
        self.handlers.get(&kind).copied()
    }

    pub fn is_complete(&self) -> bool {
        RpcKind::ALL.iter().all(|k| self.handlers.contains_key(k))
    }

    /// Run the handler for the invocation carried by `envelope`
    pub fn dispatch(&self, ctx: &mut C, envelope: &Envelope) -> Result<RpcKind, DispatchError> {
        let PeerMessage::Rpc { call, .. } = &envelope.message else {
            return Err(DispatchError::NotAnRpc);
        };
        let kind = call.kind();
        let handler = self.lookup(kind).ok_or(DispatchError::Unhandled(kind))?;
        handler(ctx, envelope);
        Ok(kind)
    }
}

impl<C> Default for Router<C> {
    fn default() -> Self {
        Self::new()
    }
}
