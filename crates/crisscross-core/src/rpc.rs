//! Remote calls carried by a transport

use serde::{Deserialize, Serialize};

use crate::{ActorId, Callback, ClockedMessage, CommandEnvelope, Reply, Scope, SessionId};

/// One remote call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rpc {
    /// Broadcast fan-out into a peer's causal channel
    Deliver(ClockedMessage),
    /// Coordinator to player notification
    Callback(Callback),
    /// Player liveness ping
    Heartbeat { session: SessionId, actor: ActorId },
    /// Mutating command
    Command(CommandEnvelope),
    /// Coordinator answer to a command, matched by scope and sequence
    Reply {
        scope: Scope,
        sequence: u64,
        reply: Reply,
    },
    /// Ask for the last accepted sequence in a scope, optionally moving it
    /// forward first
    SequenceQuery {
        actor: ActorId,
        scope: Scope,
        advance_to: Option<u64>,
    },
    /// Coordinator answer to a sequence query
    SequenceReport { scope: Scope, status: SequenceStatus },
}

/// Counter state reported to a resynchronizing client
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceStatus {
    /// Last accepted sequence
    pub sequence: u64,
    /// Session the actor currently plays in
    pub session: Option<SessionId>,
}

impl Rpc {
    /// Method name, for logs
    pub fn method(&self) -> &'static str {
        match self {
            Rpc::Deliver(_) => "receive",
            Rpc::Callback(cb) => cb.name(),
            Rpc::Heartbeat { .. } => "heartbeat",
            Rpc::Command(_) => "command",
            Rpc::Reply { .. } => "reply",
            Rpc::SequenceQuery { .. } => "getSequence",
            Rpc::SequenceReport { .. } => "sequenceReport",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names() {
        assert_eq!(Rpc::Callback(Callback::OnGameStart).method(), "onGameStart");
        assert_eq!(
            Rpc::Heartbeat {
                session: SessionId(1),
                actor: ActorId::new("alice"),
            }
            .method(),
            "heartbeat"
        );
    }
}
