//! Autonomous agent records and in-flight operation markers.

use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, OperationId, PlayerId};

/// The brain attached to an autonomous player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    /// Agent identity.
    pub id: AgentId,
    /// The player this agent drives.
    pub player_id: PlayerId,
    /// Who the agent believes it is.
    pub identity: String,
    /// What the agent is trying to do lately.
    pub plan: String,
    /// The single operation currently computed out of band, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_progress_operation: Option<InProgressOperation>,
    /// When the agent last left a conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_conversation: Option<u64>,
    /// When the agent last tried to invite somebody.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_invite_attempt: Option<u64>,
}

impl Agent {
    /// Whether an operation for this agent is in flight.
    pub const fn is_busy(&self) -> bool {
        self.in_progress_operation.is_some()
    }
}

/// Marker recorded when an operation is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InProgressOperation {
    /// What was dispatched.
    pub kind: OperationKind,
    /// Correlation id the completion must echo.
    pub operation_id: OperationId,
    /// Dispatch time in milliseconds.
    pub started: u64,
}

/// The kinds of out-of-band operations an agent can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    /// Decide what to do next: wander, start an activity, invite, or generate.
    DoSomething,
    /// Trade away or drop one carried item.
    HandleInventory,
}

impl core::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::DoSomething => f.write_str("agentDoSomething"),
            Self::HandleInventory => f.write_str("agentHandleInventory"),
        }
    }
}
