//! Error types for command processing, the budget gate and the step loop.
//!
//! A [`CommandError`] rejects one input and leaves the world untouched.
//! None of these errors ever stop the tick loop; the engine logs them and
//! reports them back to whoever submitted the input.

use township_world::WorldError;

/// Which business rule a rejected command violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precondition {
    /// A tile or destination lies outside the map.
    OutOfBounds,
    /// The acting player is too far from the target tile.
    TooFar,
    /// The sender cannot afford the transfer.
    InsufficientResource,
    /// A transfer amount was zero or negative.
    InvalidAmount,
    /// The human is already playing.
    DuplicateHuman,
    /// The human player cap has been reached.
    TooManyHumans,
    /// No free starting tile could be found.
    NoFreePosition,
    /// The character is neither a known name nor an asset path.
    InvalidCharacter,
    /// An inventory index is out of range.
    InvalidItem,
    /// Two players are neither close nor talking to each other.
    NotNearby,
    /// The player is busy in a conversation.
    InConversation,
    /// The agent already has an operation in flight.
    OperationInFlight,
}

impl core::fmt::Display for Precondition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::OutOfBounds => "out of bounds",
            Self::TooFar => "too far",
            Self::InsufficientResource => "insufficient resource",
            Self::InvalidAmount => "invalid amount",
            Self::DuplicateHuman => "duplicate human",
            Self::TooManyHumans => "too many humans",
            Self::NoFreePosition => "no free position",
            Self::InvalidCharacter => "invalid character",
            Self::InvalidItem => "invalid item",
            Self::NotNearby => "not nearby",
            Self::InConversation => "in conversation",
            Self::OperationInFlight => "operation in flight",
        };
        f.write_str(name)
    }
}

/// Errors returned when an input is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The arguments do not match the command's schema.
    #[error("invalid arguments for {command}: {message}")]
    InvalidArgument {
        /// The command being parsed.
        command: String,
        /// What was wrong with the arguments.
        message: String,
    },

    /// No command with this name exists.
    #[error("unknown command: {name}")]
    UnknownCommand {
        /// The submitted command name.
        name: String,
    },

    /// A referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity ("player", "agent", ...).
        entity: &'static str,
        /// The missing identifier.
        id: String,
    },

    /// A business rule rejected the command.
    #[error("precondition failed ({kind}): {message}")]
    PreconditionFailed {
        /// The violated rule.
        kind: Precondition,
        /// Human-readable details.
        message: String,
    },
}

impl CommandError {
    /// Build a [`CommandError::PreconditionFailed`].
    pub fn precondition(kind: Precondition, message: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            kind,
            message: message.into(),
        }
    }

    /// Build a [`CommandError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// The violated rule, for precondition failures.
    pub const fn precondition_kind(&self) -> Option<Precondition> {
        match self {
            Self::PreconditionFailed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<WorldError> for CommandError {
    fn from(err: WorldError) -> Self {
        match err {
            WorldError::OutOfBounds { .. } => Self::precondition(Precondition::OutOfBounds, err.to_string()),
            WorldError::LayerOutOfRange { .. } => Self::InvalidArgument {
                command: "placeObject".to_owned(),
                message: err.to_string(),
            },
        }
    }
}

/// Errors from the generation budget gate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BudgetError {
    /// Every compare-and-set attempt lost to a concurrent writer.
    #[error("budget record still contended after {attempts} attempts")]
    Contended {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// The storage collaborator failed.
    #[error("budget store error: {message}")]
    Store {
        /// Description of the failure.
        message: String,
    },
}

/// Errors from [`Game::run_step`](crate::engine::Game::run_step).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    /// The step was asked to run at a time before the previous step ended.
    #[error("step time {now} precedes the previous step end {previous}")]
    TimeWentBackwards {
        /// Requested step time.
        now: u64,
        /// End of the previous step.
        previous: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use township_types::Tile;

    #[test]
    fn world_errors_become_preconditions() {
        let err = CommandError::from(WorldError::OutOfBounds {
            tile: Tile::new(12, 0),
            width: 10,
            height: 10,
        });
        assert_eq!(err.precondition_kind(), Some(Precondition::OutOfBounds));
        assert!(err.to_string().contains("out of bounds"));
    }

    #[test]
    fn not_found_names_the_entity() {
        let err = CommandError::not_found("player", "p-1");
        assert_eq!(err.to_string(), "player p-1 not found");
        assert_eq!(err.precondition_kind(), None);
    }
}
