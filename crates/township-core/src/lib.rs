//! World aggregate and tick engine for the Township world engine.
//!
//! This crate owns all mutable simulation state. A [`World`] is changed only
//! by named inputs (applied one at a time through [`World::apply`]) and by
//! the tick hooks that [`Game::run_step`] runs for every player and agent.
//! Everything here is synchronous; slow work such as agent decisions is
//! dispatched out of band and comes back as an ordinary input.
//!
//! # Modules
//!
//! - [`config`] -- YAML simulation configuration with environment overrides
//! - [`error`] -- Command, budget and step error types
//! - [`world`] -- The world aggregate and its read accessors
//! - [`conversation`] -- Minimal conversation membership registry
//! - [`player`] -- Join, leave, movement intent and the movement tick hooks
//! - [`interaction`] -- Building, trading and emote commands
//! - [`agent`] -- Agent creation and the idle-agent dispatch trigger
//! - [`operations`] -- Operation dispatch snapshots and completion handling
//! - [`budget`] -- Generation budget gate with compare-and-set storage
//! - [`inputs`] -- Command names, argument schemas and dispatch
//! - [`engine`] -- Input queue, tick order and the step loop

pub mod agent;
pub mod budget;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod inputs;
pub mod interaction;
pub mod operations;
pub mod player;
pub mod world;

pub use agent::chance;
pub use budget::{
    BudgetPolicy, BudgetStore, GateDecision, GateRejection, GenerationBudget, InMemoryBudgetStore,
    Versioned, evaluate, try_acquire,
};
pub use config::{ConfigError, SimulationConfig};
pub use conversation::Conversation;
pub use engine::{Game, InputQueue, InputRecord, StepStats, StepSummary};
pub use error::{BudgetError, CommandError, Precondition, StepError};
pub use inputs::{Input, InputOutcome};
pub use operations::{OperationPayload, ScheduledOperation};
pub use player::stop_player;
pub use world::World;
