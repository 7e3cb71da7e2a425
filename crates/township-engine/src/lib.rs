//! Out-of-band side of the Township engine.
//!
//! The tick engine in `township-core` never waits on anything slow. This
//! crate holds everything that runs beside it: the executor that turns
//! dispatched agent operations into completion inputs, the decision logic
//! it runs, the content collaborator that names and illustrates generated
//! sprites, and the roster used to seed the world with agents. The
//! `township-engine` binary wires these to the step loop.
//!
//! # Modules
//!
//! - [`content`] -- Prompt source trait and image URL construction
//! - [`decision`] -- Wander, activity, invite, generation and inventory decisions
//! - [`error`] -- Engine error type
//! - [`executor`] -- Task-per-operation executor with bounded concurrency
//! - [`roster`] -- Names, character sprites and personalities for new agents

pub mod content;
pub mod decision;
pub mod error;
pub mod executor;
pub mod roster;

pub use content::{CannedContent, ContentSource};
pub use decision::{Area, Decision, DecisionContext, decide, generate_for_area};
pub use error::EngineError;
pub use executor::{Executor, ExecutorSettings, Submission};
pub use roster::{Roster, seed_agents};
