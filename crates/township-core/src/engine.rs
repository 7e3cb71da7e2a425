//! The tick engine: input queue, step loop and per-tick hook order.
//!
//! A step advances simulated time from the end of the previous step up to
//! the wall-clock time it is given, in fixed-length ticks and never more
//! than the configured maximum per step. Before each tick every queued
//! input received at or before the tick's timestamp is applied, strictly in
//! submission order. Each tick then ends conversations past their time
//! limit, runs the idle check, the pathfinding pass and the position pass
//! for every player, and finally the agent tick for every agent.
//!
//! The step itself never fails because of an input: rejected inputs are
//! logged and reported in the [`StepSummary`].

use std::collections::VecDeque;

use serde::Serialize;
use township_types::{AgentId, PlayerId};
use tracing::{debug, warn};

use crate::error::{CommandError, StepError};
use crate::inputs::{Input, InputOutcome};
use crate::operations::ScheduledOperation;
use crate::world::World;

// ---------------------------------------------------------------------------
// Input queue
// ---------------------------------------------------------------------------

/// An input waiting for its tick.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedInput {
    /// Submission sequence number.
    pub number: u64,
    /// Simulated time the input was received at.
    pub received: u64,
    /// The parsed input.
    pub input: Input,
}

/// FIFO of submitted inputs.
#[derive(Debug, Default)]
pub struct InputQueue {
    next_number: u64,
    pending: VecDeque<QueuedInput>,
}

impl InputQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an input, returning its sequence number.
    pub fn push(&mut self, input: Input, received: u64) -> u64 {
        let number = self.next_number;
        self.next_number = self.next_number.saturating_add(1);
        self.pending.push_back(QueuedInput {
            number,
            received,
            input,
        });
        number
    }

    /// Inputs still waiting.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no input is waiting.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take the oldest input if it was received by `ts`. Later inputs never
    /// overtake an earlier one.
    fn pop_due(&mut self, ts: u64) -> Option<QueuedInput> {
        if self.pending.front()?.received > ts {
            return None;
        }
        self.pending.pop_front()
    }
}

// ---------------------------------------------------------------------------
// Step results
// ---------------------------------------------------------------------------

/// The result of one applied input.
#[derive(Debug, Clone, PartialEq)]
pub struct InputRecord {
    /// Submission sequence number.
    pub number: u64,
    /// Command name.
    pub name: &'static str,
    /// What the handler returned.
    pub result: Result<InputOutcome, CommandError>,
}

/// What happened during one step.
#[derive(Debug, Clone)]
pub struct StepSummary {
    /// Timestamp of the first tick.
    pub started: u64,
    /// Timestamp of the last tick.
    pub ended: u64,
    /// Ticks executed.
    pub ticks: u64,
    /// Applied inputs, in order.
    pub results: Vec<InputRecord>,
    /// Operations dispatched during the step, for the executor.
    pub scheduled: Vec<ScheduledOperation>,
    /// Whether descriptive metadata changed, for the persistence layer.
    pub descriptions_modified: bool,
    /// Route searches performed.
    pub pathfinds: u32,
}

/// Compact, serializable view of a [`StepSummary`] for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStats {
    /// Ticks executed.
    pub ticks: u64,
    /// Inputs applied.
    pub inputs: usize,
    /// Inputs rejected.
    pub rejected: usize,
    /// Operations dispatched.
    pub dispatched: usize,
    /// Route searches performed.
    pub pathfinds: u32,
}

impl StepSummary {
    /// Counts for logging.
    pub fn stats(&self) -> StepStats {
        StepStats {
            ticks: self.ticks,
            inputs: self.results.len(),
            rejected: self.results.iter().filter(|r| r.result.is_err()).count(),
            dispatched: self.scheduled.len(),
            pathfinds: self.pathfinds,
        }
    }
}

// ---------------------------------------------------------------------------
// Tick
// ---------------------------------------------------------------------------

impl World {
    /// Run every tick hook once at `now`.
    pub fn tick(&mut self, now: u64) {
        self.tick_conversations(now);
        let players: Vec<PlayerId> = self.players.keys().copied().collect();
        for &id in &players {
            self.tick_player(id, now);
        }
        let players: Vec<PlayerId> = self.players.keys().copied().collect();
        for &id in &players {
            self.tick_pathfinding(id, now);
        }
        for &id in &players {
            self.tick_position(id, now);
        }
        let agents: Vec<AgentId> = self.agents.keys().copied().collect();
        for id in agents {
            self.tick_agent(id, now);
        }
    }
}

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

/// A world together with its input queue and step clock.
#[derive(Debug)]
pub struct Game {
    world: World,
    queue: InputQueue,
    last_tick: Option<u64>,
}

impl Game {
    /// Wrap a world that has not been stepped yet.
    pub fn new(world: World) -> Self {
        Self {
            world,
            queue: InputQueue::new(),
            last_tick: None,
        }
    }

    /// The world.
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access to the world, for setup outside the step loop.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Queue an input received at simulated time `received`.
    pub fn submit(&mut self, input: Input, received: u64) -> u64 {
        self.queue.push(input, received)
    }

    /// Inputs not yet applied.
    pub fn pending_inputs(&self) -> usize {
        self.queue.len()
    }

    /// Timestamp of the last executed tick.
    pub const fn last_tick(&self) -> Option<u64> {
        self.last_tick
    }

    /// Timestamp of the first tick the next step would run, given the wall
    /// clock `now`. Inputs received at this time apply in that tick.
    pub fn next_tick(&self, now: u64) -> u64 {
        match self.last_tick {
            Some(previous) => previous.saturating_add(self.world.config.world.tick_ms.max(1)),
            None => now,
        }
    }

    /// Advance simulated time towards `now`.
    ///
    /// The first step starts at `now`; later steps start one tick after the
    /// previous step's last tick. No tick ever runs after `now`, so a step
    /// called before a whole tick has elapsed does nothing.
    ///
    /// # Errors
    ///
    /// [`StepError::TimeWentBackwards`] when `now` precedes the previous
    /// step's last tick.
    pub fn run_step(&mut self, now: u64) -> Result<StepSummary, StepError> {
        let tick_ms = self.world.config.world.tick_ms.max(1);
        let max_ticks = self.world.config.world.max_ticks_per_step();
        let started = match self.last_tick {
            Some(previous) if now < previous => {
                return Err(StepError::TimeWentBackwards { now, previous });
            }
            Some(previous) => previous.saturating_add(tick_ms),
            None => now,
        };
        if started > now {
            // Not enough time has passed for another tick.
            return Ok(StepSummary {
                started,
                ended: self.last_tick.unwrap_or(now),
                ticks: 0,
                results: Vec::new(),
                scheduled: Vec::new(),
                descriptions_modified: false,
                pathfinds: 0,
            });
        }

        self.world.begin_step();
        let mut current = started;
        let mut ticks = 0_u64;
        let mut results = Vec::new();
        loop {
            while let Some(queued) = self.queue.pop_due(current) {
                let name = queued.input.name();
                let result = self.world.apply_input(current, queued.input);
                if let Err(err) = &result {
                    warn!(number = queued.number, command = name, error = %err, "Input rejected");
                }
                results.push(InputRecord {
                    number: queued.number,
                    name,
                    result,
                });
            }
            self.world.tick(current);
            ticks = ticks.saturating_add(1);
            self.last_tick = Some(current);

            let candidate = current.saturating_add(tick_ms);
            if ticks >= max_ticks || now < candidate {
                break;
            }
            current = candidate;
        }

        let summary = StepSummary {
            started,
            ended: current,
            ticks,
            results,
            scheduled: self.world.take_scheduled(),
            descriptions_modified: self.world.take_descriptions_modified(),
            pathfinds: self.world.num_pathfinds(),
        };
        debug!(started, ended = current, stats = ?summary.stats(), "Step complete");
        Ok(summary)
    }
}
