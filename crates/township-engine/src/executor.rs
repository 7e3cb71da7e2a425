//! Out-of-band executor for dispatched agent operations.
//!
//! Every [`ScheduledOperation`] drained from a step runs on its own tokio
//! task, limited by a semaphore. The task computes a [`Decision`] from the
//! dispatch snapshot, waits a random jitter so completions from the same
//! step spread out, and then feeds the resulting inputs back to the step
//! loop through the same channel external callers use.
//!
//! The completion is submitted with a reply channel. If the world rejects
//! it (the destination became blocked, the invitee started talking to
//! someone else) the executor immediately submits a bare completion so the
//! agent is not left waiting for the operation timeout.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use township_core::config::{AgentsConfig, GenerationConfig};
use township_core::inputs::FinishDoSomethingArgs;
use township_core::{BudgetStore, CommandError, Input, InputOutcome, ScheduledOperation, SimulationConfig};
use tracing::{debug, warn};

use crate::content::ContentSource;
use crate::decision::{Decision, DecisionContext, decide};
use crate::error::EngineError;

/// Where the step loop sends the result of a submitted input.
pub type Reply = oneshot::Sender<Result<InputOutcome, CommandError>>;

/// An input on its way to the step loop.
#[derive(Debug)]
pub struct Submission {
    /// The input to queue.
    pub input: Input,
    /// Receives the handler's result once the input has been applied.
    pub reply: Option<Reply>,
}

impl Submission {
    /// A fire-and-forget submission.
    pub const fn new(input: Input) -> Self {
        Self { input, reply: None }
    }

    /// A submission whose result comes back on the returned receiver.
    pub fn with_reply(input: Input) -> (Self, oneshot::Receiver<Result<InputOutcome, CommandError>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                input,
                reply: Some(tx),
            },
            rx,
        )
    }
}

/// Executor settings copied out of the simulation configuration.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Cooldowns, activities and inventory parameters.
    pub agents: AgentsConfig,
    /// Budget policy and generation parameters.
    pub generation: GenerationConfig,
    /// Operations allowed to run at once.
    pub max_concurrent: usize,
}

impl From<&SimulationConfig> for ExecutorSettings {
    fn from(config: &SimulationConfig) -> Self {
        Self {
            agents: config.agents.clone(),
            generation: config.generation.clone(),
            max_concurrent: config.infrastructure.max_concurrent_operations,
        }
    }
}

struct Shared {
    settings: ExecutorSettings,
    budget: Arc<dyn BudgetStore>,
    content: Arc<dyn ContentSource>,
    inputs: mpsc::Sender<Submission>,
}

/// Runs dispatched operations and submits their results.
pub struct Executor {
    shared: Arc<Shared>,
    permits: Arc<Semaphore>,
}

impl core::fmt::Debug for Executor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Executor")
            .field("max_concurrent", &self.shared.settings.max_concurrent)
            .field("available", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// Create an executor submitting into `inputs`.
    pub fn new(
        settings: ExecutorSettings,
        budget: Arc<dyn BudgetStore>,
        content: Arc<dyn ContentSource>,
        inputs: mpsc::Sender<Submission>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent.max(1)));
        Self {
            shared: Arc::new(Shared {
                settings,
                budget,
                content,
                inputs,
            }),
            permits,
        }
    }

    /// Run `op` on a new task.
    pub fn spawn(&self, op: ScheduledOperation) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                warn!(operation_id = %op.operation_id, "Executor shut down, dropping operation");
                return;
            };
            let (agent_id, operation_id) = (op.agent_id, op.operation_id);
            if let Err(e) = shared.execute(&op).await {
                warn!(
                    agent_id = %agent_id,
                    operation_id = %operation_id,
                    error = %e,
                    "Operation could not be completed"
                );
            }
        })
    }
}

impl Shared {
    async fn execute(&self, op: &ScheduledOperation) -> Result<(), EngineError> {
        let (decision, delay) = self.plan(op);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        for input in decision.inputs {
            self.submit(input).await?;
        }

        let completion = decision.completion;
        let fallback = FinishDoSomethingArgs::bare(completion.agent_id, completion.operation_id);
        let has_effects = completion != fallback;
        match self.submit_and_wait(Input::FinishDoSomething(completion)).await? {
            Ok(outcome) => {
                debug!(operation_id = %op.operation_id, ?outcome, "Completion applied");
            }
            Err(err) if has_effects => {
                warn!(
                    agent_id = %op.agent_id,
                    operation_id = %op.operation_id,
                    error = %err,
                    "Completion rejected, completing without effects"
                );
                if let Err(err) = self.submit_and_wait(Input::FinishDoSomething(fallback)).await? {
                    warn!(operation_id = %op.operation_id, error = %err, "Bare completion rejected");
                }
            }
            Err(err) => {
                warn!(operation_id = %op.operation_id, error = %err, "Bare completion rejected");
            }
        }
        Ok(())
    }

    /// Compute the decision and the jitter before submitting it. A failed
    /// decision degrades to a bare completion.
    fn plan(&self, op: &ScheduledOperation) -> (Decision, Duration) {
        let mut rng = rand::rng();
        let ctx = DecisionContext {
            agents: &self.settings.agents,
            generation: &self.settings.generation,
            budget: self.budget.as_ref(),
            content: self.content.as_ref(),
        };
        let decision = decide(op, &ctx, &mut rng).unwrap_or_else(|e| {
            warn!(
                agent_id = %op.agent_id,
                operation_id = %op.operation_id,
                error = %e,
                "Decision failed, completing without effects"
            );
            Decision::bare(op)
        });
        let jitter = self.settings.agents.completion_jitter_ms;
        let delay = if jitter == 0 {
            0
        } else {
            rng.random_range(0..jitter)
        };
        (decision, Duration::from_millis(delay))
    }

    async fn submit(&self, input: Input) -> Result<(), EngineError> {
        self.inputs
            .send(Submission::new(input))
            .await
            .map_err(|e| EngineError::Channel {
                message: format!("input channel closed: {e}"),
            })
    }

    async fn submit_and_wait(&self, input: Input) -> Result<Result<InputOutcome, CommandError>, EngineError> {
        let (submission, reply) = Submission::with_reply(input);
        self.inputs
            .send(submission)
            .await
            .map_err(|e| EngineError::Channel {
                message: format!("input channel closed: {e}"),
            })?;
        reply.await.map_err(|e| EngineError::Channel {
            message: format!("step loop dropped the reply: {e}"),
        })
    }
}
