//! The generation budget gate.
//!
//! Generating an item is expensive, so it is limited twice over: each
//! value of a monotonic `bucket` counter (advanced by an external
//! scheduler) can be spent at most once, and at most `max_per_window`
//! generations may happen per sliding window. A request that passes both
//! gates still only proceeds on a low-probability random draw.
//!
//! The record is shared by every concurrent decider. Instead of a lock it
//! is versioned: a decider loads a snapshot, evaluates the gates and writes
//! back with compare-and-set, retrying from a fresh snapshot when another
//! writer got there first. Two deciders that read the same bucket can
//! therefore never both win it.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GenerationConfig;
use crate::error::BudgetError;

/// Compare-and-set attempts before [`try_acquire`] gives up.
pub const MAX_CAS_ATTEMPTS: u32 = 8;

/// The persisted budget record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationBudget {
    /// Current bucket, advanced by the scheduler.
    pub bucket: u64,
    /// Bucket spent by the last approved generation.
    pub last_generation_bucket: u64,
    /// Start of the current window in milliseconds.
    pub window_start: u64,
    /// Generations approved in the current window.
    pub window_count: u32,
}

/// Limits applied by the gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetPolicy {
    /// Sliding window length in milliseconds.
    pub window_ms: u64,
    /// Generations allowed per window.
    pub max_per_window: u32,
    /// Probability that an otherwise allowed request proceeds.
    pub probability: f64,
}

impl From<&GenerationConfig> for BudgetPolicy {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            window_ms: config.window_ms,
            max_per_window: config.max_per_window,
            probability: config.probability,
        }
    }
}

/// Why the gate said no.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    /// The current bucket has already been spent.
    BucketConsumed,
    /// The window quota is used up.
    WindowFull,
    /// The random draw failed.
    Draw,
}

/// Outcome of one gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    /// Proceed; `next` is the record to write back.
    Approved {
        /// The updated record.
        next: GenerationBudget,
    },
    /// Do not generate.
    Rejected(GateRejection),
}

impl GateDecision {
    /// Whether the request may proceed.
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}

/// Evaluate both gates and the draw against a snapshot.
///
/// `draw` is a uniform sample from `[0, 1)`; the request proceeds when it
/// falls below the policy probability.
pub fn evaluate(budget: &GenerationBudget, now: u64, policy: &BudgetPolicy, draw: f64) -> GateDecision {
    if budget.bucket <= budget.last_generation_bucket {
        return GateDecision::Rejected(GateRejection::BucketConsumed);
    }
    let (window_start, window_count) = if now.saturating_sub(budget.window_start) > policy.window_ms {
        (now, 0)
    } else {
        (budget.window_start, budget.window_count)
    };
    if window_count >= policy.max_per_window {
        return GateDecision::Rejected(GateRejection::WindowFull);
    }
    if draw >= policy.probability || draw.is_nan() {
        return GateDecision::Rejected(GateRejection::Draw);
    }
    GateDecision::Approved {
        next: GenerationBudget {
            bucket: budget.bucket,
            last_generation_bucket: budget.bucket,
            window_start,
            window_count: window_count.saturating_add(1),
        },
    }
}

/// A value tagged with the version it was read at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Versioned<T> {
    /// Monotonic version, bumped on every write.
    pub version: u64,
    /// The stored value.
    pub value: T,
}

/// Storage for the shared budget record.
pub trait BudgetStore: Send + Sync {
    /// Read the current record and its version.
    ///
    /// # Errors
    ///
    /// [`BudgetError::Store`] when the backing store fails.
    fn load(&self) -> Result<Versioned<GenerationBudget>, BudgetError>;

    /// Write `next` only if the stored version is still `expected_version`.
    /// Returns whether the write happened.
    ///
    /// # Errors
    ///
    /// [`BudgetError::Store`] when the backing store fails.
    fn compare_and_set(&self, expected_version: u64, next: GenerationBudget) -> Result<bool, BudgetError>;

    /// Advance the bucket counter, returning the new bucket.
    ///
    /// # Errors
    ///
    /// [`BudgetError::Store`] when the backing store fails.
    fn advance_bucket(&self) -> Result<u64, BudgetError>;
}

/// Try to spend one generation from the shared budget.
///
/// The draw is taken once by the caller; only the gate evaluation is
/// repeated when a concurrent writer wins the compare-and-set.
///
/// # Errors
///
/// [`BudgetError::Contended`] after [`MAX_CAS_ATTEMPTS`] lost races, or
/// any store failure.
pub fn try_acquire(
    store: &dyn BudgetStore,
    now: u64,
    policy: &BudgetPolicy,
    draw: f64,
) -> Result<GateDecision, BudgetError> {
    for attempt in 1..=MAX_CAS_ATTEMPTS {
        let snapshot = store.load()?;
        let decision = evaluate(&snapshot.value, now, policy, draw);
        let GateDecision::Approved { next } = decision else {
            return Ok(decision);
        };
        if store.compare_and_set(snapshot.version, next)? {
            return Ok(decision);
        }
        debug!(attempt, version = snapshot.version, "Budget record changed underneath, retrying");
    }
    Err(BudgetError::Contended {
        attempts: MAX_CAS_ATTEMPTS,
    })
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// A process-local [`BudgetStore`].
#[derive(Debug, Default)]
pub struct InMemoryBudgetStore {
    inner: Mutex<Versioned<GenerationBudget>>,
}

impl InMemoryBudgetStore {
    /// A store holding `budget` at version zero.
    pub fn new(budget: GenerationBudget) -> Self {
        Self {
            inner: Mutex::new(Versioned {
                version: 0,
                value: budget,
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Versioned<GenerationBudget>>, BudgetError> {
        self.inner.lock().map_err(|e| BudgetError::Store {
            message: format!("budget lock poisoned: {e}"),
        })
    }
}

impl BudgetStore for InMemoryBudgetStore {
    fn load(&self) -> Result<Versioned<GenerationBudget>, BudgetError> {
        Ok(*self.lock()?)
    }

    fn compare_and_set(&self, expected_version: u64, next: GenerationBudget) -> Result<bool, BudgetError> {
        let mut guard = self.lock()?;
        if guard.version != expected_version {
            return Ok(false);
        }
        guard.version = guard.version.saturating_add(1);
        guard.value = next;
        Ok(true)
    }

    fn advance_bucket(&self) -> Result<u64, BudgetError> {
        let mut guard = self.lock()?;
        guard.version = guard.version.saturating_add(1);
        guard.value.bucket = guard.value.bucket.saturating_add(1);
        Ok(guard.value.bucket)
    }
}
