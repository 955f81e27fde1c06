//! Configuration for the scheduler

use std::fmt;

use crate::error::{LockstepError, Result};

/// How the lock table decides whether a new lock may be granted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatibilityPolicy {
    /// Check every live lock on the resource (N-way shared locks).
    /// An exclusive lock also satisfies a later read by the same transaction.
    AllHolders,
    /// Decide from the first lock found on the resource only, with exact
    /// mode matching for already-held locks. Can admit a shared lock next to
    /// an exclusive one once a transaction has upgraded.
    FirstHolder,
}

/// Which wait-for cycles the deadlock detector finds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlockDetection {
    /// Only two-transaction cycles (A waits for B, B waits for A)
    Pairwise,
    /// Cycles of any length in the wait-for graph
    WaitForGraph,
}

/// Which transaction of a detected cycle is aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VictimPolicy {
    /// The transaction whose just-delayed operation triggered detection,
    /// or the cycle's first waiter if that transaction is not on the cycle
    Requester,
    /// The first waiting transaction of the detected cycle
    FirstWaiter,
}

/// What happens to a commit whose transaction still has delayed operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPolicy {
    /// Keep the commit in the delayed queue until the transaction is clear
    Retry,
    /// Drop the commit for good
    Skip,
}

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub compatibility: CompatibilityPolicy,
    pub detection: DeadlockDetection,
    pub victim: VictimPolicy,
    pub commit: CommitPolicy,
    /// Put an aborted transaction back into the growing phase
    pub reset_phase_on_abort: bool,
    /// Optional upper bound on main-loop steps for one history.
    /// Stall detection already ends every run; this only cuts off abort livelock.
    pub max_steps: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            compatibility: CompatibilityPolicy::AllHolders,
            detection: DeadlockDetection::Pairwise,
            victim: VictimPolicy::Requester,
            commit: CommitPolicy::Retry,
            reset_phase_on_abort: true,
            max_steps: None,
        }
    }
}

impl SchedulerConfig {
    /// Reproduce the classic simulator rules: first-holder compatibility,
    /// pairwise detection, blocked commits dropped, no phase reset
    pub fn legacy() -> Self {
        Self {
            compatibility: CompatibilityPolicy::FirstHolder,
            detection: DeadlockDetection::Pairwise,
            victim: VictimPolicy::Requester,
            commit: CommitPolicy::Skip,
            reset_phase_on_abort: false,
            ..Self::default()
        }
    }

    /// Full wait-for graph detection on top of the defaults
    pub fn thorough() -> Self {
        Self {
            detection: DeadlockDetection::WaitForGraph,
            ..Self::default()
        }
    }
}

impl CompatibilityPolicy {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "all-holders" => Ok(CompatibilityPolicy::AllHolders),
            "first-holder" => Ok(CompatibilityPolicy::FirstHolder),
            _ => Err(LockstepError::unknown_option_value("--compat", name)),
        }
    }
}

impl DeadlockDetection {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "pairwise" => Ok(DeadlockDetection::Pairwise),
            "graph" => Ok(DeadlockDetection::WaitForGraph),
            _ => Err(LockstepError::unknown_option_value("--detection", name)),
        }
    }
}

impl VictimPolicy {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "requester" => Ok(VictimPolicy::Requester),
            "first-waiter" => Ok(VictimPolicy::FirstWaiter),
            _ => Err(LockstepError::unknown_option_value("--victim", name)),
        }
    }
}

impl CommitPolicy {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "retry" => Ok(CommitPolicy::Retry),
            "skip" => Ok(CommitPolicy::Skip),
            _ => Err(LockstepError::unknown_option_value("--commit", name)),
        }
    }
}

impl fmt::Display for SchedulerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "compat={:?} detection={:?} victim={:?} commit={:?} reset_phase={} max_steps={:?}",
            self.compatibility,
            self.detection,
            self.victim,
            self.commit,
            self.reset_phase_on_abort,
            self.max_steps
        )
    }
}
