//! Scheduling outcome: the execution trace and the diagnostic notices.
//!
//! The trace lists executed operations and lock acquire/release events in the
//! order they actually happened. Notices are the advisory messages the
//! scheduler also writes to the log.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Lock, Operation, TxnId};

/// One entry of the execution trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEvent {
    /// An executed operation; `delayed` is set if it had to wait first
    Executed { operation: Operation, delayed: bool },
    /// A lock acquired (`released == false`) or released (`released == true`)
    Lock(Lock),
}

impl TraceEvent {
    /// Transaction the event belongs to
    pub fn txn_id(&self) -> TxnId {
        match self {
            TraceEvent::Executed { operation, .. } => operation.txn_id,
            TraceEvent::Lock(lock) => lock.txn_id,
        }
    }

    pub fn as_operation(&self) -> Option<&Operation> {
        match self {
            TraceEvent::Executed { operation, .. } => Some(operation),
            TraceEvent::Lock(_) => None,
        }
    }

    pub fn as_lock(&self) -> Option<&Lock> {
        match self {
            TraceEvent::Lock(lock) => Some(lock),
            TraceEvent::Executed { .. } => None,
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::Executed { operation, .. } => write!(f, "{}", operation),
            TraceEvent::Lock(lock) => write!(f, "{}", lock),
        }
    }
}

/// Advisory diagnostics produced while scheduling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notice {
    /// The operation could not run and was moved to the delayed queue
    Delayed(Operation),
    /// A wait-for cycle was found; `victim` was aborted to break it
    Deadlock { cycle: Vec<TxnId>, victim: TxnId },
    /// A commit was blocked because its transaction still had delayed operations
    CommitBlocked(TxnId),
    /// The operation was issued after its transaction committed and was ignored
    Dropped(Operation),
    /// The delayed operations can never run; scheduling stopped early
    Stalled(Vec<Operation>),
    /// The step bound was reached; scheduling stopped early
    StepLimit(usize),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Delayed(op) => write!(f, "The operation {} was delayed.", op),
            Notice::Deadlock { cycle, victim } => {
                let cycle: Vec<String> = cycle.iter().map(|t| t.to_string()).collect();
                write!(
                    f,
                    "A deadlock was found between transactions {}. The transaction {} was aborted.",
                    cycle.join(" -> "),
                    victim
                )
            }
            Notice::CommitBlocked(txn) => write!(
                f,
                "It is not possible to commit the transaction {} because there are pending operations.",
                txn
            ),
            Notice::Dropped(op) => write!(
                f,
                "The operation {} will be ignored because its transaction is in the shrinking phase.",
                op
            ),
            Notice::Stalled(ops) => {
                let ops: Vec<String> = ops.iter().map(|op| op.to_string()).collect();
                write!(f, "Scheduling stalled; these operations can never run: {}", ops.join(", "))
            }
            Notice::StepLimit(steps) => write!(f, "Scheduling stopped after {} steps.", steps),
        }
    }
}

/// Result of scheduling one history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Executed operations and lock events, in execution order
    pub trace: Vec<TraceEvent>,
    /// Diagnostics, in the order they were raised
    pub notices: Vec<Notice>,
}

impl Schedule {
    /// Join the trace tokens with `separator`
    pub fn render(&self, separator: &str) -> String {
        self.trace.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(separator)
    }

    /// Like `render`, but operations that waited in the delayed queue get a `*` prefix
    pub fn render_marked(&self, separator: &str) -> String {
        self.trace
            .iter()
            .map(|e| match e {
                TraceEvent::Executed { operation, delayed: true } => format!("*{}", operation),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(separator)
    }

    /// Executed operations only, in execution order
    pub fn executed(&self) -> impl Iterator<Item = &Operation> {
        self.trace.iter().filter_map(TraceEvent::as_operation)
    }

    /// Lock events only, in execution order
    pub fn lock_events(&self) -> impl Iterator<Item = &Lock> {
        self.trace.iter().filter_map(TraceEvent::as_lock)
    }

    /// Transactions chosen as deadlock victims, in abort order
    pub fn aborted(&self) -> Vec<TxnId> {
        self.notices
            .iter()
            .filter_map(|n| match n {
                Notice::Deadlock { victim, .. } => Some(*victim),
                _ => None,
            })
            .collect()
    }

    /// True when scheduling stopped before every operation was handled
    pub fn is_incomplete(&self) -> bool {
        self.notices
            .iter()
            .any(|n| matches!(n, Notice::Stalled(_) | Notice::StepLimit(_)))
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(", "))
    }
}
