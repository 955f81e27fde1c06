//! Strict two-phase locking scheduler
//!
//! ## Scheduling loop
//!
//! The scheduler walks an execution list that starts as the parsed history and
//! grows as operations are re-queued. One step per list position:
//! 1. If the operation's transaction already has an operation in the delayed
//!    queue, the operation is delayed too (per-transaction FIFO).
//! 2. Otherwise it is run. If it needs a lock that cannot be granted it goes to
//!    the delayed queue and the deadlock detector runs; a detected cycle aborts
//!    one transaction. Then every delayed operation is retried once.
//! 3. When the end of the list is reached, leftover delayed operations are
//!    appended to the list and the queue is cleared.
//!
//! ## Strictness
//! Locks are only acquired while a transaction is growing and are all released
//! at its commit. Reads and writes issued after the commit are dropped.
//!
//! ## Abort
//! A deadlock victim loses its delayed operations, its trace entries and its
//! locks. Its operations are removed from the execution list and appended again
//! in input order, and the cursor is moved back by the number of removed
//! entries it had already passed.
//!
//! ## Termination
//! If the delayed queue is flushed twice with nothing executed, dropped or
//! aborted in between, the leftover operations can never run and the run stops
//! with a [`Notice::Stalled`]. An optional step bound cuts off abort livelock.

pub mod config;
pub mod deadlock;
pub mod lock_table;

pub use config::{CommitPolicy, CompatibilityPolicy, DeadlockDetection, SchedulerConfig, VictimPolicy};
pub use deadlock::{Deadlock, DeadlockDetector};
pub use lock_table::LockTable;

use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};

use crate::error::Result;
use crate::parser::Parser;
use crate::trace::{Notice, Schedule, TraceEvent};
use crate::types::{Operation, Phase, Transaction, TxnId};

/// Result of attempting one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Executed,
    /// Must wait in the delayed queue
    Delay,
    /// Permanently ignored (shrinking phase, or a skipped commit)
    Dropped,
}

/// The scheduler. Holds only configuration; every `execute` call builds its
/// own state, so one scheduler can serve many histories independently.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Parse a textual history and schedule it
    pub fn execute_history(&self, history: &str) -> Result<Schedule> {
        let operations = Parser::parse(history)?;
        Ok(self.execute(&operations))
    }

    /// Schedule an ordered list of operations
    pub fn execute(&self, operations: &[Operation]) -> Schedule {
        debug!("Scheduling {} operations ({})", operations.len(), self.config);
        ScheduleContext::new(&self.config, operations).run()
    }
}

/// Mutable state of one scheduling run
struct ScheduleContext<'a> {
    config: &'a SchedulerConfig,
    /// Parsed input, used to replay aborted transactions
    operations: &'a [Operation],
    execution_list: Vec<Operation>,
    delayed: Vec<Operation>,
    transactions: HashMap<TxnId, Transaction>,
    lock_table: LockTable,
    detector: DeadlockDetector,
    trace: Vec<TraceEvent>,
    notices: Vec<Notice>,
    /// Input positions of operations that waited in the current attempt
    waited: HashSet<usize>,
    /// Input positions of commits already reported as blocked
    blocked_commits: HashSet<usize>,
    /// Next execution list position
    cursor: usize,
    /// Bumped on every execute, drop and abort
    progress: u64,
}

impl<'a> ScheduleContext<'a> {
    fn new(config: &'a SchedulerConfig, operations: &'a [Operation]) -> Self {
        let transactions = operations
            .iter()
            .map(|op| (op.txn_id, Transaction::new(op.txn_id)))
            .collect();
        Self {
            config,
            operations,
            execution_list: operations.to_vec(),
            delayed: Vec::new(),
            transactions,
            lock_table: LockTable::new(config.compatibility),
            detector: DeadlockDetector::new(config.detection),
            trace: Vec::new(),
            notices: Vec::new(),
            waited: HashSet::new(),
            blocked_commits: HashSet::new(),
            cursor: 0,
            progress: 0,
        }
    }

    fn run(mut self) -> Schedule {
        let mut steps = 0;
        let mut progress_at_flush: Option<u64> = None;

        while self.cursor < self.execution_list.len() {
            if self.config.max_steps == Some(steps) {
                self.notify(Notice::StepLimit(steps));
                break;
            }
            steps += 1;
            self.step();

            if self.cursor == self.execution_list.len() && !self.delayed.is_empty() {
                if progress_at_flush == Some(self.progress) {
                    let stuck = std::mem::take(&mut self.delayed);
                    self.notify(Notice::Stalled(stuck));
                    break;
                }
                progress_at_flush = Some(self.progress);
                let pending = std::mem::take(&mut self.delayed);
                self.execution_list.extend(pending);
            }
        }

        Schedule { trace: self.trace, notices: self.notices }
    }

    fn step(&mut self) {
        let op = self.execution_list[self.cursor].clone();
        self.cursor += 1;

        if self.has_delayed_operation(op.txn_id) {
            self.delay(op);
            return;
        }

        if self.run_operation(&op) == Outcome::Delay {
            let requester = op.txn_id;
            self.delay(op);
            if let Some(deadlock) = self.detector.detect(&self.delayed, &self.lock_table) {
                let victim = self.choose_victim(&deadlock, requester);
                self.abort_transaction(victim, deadlock);
            }
        }
        self.run_delayed_operations();
    }

    fn run_operation(&mut self, op: &Operation) -> Outcome {
        if op.is_commit() {
            return self.run_commit(op);
        }

        if !self.is_growing(op.txn_id) {
            self.progress += 1;
            self.notify(Notice::Dropped(op.clone()));
            return Outcome::Dropped;
        }

        if self.lock_table.holds(op) {
            self.record_execution(op);
        } else if self.lock_table.compatible(op) {
            if let Some(lock) = self.lock_table.acquire(op) {
                self.trace.push(TraceEvent::Lock(lock));
            }
            self.record_execution(op);
        } else {
            return Outcome::Delay;
        }
        Outcome::Executed
    }

    fn run_commit(&mut self, op: &Operation) -> Outcome {
        if !self.can_commit(op.txn_id) {
            if self.blocked_commits.insert(op.seq) {
                self.notify(Notice::CommitBlocked(op.txn_id));
            }
            return match self.config.commit {
                CommitPolicy::Retry => Outcome::Delay,
                CommitPolicy::Skip => {
                    self.progress += 1;
                    Outcome::Dropped
                }
            };
        }

        self.record_execution(op);
        for lock in self.lock_table.release(op.txn_id) {
            self.trace.push(TraceEvent::Lock(lock));
        }
        if let Some(txn) = self.transactions.get_mut(&op.txn_id) {
            txn.phase = Phase::Shrinking;
        }
        Outcome::Executed
    }

    fn record_execution(&mut self, op: &Operation) {
        let delayed = self.waited.contains(&op.seq);
        self.trace.push(TraceEvent::Executed { operation: op.clone(), delayed });
        self.progress += 1;
    }

    /// A transaction may commit when nothing of it waits in the delayed queue.
    /// Under `Retry` the commit's own queue entry (and other commits) do not count.
    fn can_commit(&self, txn_id: TxnId) -> bool {
        !self.delayed.iter().any(|pending| {
            pending.txn_id == txn_id
                && (self.config.commit == CommitPolicy::Skip || pending.is_access())
        })
    }

    fn has_delayed_operation(&self, txn_id: TxnId) -> bool {
        self.delayed.iter().any(|op| op.txn_id == txn_id)
    }

    fn is_growing(&self, txn_id: TxnId) -> bool {
        self.transactions.get(&txn_id).map_or(true, Transaction::is_growing)
    }

    fn delay(&mut self, op: Operation) {
        self.waited.insert(op.seq);
        self.notify(Notice::Delayed(op.clone()));
        self.delayed.push(op);
    }

    /// Retry every delayed operation once, keeping those that still cannot run.
    /// The queue stays as it was during the pass, so commits see the pre-pass queue.
    fn run_delayed_operations(&mut self) {
        if self.delayed.is_empty() {
            return;
        }
        let pending = self.delayed.clone();
        let mut still_delayed = Vec::new();
        for op in pending {
            if self.run_operation(&op) == Outcome::Delay {
                still_delayed.push(op);
            }
        }
        self.delayed = still_delayed;
    }

    fn choose_victim(&self, deadlock: &Deadlock, requester: TxnId) -> TxnId {
        match self.config.victim {
            VictimPolicy::Requester if deadlock.involves(requester) => requester,
            VictimPolicy::Requester | VictimPolicy::FirstWaiter => deadlock.first_waiter(),
        }
    }

    fn abort_transaction(&mut self, victim: TxnId, deadlock: Deadlock) {
        self.delayed.retain(|op| op.txn_id != victim);
        self.trace.retain(|event| event.txn_id() != victim);
        self.lock_table.purge(victim);

        let passed = self.execution_list[..self.cursor]
            .iter()
            .filter(|op| op.txn_id == victim)
            .count();
        self.execution_list.retain(|op| op.txn_id != victim);
        self.cursor -= passed;

        let operations = self.operations;
        for op in operations.iter().filter(|op| op.txn_id == victim) {
            self.waited.remove(&op.seq);
            self.blocked_commits.remove(&op.seq);
            self.execution_list.push(op.clone());
        }

        if self.config.reset_phase_on_abort {
            if let Some(txn) = self.transactions.get_mut(&victim) {
                txn.phase = Phase::Growing;
            }
        }
        self.progress += 1;
        self.notify(Notice::Deadlock { cycle: deadlock.cycle, victim });
    }

    fn notify(&mut self, notice: Notice) {
        match &notice {
            Notice::Delayed(_) | Notice::CommitBlocked(_) => info!("{}", notice),
            Notice::Deadlock { .. }
            | Notice::Dropped(_)
            | Notice::Stalled(_)
            | Notice::StepLimit(_) => warn!("{}", notice),
        }
        self.notices.push(notice);
    }
}
