//! Lockstep - A strict two-phase locking scheduler simulator
//!
//! Lockstep takes an interleaved history of reads, writes and commits issued by
//! several transactions and decides, operation by operation, whether each one
//! executes, waits or is rejected:
//! - shared/exclusive locking with upgrades
//! - growing and shrinking phases, with every lock released at commit
//! - delayed operations retried on every step
//! - deadlock detection and abort-and-replay of a victim transaction
//!
//! Architecture Overview:
//! ┌─────────────────────────────────────────────────────────────┐
//! │          History text  "r1[x] w2[y] r1[y] c1 ..."           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Lexer → Parser → Operations                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Scheduler                            │
//! │   (execution list, delayed queue, phases, abort/replay)     │
//! └─────────────────────────────────────────────────────────────┘
//!                    │                   │
//!                    ▼                   ▼
//! ┌──────────────────────────┐ ┌────────────────────────────────┐
//! │        Lock Table        │ │       Deadlock Detector        │
//! │ (compatibility, release) │ │    (wait-for pairs, cycles)    │
//! └──────────────────────────┘ └────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │           Schedule: trace of operations + lock events       │
//! └─────────────────────────────────────────────────────────────┘

use std::fs;
use std::path::Path;

pub mod error;
pub mod lexer;
pub mod parser;
pub mod scheduler;
pub mod trace;
pub mod types;

pub use crate::error::{LockstepError, Result};
pub use crate::parser::Parser;
pub use crate::scheduler::{Scheduler, SchedulerConfig};
pub use crate::trace::{Notice, Schedule, TraceEvent};
pub use crate::types::{Action, Lock, LockMode, Operation, Phase, Transaction, TxnId};

/// Parse and schedule one history with the given configuration
pub fn run_history(history: &str, config: SchedulerConfig) -> Result<Schedule> {
    Scheduler::new(config).execute_history(history)
}

/// Split a history listing into histories: one per line, blank lines and
/// `#` comments skipped
pub fn parse_history_listing(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Read a history listing from a file
pub fn load_histories(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)?;
    Ok(parse_history_listing(&text))
}
