//! Core types for Lockstep
//!
//! Defines operations, locks and per-transaction phase state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction identifier as written in a history (`r1[x]` → 1)
pub type TxnId = u64;

/// Operation kinds a history can contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Read a resource (`r`)
    Read,
    /// Write a resource (`w`)
    Write,
    /// Commit the transaction (`c`)
    Commit,
}

impl Action {
    /// Single-letter form used in histories
    pub fn as_char(&self) -> char {
        match self {
            Action::Read => 'r',
            Action::Write => 'w',
            Action::Commit => 'c',
        }
    }

    /// Parse the single-letter form
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'r' => Some(Action::Read),
            'w' => Some(Action::Write),
            'c' => Some(Action::Commit),
            _ => None,
        }
    }

    /// Lock mode a data access needs; commits need none
    pub fn required_mode(&self) -> Option<LockMode> {
        match self {
            Action::Read => Some(LockMode::Shared),
            Action::Write => Some(LockMode::Exclusive),
            Action::Commit => None,
        }
    }
}

/// One action of one transaction, as it appeared in the input history.
///
/// Operations are never mutated after parsing. `seq` is the position in the
/// parsed history and serves as the operation's identity across re-queues.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operation {
    /// Position in the parsed history
    pub seq: usize,
    /// Issuing transaction
    pub txn_id: TxnId,
    /// What the operation does
    pub action: Action,
    /// Resource name; `None` for commits
    pub resource: Option<String>,
}

impl Operation {
    pub fn read(seq: usize, txn_id: TxnId, resource: &str) -> Self {
        Self { seq, txn_id, action: Action::Read, resource: Some(resource.to_string()) }
    }

    pub fn write(seq: usize, txn_id: TxnId, resource: &str) -> Self {
        Self { seq, txn_id, action: Action::Write, resource: Some(resource.to_string()) }
    }

    pub fn commit(seq: usize, txn_id: TxnId) -> Self {
        Self { seq, txn_id, action: Action::Commit, resource: None }
    }

    pub fn is_commit(&self) -> bool {
        self.action == Action::Commit
    }

    /// True for reads and writes
    pub fn is_access(&self) -> bool {
        !self.is_commit()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            Some(resource) => write!(f, "{}{}[{}]", self.action.as_char(), self.txn_id, resource),
            None => write!(f, "{}{}", self.action.as_char(), self.txn_id),
        }
    }
}

/// Lock modes for read/write access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    /// Shared lock for reads (multiple readers allowed)
    Shared,
    /// Exclusive lock for writes (single writer, no readers)
    Exclusive,
}

impl LockMode {
    pub fn as_char(&self) -> char {
        match self {
            LockMode::Shared => 's',
            LockMode::Exclusive => 'x',
        }
    }

    /// Whether holding `self` satisfies a request for `requested`
    pub fn covers(&self, requested: LockMode) -> bool {
        match self {
            LockMode::Exclusive => true,
            LockMode::Shared => requested == LockMode::Shared,
        }
    }
}

/// A lock held (or once held) by a transaction on a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lock {
    /// Transaction holding this lock
    pub txn_id: TxnId,
    /// Lock mode (shared or exclusive)
    pub mode: LockMode,
    /// Resource being locked
    pub resource: String,
    /// Set once the lock has been given back at commit
    pub released: bool,
}

impl Lock {
    pub fn new(txn_id: TxnId, mode: LockMode, resource: &str) -> Self {
        Self { txn_id, mode, resource: resource.to_string(), released: false }
    }

    pub fn is_exclusive(&self) -> bool {
        self.mode == LockMode::Exclusive
    }

    /// Copy of this lock marked as released
    pub fn to_released(&self) -> Self {
        Self { released: true, ..self.clone() }
    }
}

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let event = if self.released { 'u' } else { 'l' };
        write!(f, "{}{}{}[{}]", event, self.mode.as_char(), self.txn_id, self.resource)
    }
}

/// Two-phase locking phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// May acquire new locks
    Growing,
    /// Committed; no new locks may be acquired
    Shrinking,
}

/// Per-transaction phase state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: TxnId,
    pub phase: Phase,
}

impl Transaction {
    pub fn new(id: TxnId) -> Self {
        Self { id, phase: Phase::Growing }
    }

    pub fn is_growing(&self) -> bool {
        self.phase == Phase::Growing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::read(0, 1, "x").to_string(), "r1[x]");
        assert_eq!(Operation::write(1, 12, "acct").to_string(), "w12[acct]");
        assert_eq!(Operation::commit(2, 3).to_string(), "c3");
    }

    #[test]
    fn test_lock_display() {
        let lock = Lock::new(2, LockMode::Exclusive, "y");
        assert_eq!(lock.to_string(), "lx2[y]");
        assert_eq!(lock.to_released().to_string(), "ux2[y]");
        assert_eq!(Lock::new(1, LockMode::Shared, "x").to_string(), "ls1[x]");
    }

    #[test]
    fn test_lock_mode_covers() {
        assert!(LockMode::Exclusive.covers(LockMode::Shared));
        assert!(LockMode::Exclusive.covers(LockMode::Exclusive));
        assert!(LockMode::Shared.covers(LockMode::Shared));
        assert!(!LockMode::Shared.covers(LockMode::Exclusive));
    }

    #[test]
    fn test_action_round_trip_chars() {
        for c in ['r', 'w', 'c'] {
            assert_eq!(Action::from_char(c).map(|a| a.as_char()), Some(c));
        }
        assert_eq!(Action::from_char('x'), None);
        assert_eq!(Action::Commit.required_mode(), None);
    }

    #[test]
    fn test_transaction_starts_growing() {
        let mut txn = Transaction::new(7);
        assert!(txn.is_growing());
        txn.phase = Phase::Shrinking;
        assert!(!txn.is_growing());
    }
}
