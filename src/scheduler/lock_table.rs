//! Lock table: the set of live locks and the compatibility rules for granting new ones.

use log::debug;

use super::config::CompatibilityPolicy;
use crate::types::{Lock, LockMode, Operation, TxnId};

/// Live locks in acquisition order
#[derive(Debug, Clone)]
pub struct LockTable {
    locks: Vec<Lock>,
    policy: CompatibilityPolicy,
}

impl LockTable {
    pub fn new(policy: CompatibilityPolicy) -> Self {
        Self { locks: Vec::new(), policy }
    }

    pub fn locks(&self) -> &[Lock] {
        &self.locks
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Live locks on `resource`, in acquisition order
    pub fn locks_on<'a>(&'a self, resource: &'a str) -> impl Iterator<Item = &'a Lock> + 'a {
        self.locks.iter().filter(move |l| l.resource == resource)
    }

    /// Whether the issuing transaction already holds a lock good enough for `op`
    pub fn holds(&self, op: &Operation) -> bool {
        let (Some(resource), Some(required)) = (op.resource.as_deref(), op.action.required_mode()) else {
            return false;
        };
        self.locks_on(resource).any(|lock| {
            lock.txn_id == op.txn_id
                && match self.policy {
                    CompatibilityPolicy::AllHolders => lock.mode.covers(required),
                    CompatibilityPolicy::FirstHolder => lock.mode == required,
                }
        })
    }

    /// Whether a new lock for `op` may be granted next to the current holders
    pub fn compatible(&self, op: &Operation) -> bool {
        let (Some(resource), Some(required)) = (op.resource.as_deref(), op.action.required_mode()) else {
            return false;
        };
        match self.policy {
            CompatibilityPolicy::AllHolders => match required {
                LockMode::Shared => !self
                    .locks_on(resource)
                    .any(|l| l.is_exclusive() && l.txn_id != op.txn_id),
                LockMode::Exclusive => self.locks_on(resource).all(|l| l.txn_id == op.txn_id),
            },
            CompatibilityPolicy::FirstHolder => {
                let relevant: Vec<&Lock> = self.locks_on(resource).collect();
                let Some(first) = relevant.first() else {
                    return true;
                };
                if first.is_exclusive() {
                    return false;
                }
                // Upgrade by the sole holder, or another reader joining
                (first.txn_id == op.txn_id && relevant.len() == 1 && required == LockMode::Exclusive)
                    || (first.txn_id != op.txn_id && required == LockMode::Shared)
            }
        }
    }

    /// Record a new lock for `op` and return it. Commits acquire nothing.
    pub fn acquire(&mut self, op: &Operation) -> Option<Lock> {
        let resource = op.resource.as_deref()?;
        let mode = op.action.required_mode()?;
        let lock = Lock::new(op.txn_id, mode, resource);
        debug!("Acquired {}", lock);
        self.locks.push(lock.clone());
        Some(lock)
    }

    /// Remove every lock of `txn_id`; returns them marked released, in acquisition order
    pub fn release(&mut self, txn_id: TxnId) -> Vec<Lock> {
        let (released, kept): (Vec<Lock>, Vec<Lock>) =
            self.locks.drain(..).partition(|l| l.txn_id == txn_id);
        self.locks = kept;
        released
            .iter()
            .map(|l| {
                debug!("Released {}", l);
                l.to_released()
            })
            .collect()
    }

    /// Drop every lock of `txn_id` without producing release events (abort)
    pub fn purge(&mut self, txn_id: TxnId) -> usize {
        let before = self.locks.len();
        self.locks.retain(|l| l.txn_id != txn_id);
        before - self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(policy: CompatibilityPolicy, ops: &[Operation]) -> LockTable {
        let mut table = LockTable::new(policy);
        for op in ops {
            table.acquire(op);
        }
        table
    }

    #[test]
    fn test_free_resource_is_grantable() {
        for policy in [CompatibilityPolicy::AllHolders, CompatibilityPolicy::FirstHolder] {
            let t = LockTable::new(policy);
            assert!(t.compatible(&Operation::read(0, 1, "x")));
            assert!(t.compatible(&Operation::write(0, 1, "x")));
        }
    }

    #[test]
    fn test_exclusive_blocks_everyone_else() {
        for policy in [CompatibilityPolicy::AllHolders, CompatibilityPolicy::FirstHolder] {
            let t = table(policy, &[Operation::write(0, 1, "x")]);
            assert!(!t.compatible(&Operation::read(1, 2, "x")));
            assert!(!t.compatible(&Operation::write(1, 2, "x")));
            assert!(t.compatible(&Operation::write(1, 2, "y")));
        }
    }

    #[test]
    fn test_shared_locks_stack() {
        for policy in [CompatibilityPolicy::AllHolders, CompatibilityPolicy::FirstHolder] {
            let t = table(policy, &[Operation::read(0, 1, "x")]);
            assert!(t.compatible(&Operation::read(1, 2, "x")));
            assert!(!t.compatible(&Operation::write(1, 2, "x")));
        }
    }

    #[test]
    fn test_upgrade_by_sole_reader() {
        for policy in [CompatibilityPolicy::AllHolders, CompatibilityPolicy::FirstHolder] {
            let t = table(policy, &[Operation::read(0, 1, "x")]);
            assert!(t.compatible(&Operation::write(1, 1, "x")));

            let t = table(policy, &[Operation::read(0, 1, "x"), Operation::read(1, 2, "x")]);
            assert!(!t.compatible(&Operation::write(2, 1, "x")));
        }
    }

    #[test]
    fn test_first_holder_admits_reader_after_upgrade() {
        // Known weakness of the first-holder rule: only ls1[x] is inspected
        let ops = [Operation::read(0, 1, "x"), Operation::write(1, 1, "x")];
        let legacy = table(CompatibilityPolicy::FirstHolder, &ops);
        assert!(legacy.compatible(&Operation::read(2, 2, "x")));

        let strict = table(CompatibilityPolicy::AllHolders, &ops);
        assert!(!strict.compatible(&Operation::read(2, 2, "x")));
    }

    #[test]
    fn test_three_readers_then_upgrade() {
        let ops = [
            Operation::read(0, 1, "x"),
            Operation::read(1, 2, "x"),
            Operation::read(2, 3, "x"),
        ];
        let t = table(CompatibilityPolicy::AllHolders, &ops);
        assert!(t.compatible(&Operation::read(3, 4, "x")));
        assert!(!t.compatible(&Operation::write(3, 3, "x")));
    }

    #[test]
    fn test_holds() {
        let t = table(CompatibilityPolicy::AllHolders, &[Operation::write(0, 1, "x")]);
        assert!(t.holds(&Operation::write(1, 1, "x")));
        assert!(t.holds(&Operation::read(1, 1, "x")));
        assert!(!t.holds(&Operation::read(1, 2, "x")));
        assert!(!t.holds(&Operation::commit(1, 1)));

        let legacy = table(CompatibilityPolicy::FirstHolder, &[Operation::write(0, 1, "x")]);
        assert!(!legacy.holds(&Operation::read(1, 1, "x")));

        let t = table(CompatibilityPolicy::AllHolders, &[Operation::read(0, 1, "x")]);
        assert!(!t.holds(&Operation::write(1, 1, "x")));
    }

    #[test]
    fn test_acquire_mode_follows_action() {
        let mut t = LockTable::new(CompatibilityPolicy::AllHolders);
        let lock = t.acquire(&Operation::write(0, 1, "x")).unwrap();
        assert_eq!(lock.mode, LockMode::Exclusive);
        let lock = t.acquire(&Operation::read(1, 2, "y")).unwrap();
        assert_eq!(lock.mode, LockMode::Shared);
        assert!(t.acquire(&Operation::commit(2, 1)).is_none());
        assert_eq!(t.locks().len(), 2);
    }

    #[test]
    fn test_release_returns_released_locks_in_order() {
        let mut t = table(
            CompatibilityPolicy::AllHolders,
            &[
                Operation::read(0, 1, "x"),
                Operation::read(1, 2, "y"),
                Operation::write(2, 1, "x"),
            ],
        );
        let released = t.release(1);
        let names: Vec<String> = released.iter().map(|l| l.to_string()).collect();
        assert_eq!(names, vec!["us1[x]", "ux1[x]"]);
        assert_eq!(t.locks().len(), 1);
        assert_eq!(t.locks()[0].txn_id, 2);
        assert!(t.release(1).is_empty());
    }

    #[test]
    fn test_purge() {
        let mut t = table(
            CompatibilityPolicy::AllHolders,
            &[Operation::read(0, 1, "x"), Operation::write(1, 2, "y")],
        );
        assert_eq!(t.purge(2), 1);
        assert_eq!(t.purge(2), 0);
        assert!(!t.is_empty());
        assert_eq!(t.purge(1), 1);
        assert!(t.is_empty());
    }
}
