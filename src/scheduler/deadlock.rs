//! Deadlock detection over the wait-for relation.
//!
//! A delayed operation of transaction A on resource r waits for every other
//! transaction B holding a live lock on r, giving the pair (A, B). Pairs are
//! listed in delayed-queue order, then lock acquisition order.

use std::collections::{BTreeMap, HashSet};

use super::config::DeadlockDetection;
use super::lock_table::LockTable;
use crate::types::{Operation, TxnId};

/// A detected wait-for cycle: `cycle[i]` waits for `cycle[i + 1]`,
/// and the last transaction waits for the first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deadlock {
    pub cycle: Vec<TxnId>,
}

impl Deadlock {
    /// The transaction whose wait was found first
    pub fn first_waiter(&self) -> TxnId {
        self.cycle[0]
    }

    pub fn involves(&self, txn_id: TxnId) -> bool {
        self.cycle.contains(&txn_id)
    }
}

/// All (waiting, blocking) pairs for the current delayed queue and lock table
pub fn wait_for_pairs(delayed: &[Operation], locks: &LockTable) -> Vec<(TxnId, TxnId)> {
    let mut pairs = Vec::new();
    for op in delayed {
        let Some(resource) = op.resource.as_deref() else {
            continue;
        };
        for lock in locks.locks_on(resource) {
            if lock.txn_id != op.txn_id {
                pairs.push((op.txn_id, lock.txn_id));
            }
        }
    }
    pairs
}

pub struct DeadlockDetector {
    detection: DeadlockDetection,
}

impl DeadlockDetector {
    pub fn new(detection: DeadlockDetection) -> Self {
        Self { detection }
    }

    pub fn detect(&self, delayed: &[Operation], locks: &LockTable) -> Option<Deadlock> {
        let pairs = wait_for_pairs(delayed, locks);
        match self.detection {
            DeadlockDetection::Pairwise => find_pair_cycle(&pairs),
            DeadlockDetection::WaitForGraph => find_graph_cycle(&pairs),
        }
    }
}

/// First pair (A, B) whose mirror (B, A) is also present
fn find_pair_cycle(pairs: &[(TxnId, TxnId)]) -> Option<Deadlock> {
    pairs
        .iter()
        .find(|(a, b)| pairs.contains(&(*b, *a)))
        .map(|(a, b)| Deadlock { cycle: vec![*a, *b] })
}

/// Depth-first search for a cycle of any length, starting from waiters in pair order
fn find_graph_cycle(pairs: &[(TxnId, TxnId)]) -> Option<Deadlock> {
    let mut graph: BTreeMap<TxnId, Vec<TxnId>> = BTreeMap::new();
    let mut roots = Vec::new();
    for &(waiter, holder) in pairs {
        let edges = graph.entry(waiter).or_default();
        if !edges.contains(&holder) {
            edges.push(holder);
        }
        if !roots.contains(&waiter) {
            roots.push(waiter);
        }
    }

    let mut finished = HashSet::new();
    for root in roots {
        let mut path = Vec::new();
        if let Some(cycle) = visit(&graph, root, &mut path, &mut finished) {
            return Some(Deadlock { cycle });
        }
    }
    None
}

fn visit(
    graph: &BTreeMap<TxnId, Vec<TxnId>>,
    node: TxnId,
    path: &mut Vec<TxnId>,
    finished: &mut HashSet<TxnId>,
) -> Option<Vec<TxnId>> {
    if let Some(start) = path.iter().position(|&t| t == node) {
        return Some(path[start..].to_vec());
    }
    if finished.contains(&node) {
        return None;
    }
    path.push(node);
    for &next in graph.get(&node).map(Vec::as_slice).unwrap_or(&[]) {
        if let Some(cycle) = visit(graph, next, path, finished) {
            return Some(cycle);
        }
    }
    path.pop();
    finished.insert(node);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::config::CompatibilityPolicy;

    fn locks(ops: &[Operation]) -> LockTable {
        let mut table = LockTable::new(CompatibilityPolicy::AllHolders);
        for op in ops {
            table.acquire(op);
        }
        table
    }

    #[test]
    fn test_wait_for_pairs() {
        let table = locks(&[Operation::read(0, 1, "x"), Operation::write(1, 2, "y")]);
        let delayed = vec![Operation::read(2, 1, "y"), Operation::commit(3, 1)];
        assert_eq!(wait_for_pairs(&delayed, &table), vec![(1, 2)]);
    }

    #[test]
    fn test_own_locks_are_not_waits() {
        let table = locks(&[Operation::read(0, 1, "x")]);
        let delayed = vec![Operation::write(1, 1, "x")];
        assert!(wait_for_pairs(&delayed, &table).is_empty());
    }

    #[test]
    fn test_two_party_deadlock() {
        let table = locks(&[Operation::read(0, 1, "x"), Operation::write(1, 2, "y")]);
        let delayed = vec![Operation::read(2, 1, "y"), Operation::write(3, 2, "x")];
        for detection in [DeadlockDetection::Pairwise, DeadlockDetection::WaitForGraph] {
            let deadlock = DeadlockDetector::new(detection).detect(&delayed, &table).unwrap();
            assert_eq!(deadlock.cycle, vec![1, 2]);
            assert_eq!(deadlock.first_waiter(), 1);
            assert!(deadlock.involves(2));
        }
    }

    #[test]
    fn test_no_deadlock_for_one_way_wait() {
        let table = locks(&[Operation::write(0, 1, "x")]);
        let delayed = vec![Operation::write(1, 2, "x")];
        for detection in [DeadlockDetection::Pairwise, DeadlockDetection::WaitForGraph] {
            assert!(DeadlockDetector::new(detection).detect(&delayed, &table).is_none());
        }
    }

    #[test]
    fn test_three_party_cycle_needs_graph() {
        // 1 waits for 2 on y, 2 waits for 3 on z, 3 waits for 1 on x
        let table = locks(&[
            Operation::write(0, 1, "x"),
            Operation::write(1, 2, "y"),
            Operation::write(2, 3, "z"),
        ]);
        let delayed = vec![
            Operation::write(3, 1, "y"),
            Operation::write(4, 2, "z"),
            Operation::write(5, 3, "x"),
        ];
        assert!(DeadlockDetector::new(DeadlockDetection::Pairwise)
            .detect(&delayed, &table)
            .is_none());
        let deadlock = DeadlockDetector::new(DeadlockDetection::WaitForGraph)
            .detect(&delayed, &table)
            .unwrap();
        assert_eq!(deadlock.cycle, vec![1, 2, 3]);
    }

    #[test]
    fn test_graph_cycle_not_through_first_root() {
        // 1 waits for 2; 2 and 3 wait for each other
        let pairs = vec![(1, 2), (2, 3), (3, 2)];
        let deadlock = find_graph_cycle(&pairs).unwrap();
        assert_eq!(deadlock.cycle, vec![2, 3]);
    }
}
