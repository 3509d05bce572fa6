use std::ops::Range;
use crate::error::{DispatchError, Result};

/// One accelerator call: `count` rows starting at `start`, issued on `handle`
/// during dispatch round `round`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub round: usize,
    pub handle: usize,
    pub start: usize,
    pub count: usize,
}

impl Assignment {
    pub fn end(&self) -> usize {
        self.start + self.count
    }

    pub fn rows(&self) -> Range<usize> {
        self.start..self.end()
    }
}

/// # DispatchPlan
///
/// The ordered list of calls that covers a batch of `flow_batch` rows.
///
/// ## Partitioning
///
/// A cursor walks the batch dimension. At every round:
///
/// 1. **Full round** - if a whole round still fits (`cursor + total <= flow_batch`),
///    every handle takes exactly its capacity, in index order
/// 2. **Remainder** - if the rest exceeds handle 0's capacity, handle 0 takes its
///    capacity and the others are filled greedily in index order, each taking
///    `min(rest, capacity)`
/// 3. **Tail** - otherwise handle 0 takes everything that is left
///
/// The rest is always smaller than the total capacity in cases 2 and 3, so
/// the greedy fill always finishes within the round and no call ever exceeds
/// its handle's capacity.
///
/// ```
/// use teppan::dispatch::DispatchPlan;
///
/// let plan = DispatchPlan::build(&[4, 2], 7).unwrap();
/// let calls: Vec<_> = plan.assignments().iter().map(|a| (a.handle, a.start, a.count)).collect();
/// assert_eq!(calls, vec![(0, 0, 4), (1, 4, 2), (0, 6, 1)]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DispatchPlan {
    flow_batch: usize,
    assignments: Vec<Assignment>,
}

impl DispatchPlan {
    /// Partitions `flow_batch` rows over handles with the given capacities.
    ///
    /// Fails with [`DispatchError::Config`] when there are rows to place but
    /// no handles, or when a capacity is zero.
    pub fn build(capacities: &[usize], flow_batch: usize) -> Result<Self> {
        if flow_batch == 0 {
            return Ok(Self::default());
        }
        if capacities.is_empty() {
            return Err(DispatchError::Config(format!(
                "cannot place {flow_batch} rows without accelerators"
            )));
        }
        if capacities.contains(&0) {
            return Err(DispatchError::Config(format!(
                "accelerator capacities must be positive, got {capacities:?}"
            )));
        }

        let total: usize = capacities.iter().sum();
        let mut assignments = vec![];
        let mut cursor = 0;
        let mut round = 0;

        while cursor < flow_batch {
            let rest = flow_batch - cursor;
            if rest >= total {
                for (handle, &capacity) in capacities.iter().enumerate() {
                    assignments.push(Assignment { round, handle, start: cursor, count: capacity });
                    cursor += capacity;
                }
            } else if rest > capacities[0] {
                let mut left = rest;
                for (handle, &capacity) in capacities.iter().enumerate() {
                    if left == 0 {
                        break;
                    }
                    let count = left.min(capacity);
                    assignments.push(Assignment { round, handle, start: cursor, count });
                    cursor += count;
                    left -= count;
                }
            } else {
                assignments.push(Assignment { round, handle: 0, start: cursor, count: rest });
                cursor = flow_batch;
            }
            round += 1;
        }

        Ok(Self { flow_batch, assignments })
    }

    pub fn flow_batch(&self) -> usize {
        self.flow_batch
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Assignments grouped by round, in issue order.
    pub fn rounds(&self) -> impl Iterator<Item = &[Assignment]> {
        self.assignments.chunk_by(|a, b| a.round == b.round)
    }

    pub fn round_count(&self) -> usize {
        self.assignments.last().map_or(0, |a| a.round + 1)
    }

    /// Checks every invariant the dispatcher relies on.
    ///
    /// - assignments are contiguous from row 0 and none is empty
    /// - their counts add up to `flow_batch`
    /// - no count exceeds its handle's capacity
    /// - no handle appears twice in one round
    pub fn validate(&self, capacities: &[usize]) -> Result<()> {
        let mut cursor = 0;
        // handles already used in the current round
        let mut seen = vec![false; capacities.len()];
        let mut current_round = 0;
        for assignment in &self.assignments {
            let Some(&capacity) = capacities.get(assignment.handle) else {
                return Err(DispatchError::Config(format!(
                    "plan names accelerator {} of {}",
                    assignment.handle,
                    capacities.len()
                )));
            };
            if assignment.start != cursor || assignment.count == 0 {
                return Err(DispatchError::DispatchConsistency {
                    expected: self.flow_batch,
                    written: cursor,
                });
            }
            if assignment.count > capacity {
                return Err(DispatchError::CapacityExceeded {
                    handle: assignment.handle,
                    count: assignment.count,
                    capacity,
                });
            }
            if assignment.round < current_round {
                return Err(DispatchError::Config(format!(
                    "round {} issued after round {current_round}",
                    assignment.round
                )));
            }
            if assignment.round > current_round {
                current_round = assignment.round;
                seen.fill(false);
            }
            if std::mem::replace(&mut seen[assignment.handle], true) {
                return Err(DispatchError::Config(format!(
                    "accelerator {} appears twice in round {}",
                    assignment.handle, assignment.round
                )));
            }
            cursor = assignment.end();
        }

        if cursor != self.flow_batch {
            return Err(DispatchError::DispatchConsistency {
                expected: self.flow_batch,
                written: cursor,
            });
        }
        Ok(())
    }
}
