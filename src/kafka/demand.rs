use crate::kafka::topic_partition::TopicPartition;
use std::collections::HashSet;

/// Caller-side demand for record delivery.
///
/// Modeled as a tagged union rather than an integer with a sentinel so that
/// mode transitions stay exhaustive: the stream is either *flowing*
/// (`Unbounded`) or in *fetch* mode with a remaining delivery budget
/// (`Counted`). `Counted(0)` means delivery is halted until the budget is
/// replenished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demand {
    /// Flowing mode: deliver every available record
    Unbounded,
    /// Fetch mode: deliver at most this many more records
    Counted(u64),
}

/// Tracks flow mode and pause state, and decides what the broker should be
/// allowed to fetch before each poll cycle.
///
/// Owned exclusively by the polling loop; callers mutate it only through
/// commands. Partition pauses are independent of global demand and of the
/// current assignment: pausing a partition that is not assigned is valid and
/// takes effect if the partition is ever assigned later.
#[derive(Debug)]
pub(crate) struct DemandController {
    demand: Demand,
    paused: HashSet<TopicPartition>,
}

impl DemandController {
    /// Starts in flowing mode with no partitions paused
    pub fn new() -> Self {
        Self {
            demand: Demand::Unbounded,
            paused: HashSet::new(),
        }
    }

    /// Requests `amount` additional records.
    ///
    /// Switches the stream into fetch mode; from flowing mode the budget is
    /// silently reset to `amount` rather than raising an error.
    pub fn fetch(&mut self, amount: u64) {
        self.demand = match self.demand {
            Demand::Counted(n) => Demand::Counted(n.saturating_add(amount)),
            Demand::Unbounded => Demand::Counted(amount),
        };
    }

    /// Halts delivery without discarding buffered records
    pub fn pause(&mut self) {
        self.demand = Demand::Counted(0);
    }

    /// Restores flowing mode
    pub fn resume(&mut self) {
        self.demand = Demand::Unbounded;
    }

    /// Current demand: `u64::MAX` when flowing, else the remaining budget
    pub fn demand(&self) -> u64 {
        match self.demand {
            Demand::Unbounded => u64::MAX,
            Demand::Counted(n) => n,
        }
    }

    /// Claims one delivery slot, decrementing a counted budget.
    ///
    /// Returns false when the budget is exhausted and delivery must halt.
    pub fn take(&mut self) -> bool {
        match self.demand {
            Demand::Unbounded => true,
            Demand::Counted(0) => false,
            Demand::Counted(n) => {
                self.demand = Demand::Counted(n - 1);
                true
            }
        }
    }

    /// Adds partitions to the caller-paused set. Idempotent.
    pub fn pause_partitions(&mut self, partitions: &HashSet<TopicPartition>) {
        self.paused.extend(partitions.iter().cloned());
    }

    /// Removes partitions from the caller-paused set. Idempotent.
    pub fn resume_partitions(&mut self, partitions: &HashSet<TopicPartition>) {
        for tp in partitions {
            self.paused.remove(tp);
        }
    }

    /// The set of partitions explicitly paused by the caller
    pub fn paused(&self) -> &HashSet<TopicPartition> {
        &self.paused
    }

    /// The assigned partitions that must be paused at the broker before the
    /// next poll: the whole assignment when demand is exhausted, otherwise
    /// the caller-paused partitions that are currently assigned. Global and
    /// partition pause compose by union.
    pub fn effective_pause(&self, assignment: &HashSet<TopicPartition>) -> HashSet<TopicPartition> {
        if self.demand() == 0 {
            assignment.clone()
        } else {
            assignment.intersection(&self.paused).cloned().collect()
        }
    }
}
