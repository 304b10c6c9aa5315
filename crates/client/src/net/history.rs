use std::collections::VecDeque;

use brawl::net::sequence_greater_than;
use brawl::{Command, DegradedReason, NetcodeError, PredictedState};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryEntry {
    pub command: Command,
    pub resulting_state: PredictedState,
    pub tick: u32,
}

impl HistoryEntry {
    pub fn sequence(&self) -> u32 {
        self.command.sequence
    }
}

/// Commands the server has not yet acknowledged, each paired with the
/// state prediction produced when it was applied.
#[derive(Debug)]
pub struct CommandHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
    overflowed: bool,
}

impl CommandHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            overflowed: false,
        }
    }

    /// Appends an entry. When the history is full the oldest entry is
    /// evicted and `ConnectivityDegraded` is returned: the server has gone
    /// a whole window without acknowledging anything.
    pub fn record(
        &mut self,
        command: Command,
        resulting_state: PredictedState,
    ) -> Result<(), NetcodeError> {
        if let Some(last) = self.entries.back() {
            debug_assert!(
                sequence_greater_than(command.sequence, last.command.sequence),
                "commands must be recorded in sequence order"
            );
        }

        let mut result = Ok(());
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
            if !self.overflowed {
                self.overflowed = true;
                result = Err(NetcodeError::ConnectivityDegraded(
                    DegradedReason::HistoryOverflow {
                        capacity: self.capacity,
                    },
                ));
            }
        }

        self.entries.push_back(HistoryEntry {
            command,
            resulting_state,
            tick: command.tick,
        });
        result
    }

    /// Drops every entry with a sequence at or below `acked_sequence`.
    pub fn prune(&mut self, acked_sequence: u32) -> usize {
        let before = self.entries.len();
        while self
            .entries
            .front()
            .is_some_and(|e| !sequence_greater_than(e.sequence(), acked_sequence))
        {
            self.entries.pop_front();
        }
        if self.entries.len() < self.capacity {
            self.overflowed = false;
        }
        before - self.entries.len()
    }

    pub fn find(&self, sequence: u32) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.sequence() == sequence)
    }

    /// Removes and returns all retained commands in sequence order.
    pub fn take_commands(&mut self) -> Vec<Command> {
        self.entries.drain(..).map(|e| e.command).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.overflowed = false;
    }
}
