use serde::{Deserialize, Serialize};

use brawl::net::sequence_greater_than;

/// How a non-physical field is reconciled against the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcilePolicy {
    /// Local conjecture may lower the value at once. Until the server has
    /// acknowledged the command that made the conjecture, server values
    /// can only lower it further; afterwards the server value is adopted.
    MonotonicDecreaseUntilAck,
    /// No speculative path: the server value is always adopted.
    TrustServer,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeculativeField<T> {
    value: T,
    confirmed: T,
    pending_since: Option<u32>,
    policy: ReconcilePolicy,
}

impl<T: Copy + PartialOrd> SpeculativeField<T> {
    pub fn new(initial: T, policy: ReconcilePolicy) -> Self {
        Self {
            value: initial,
            confirmed: initial,
            pending_since: None,
            policy,
        }
    }

    pub fn value(&self) -> T {
        self.value
    }

    pub fn confirmed(&self) -> T {
        self.confirmed
    }

    pub fn policy(&self) -> ReconcilePolicy {
        self.policy
    }

    pub fn is_pending(&self) -> bool {
        self.pending_since.is_some()
    }

    /// Records a local guess made while applying command `sequence`.
    /// Returns whether the displayed value changed.
    pub fn conjecture(&mut self, value: T, sequence: u32) -> bool {
        match self.policy {
            ReconcilePolicy::TrustServer => false,
            ReconcilePolicy::MonotonicDecreaseUntilAck => {
                if value < self.value {
                    self.value = value;
                    self.pending_since = Some(sequence);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Applies a server value that reflects commands up to
    /// `acked_sequence`.
    pub fn confirm(&mut self, server_value: T, acked_sequence: u32) {
        self.confirmed = server_value;
        match self.policy {
            ReconcilePolicy::TrustServer => self.value = server_value,
            ReconcilePolicy::MonotonicDecreaseUntilAck => match self.pending_since {
                Some(since) if sequence_greater_than(since, acked_sequence) => {
                    if server_value < self.value {
                        self.value = server_value;
                    }
                }
                _ => {
                    self.pending_since = None;
                    self.value = server_value;
                }
            },
        }
    }

    pub fn reset(&mut self, value: T) {
        self.value = value;
        self.confirmed = value;
        self.pending_since = None;
    }
}
