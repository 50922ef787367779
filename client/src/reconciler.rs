//! Server reconciliation for the owning client.
//!
//! Every authoritative state the server sends carries the sequence number of
//! the input that produced it. The reconciler compares it with what the client
//! predicted for that same input and, when the two disagree by more than the
//! threshold, snaps the live entity to the server state and replays the inputs
//! the server has not processed yet.
//!
//! Acknowledgements arrive over an unordered, lossy channel. Anything at or
//! below the last acknowledged sequence is dropped before it can touch state.

use crate::history::{HistoryBuffer, HistoryEntry};
use log::{debug, info, trace};
use shared::{EntityState, InputSample};

/// What a single authoritative state did to the client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconcileOutcome {
    /// Older than or equal to the acknowledgement watermark; ignored.
    Stale,
    /// No prediction recorded for this sequence; server state taken as is.
    HardSnap,
    /// Prediction within threshold; nothing changed.
    Accepted { error: f32 },
    /// Prediction off by more than the threshold; snapped and replayed.
    Corrected { error: f32, replayed: usize },
}

impl ReconcileOutcome {
    /// True if the live entity was overwritten.
    pub fn moved_entity(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::HardSnap | ReconcileOutcome::Corrected { .. }
        )
    }
}

/// Running counts of reconciliation outcomes, for debug output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcilerStats {
    pub accepted: u64,
    pub corrected: u64,
    pub hard_snaps: u64,
    pub stale: u64,
    pub replayed_inputs: u64,
}

/// Holds the acknowledgement watermark and the correction threshold.
#[derive(Debug, Clone)]
pub struct Reconciler {
    threshold: f32,
    last_acknowledged: Option<u32>,
    stats: ReconcilerStats,
}

impl Reconciler {
    /// Creates a reconciler with no acknowledgement yet. Prediction errors
    /// up to and including `threshold` are accepted.
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            last_acknowledged: None,
            stats: ReconcilerStats::default(),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Highest sequence reconciled so far.
    pub fn last_acknowledged(&self) -> Option<u32> {
        self.last_acknowledged
    }

    pub fn stats(&self) -> ReconcilerStats {
        self.stats
    }

    /// True if `sequence` is at or below the watermark.
    pub fn is_stale(&self, sequence: u32) -> bool {
        self.last_acknowledged
            .is_some_and(|acknowledged| sequence <= acknowledged)
    }

    /// Reconciles the live `entity` against one authoritative state.
    ///
    /// `replay` re-applies a buffered input to a state; the caller supplies it
    /// so replay runs with the movement mode active right now.
    pub fn reconcile<F>(
        &mut self,
        server: &EntityState,
        entity: &mut EntityState,
        history: &mut HistoryBuffer,
        mut replay: F,
    ) -> ReconcileOutcome
    where
        F: FnMut(&EntityState, &InputSample) -> EntityState,
    {
        let ack = server.sequence_number;
        if self.is_stale(ack) {
            trace!("Dropping stale ack {} (watermark {:?})", ack, self.last_acknowledged);
            self.stats.stale += 1;
            return ReconcileOutcome::Stale;
        }

        let outcome = match history.find_state_by_sequence(ack) {
            None => {
                info!(
                    "No prediction recorded for ack {} (history {:?}..={:?}), accepting server state",
                    ack,
                    history.oldest_sequence(),
                    history.newest_sequence()
                );
                entity.overwrite_kinematics(server);
                self.stats.hard_snaps += 1;
                ReconcileOutcome::HardSnap
            }
            Some(predicted) => {
                let error = predicted.distance_to(server);

                let outcome = if error <= self.threshold {
                    self.stats.accepted += 1;
                    ReconcileOutcome::Accepted { error }
                } else {
                    debug!("Reconciling ack {}: error = {:.3}", ack, error);
                    entity.overwrite_kinematics(server);

                    let pending = history.inputs_after(ack);
                    for input in &pending {
                        *entity = replay(&*entity, input);
                        history.overwrite(HistoryEntry::new(*input, *entity));
                    }

                    self.stats.corrected += 1;
                    self.stats.replayed_inputs += pending.len() as u64;
                    ReconcileOutcome::Corrected {
                        error,
                        replayed: pending.len(),
                    }
                };

                history.evict_up_to(ack);
                outcome
            }
        };

        self.last_acknowledged = Some(ack);
        outcome
    }

    /// Forgets the watermark and counters, for a respawned entity.
    pub fn reset(&mut self) {
        self.last_acknowledged = None;
        self.stats = ReconcilerStats::default();
    }
}
