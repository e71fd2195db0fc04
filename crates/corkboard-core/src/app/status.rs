//! Status - セッションの同期状態
//!
//! `BoardSession` が watch チャネルで公開する、シリアライズ可能なビューです。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{BoardId, ReconcilerState};

/// Serializable view of [`ReconcilerState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseView {
    #[default]
    Uninitialized,
    Synced,
    GestureInFlight,
    Mutating,
}

impl From<ReconcilerState> for PhaseView {
    fn from(state: ReconcilerState) -> Self {
        match state {
            ReconcilerState::Uninitialized => PhaseView::Uninitialized,
            ReconcilerState::Synced => PhaseView::Synced,
            ReconcilerState::GestureInFlight { .. } => PhaseView::GestureInFlight,
            ReconcilerState::Mutating { .. } => PhaseView::Mutating,
        }
    }
}

/// Sync status of one board session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub board_id: Option<BoardId>,
    pub phase: PhaseView,

    /// Mutation batches issued but not yet settled.
    pub pending_batches: usize,

    pub snapshots_applied: u64,
    pub snapshots_discarded: u64,

    /// Individual position mutations the remote source rejected.
    pub mutation_failures: u64,

    pub last_snapshot_at: Option<DateTime<Utc>>,

    /// Last user-visible error (fetch failure, rejected create/delete).
    pub last_error: Option<String>,
}

impl SyncStatus {
    pub fn is_settled(&self) -> bool {
        self.phase == PhaseView::Synced && self.pending_batches == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_view_drops_pending_counts() {
        assert_eq!(
            PhaseView::from(ReconcilerState::Mutating { pending_batches: 3 }),
            PhaseView::Mutating
        );
        assert_eq!(
            PhaseView::from(ReconcilerState::GestureInFlight { pending_batches: 0 }),
            PhaseView::GestureInFlight
        );
    }

    #[test]
    fn serializes_phase_in_snake_case() {
        let status = SyncStatus {
            phase: PhaseView::GestureInFlight,
            ..SyncStatus::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["phase"], "gesture_in_flight");
        assert!(!status.is_settled());
    }
}
