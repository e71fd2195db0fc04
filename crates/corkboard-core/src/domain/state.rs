//! State - reconciler の状態遷移
//!
//! # 状態遷移
//! - Uninitialized → Synced: 最初のスナップショットを受理
//! - Synced → Synced: ゲートが閉じている間のスナップショット（push wins）
//! - Synced / Mutating → GestureInFlight: ドラッグ開始（ゲートを開く）
//! - GestureInFlight → Synced / Mutating: ドラッグ終了（ゲートを閉じる）
//! - Synced / Mutating → Mutating: 位置更新バッチを発行
//! - Mutating → Synced: 全バッチが settle
//! - * → Uninitialized: ボード切り替え
//!
//! All transitions go through [`ReconcilerState::next`]; the Drag Gate is not
//! a separate flag but a projection of the current state.

/// Reconciler state.
///
/// `pending_batches` counts mutation batches issued by earlier gestures that
/// have not settled yet. A new gesture may start while they are in flight, so
/// the count is carried through `GestureInFlight` as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcilerState {
    /// No board loaded yet.
    #[default]
    Uninitialized,

    /// Store reflects the latest accepted snapshot, nothing in flight.
    Synced,

    /// Drag Gate open. Snapshots are discarded.
    GestureInFlight { pending_batches: usize },

    /// Mutation batches issued, acknowledgements pending.
    Mutating { pending_batches: usize },
}

/// Events that move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    SnapshotAccepted,
    GestureStarted,
    GestureEnded,
    BatchIssued,
    BatchSettled,
    BoardChanged,
}

/// Drag Gate: open for the duration of a user gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragGate {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("transition {transition:?} is not allowed from {state:?}")]
pub struct InvalidTransition {
    pub state: ReconcilerState,
    pub transition: Transition,
}

impl ReconcilerState {
    /// The single state-transition function.
    pub fn next(self, transition: Transition) -> Result<Self, InvalidTransition> {
        use ReconcilerState::*;
        use Transition::*;

        let next = match (self, transition) {
            (_, BoardChanged) => Uninitialized,

            (Uninitialized | Synced, SnapshotAccepted) => Synced,
            (Mutating { .. }, SnapshotAccepted) => self,

            (Synced, GestureStarted) => GestureInFlight { pending_batches: 0 },
            (Mutating { pending_batches }, GestureStarted) => GestureInFlight { pending_batches },

            (GestureInFlight { pending_batches: 0 }, GestureEnded) => Synced,
            (GestureInFlight { pending_batches }, GestureEnded) => Mutating { pending_batches },
            // gate already closed: nothing to release
            (Synced | Mutating { .. }, GestureEnded) => self,

            (Synced, BatchIssued) => Mutating { pending_batches: 1 },
            (Mutating { pending_batches }, BatchIssued) => Mutating {
                pending_batches: pending_batches + 1,
            },

            (Mutating { pending_batches: 1 }, BatchSettled) => Synced,
            (Mutating { pending_batches }, BatchSettled) if pending_batches > 1 => Mutating {
                pending_batches: pending_batches - 1,
            },
            (GestureInFlight { pending_batches }, BatchSettled) if pending_batches > 0 => {
                GestureInFlight {
                    pending_batches: pending_batches - 1,
                }
            }

            _ => return Err(InvalidTransition { state: self, transition }),
        };
        Ok(next)
    }

    pub fn gate(&self) -> DragGate {
        match self {
            ReconcilerState::GestureInFlight { .. } => DragGate::Open,
            _ => DragGate::Closed,
        }
    }

    pub fn is_gesture_open(&self) -> bool {
        self.gate() == DragGate::Open
    }

    pub fn is_initialized(&self) -> bool {
        !matches!(self, ReconcilerState::Uninitialized)
    }

    pub fn pending_batches(&self) -> usize {
        match self {
            ReconcilerState::GestureInFlight { pending_batches }
            | ReconcilerState::Mutating { pending_batches } => *pending_batches,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::ReconcilerState::*;
    use super::Transition::*;
    use rstest::rstest;

    #[rstest]
    #[case::first_snapshot(Uninitialized, SnapshotAccepted, Synced)]
    #[case::push_wins(Synced, SnapshotAccepted, Synced)]
    #[case::push_while_mutating(Mutating { pending_batches: 2 }, SnapshotAccepted, Mutating { pending_batches: 2 })]
    #[case::gesture_start(Synced, GestureStarted, GestureInFlight { pending_batches: 0 })]
    #[case::gesture_over_pending(Mutating { pending_batches: 1 }, GestureStarted, GestureInFlight { pending_batches: 1 })]
    #[case::gesture_end_idle(GestureInFlight { pending_batches: 0 }, GestureEnded, Synced)]
    #[case::gesture_end_pending(GestureInFlight { pending_batches: 2 }, GestureEnded, Mutating { pending_batches: 2 })]
    #[case::gesture_end_without_start(Synced, GestureEnded, Synced)]
    #[case::issue_first(Synced, BatchIssued, Mutating { pending_batches: 1 })]
    #[case::issue_more(Mutating { pending_batches: 1 }, BatchIssued, Mutating { pending_batches: 2 })]
    #[case::last_settles(Mutating { pending_batches: 1 }, BatchSettled, Synced)]
    #[case::one_of_many_settles(Mutating { pending_batches: 3 }, BatchSettled, Mutating { pending_batches: 2 })]
    #[case::settles_mid_gesture(GestureInFlight { pending_batches: 1 }, BatchSettled, GestureInFlight { pending_batches: 0 })]
    #[case::board_switch(GestureInFlight { pending_batches: 4 }, BoardChanged, Uninitialized)]
    fn allowed_transitions(
        #[case] from: ReconcilerState,
        #[case] transition: Transition,
        #[case] expected: ReconcilerState,
    ) {
        assert_eq!(from.next(transition), Ok(expected));
    }

    #[rstest]
    #[case::snapshot_mid_gesture(GestureInFlight { pending_batches: 0 }, SnapshotAccepted)]
    #[case::double_start(GestureInFlight { pending_batches: 0 }, GestureStarted)]
    #[case::start_without_board(Uninitialized, GestureStarted)]
    #[case::end_without_board(Uninitialized, GestureEnded)]
    #[case::issue_mid_gesture(GestureInFlight { pending_batches: 0 }, BatchIssued)]
    #[case::settle_nothing(Synced, BatchSettled)]
    #[case::settle_nothing_mid_gesture(GestureInFlight { pending_batches: 0 }, BatchSettled)]
    fn rejected_transitions(#[case] from: ReconcilerState, #[case] transition: Transition) {
        assert_eq!(
            from.next(transition),
            Err(InvalidTransition { state: from, transition })
        );
    }

    #[test]
    fn gate_is_open_only_during_a_gesture() {
        assert_eq!(Synced.gate(), DragGate::Closed);
        assert_eq!(Mutating { pending_batches: 1 }.gate(), DragGate::Closed);
        assert_eq!(GestureInFlight { pending_batches: 1 }.gate(), DragGate::Open);
        assert!(!Uninitialized.is_gesture_open());
    }
}
