//! Intents - reconciler への入力メッセージ
//!
//! Gesture callbacks, snapshot arrivals and remote acknowledgements are all
//! turned into an [`Intent`] and fed to one reconciliation function, which is
//! the only writer of the board store.

use super::board::{Board, Card, Column};
use super::ids::{BoardId, CardId, ColumnId};
use super::moves::GestureMove;
use super::mutation::{BatchId, MutationBatch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Start showing a board; any previous board is dropped.
    OpenBoard(BoardId),

    /// Stop showing the current board.
    CloseBoard,

    /// One-shot fetch response.
    Initialize(Board),

    /// Subscription push.
    ApplySnapshot(Board),

    /// Drag picked up.
    BeginGesture,

    /// Drag released. `None` when dropped outside any container.
    CompleteGesture(Option<GestureMove>),

    /// Every mutation of a batch has settled (success or failure).
    BatchSettled(BatchId),

    /// Remote create acknowledged.
    ColumnCreated { board_id: BoardId, column: Column },
    CardCreated { board_id: BoardId, card: Card },

    /// Remote delete acknowledged.
    ColumnDeleted { board_id: BoardId, column_id: ColumnId },
    CardDeleted { board_id: BoardId, card_id: CardId },
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::OpenBoard(_) => "open_board",
            Intent::CloseBoard => "close_board",
            Intent::Initialize(_) => "initialize",
            Intent::ApplySnapshot(_) => "apply_snapshot",
            Intent::BeginGesture => "begin_gesture",
            Intent::CompleteGesture(_) => "complete_gesture",
            Intent::BatchSettled(_) => "batch_settled",
            Intent::ColumnCreated { .. } => "column_created",
            Intent::CardCreated { .. } => "card_created",
            Intent::ColumnDeleted { .. } => "column_deleted",
            Intent::CardDeleted { .. } => "card_deleted",
        }
    }
}

/// Why an intent left the store untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Drag Gate open.
    GestureInFlight,
    /// Snapshot or acknowledgement for a board other than the active one.
    ForeignBoard,
    /// No board is open.
    NoActiveBoard,
    /// Fetch response after the board was already populated.
    AlreadyInitialized,
    /// Settlement of a batch this reconciler does not track.
    UnknownBatch,
}

/// What the reconciler did with an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Store and/or state changed; nothing to send.
    Applied,
    /// Store changed optimistically; the batch must be sent to the remote source.
    Issued(MutationBatch),
    /// Intent ignored.
    Discarded(DiscardReason),
    /// Accepted, but there was nothing to change.
    Unchanged,
}

impl Handled {
    pub fn batch(self) -> Option<MutationBatch> {
        match self {
            Handled::Issued(batch) => Some(batch),
            _ => None,
        }
    }
}
