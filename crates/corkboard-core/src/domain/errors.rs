//! Errors - エラー型と分類
//!
//! | variant | 扱い |
//! |---|---|
//! | `NotFound` | view に表示、リトライなし |
//! | `MutationFailed` | reorder 中はログのみ、CRUD は呼び出し元へ返す |
//! | `InvalidMove` | 前提条件違反（gesture 層のバグ） |

use super::ids::{BoardId, CardId, ColumnId};
use super::sequencer::SequenceError;
use super::state::InvalidTransition;
use crate::ports::SourceError;

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("board not found: {0}")]
    NotFound(BoardId),

    #[error("{operation} failed: {reason}")]
    MutationFailed {
        operation: &'static str,
        reason: String,
    },

    #[error("invalid move: {0}")]
    InvalidMove(#[from] SequenceError),

    #[error("unknown column: {0}")]
    UnknownColumn(ColumnId),

    #[error("unknown card: {0}")]
    UnknownCard(CardId),

    #[error("no board is open")]
    NoActiveBoard,

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("board session is closed")]
    SessionClosed,
}

impl BoardError {
    /// Wraps a remote failure of the named operation.
    pub fn from_source(operation: &'static str, err: SourceError) -> Self {
        match err {
            SourceError::NotFound(board_id) => BoardError::NotFound(board_id),
            other => BoardError::MutationFailed {
                operation,
                reason: other.to_string(),
            },
        }
    }

    /// Whether the view should tell the user about this error.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            BoardError::NotFound(_) | BoardError::MutationFailed { .. } | BoardError::SessionClosed
        )
    }
}
