//! Remote mutation payloads.
//!
//! Position updates are grouped per gesture into a [`MutationBatch`]. Each
//! entry doubles as the optimistic value handed to the remote source, since
//! the store already holds exactly that value when the batch is issued.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::{BoardId, CardId, ColumnId};

/// Identifier of one gesture's mutation batch (session-local, monotonic).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPosition {
    pub id: ColumnId,
    pub position: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPosition {
    pub id: CardId,
    pub position: u32,
    pub column_id: ColumnId,
}

/// One remote position update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PositionMutation {
    Column(ColumnPosition),
    Card(CardPosition),
}

impl PositionMutation {
    pub fn operation(&self) -> &'static str {
        match self {
            PositionMutation::Column(_) => "update_column_position",
            PositionMutation::Card(_) => "update_card_position",
        }
    }
}

impl fmt::Display for PositionMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionMutation::Column(c) => write!(f, "{} -> {}", c.id, c.position),
            PositionMutation::Card(c) => write!(f, "{} -> {}@{}", c.id, c.column_id, c.position),
        }
    }
}

/// Position updates implied by one completed gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationBatch {
    pub id: BatchId,
    pub board_id: BoardId,
    pub mutations: Vec<PositionMutation>,
}

impl MutationBatch {
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn card_positions(&self) -> impl Iterator<Item = &CardPosition> {
        self.mutations.iter().filter_map(|m| match m {
            PositionMutation::Card(c) => Some(c),
            PositionMutation::Column(_) => None,
        })
    }

    pub fn column_positions(&self) -> impl Iterator<Item = &ColumnPosition> {
        self.mutations.iter().filter_map(|m| match m {
            PositionMutation::Column(c) => Some(c),
            PositionMutation::Card(_) => None,
        })
    }
}

/// Request to create a column at the end of a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewColumn {
    pub board_id: BoardId,
    pub title: String,
    pub position: u32,
}

/// Request to create a card at the end of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCard {
    pub column_id: ColumnId,
    pub title: String,
    pub position: u32,
}
