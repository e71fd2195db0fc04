//! Board model: the ordered columns and cards of one board.
//!
//! Shapes mirror what the remote source delivers: columns and cards carry an
//! explicit integer `position`, and a card keeps a `column_id` back-reference.
//! The back-reference is not an ownership edge; the column whose `cards`
//! sequence holds a card is its real container.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::ids::{BoardId, CardId, ColumnId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub title: String,
    pub position: u32,
    pub column_id: ColumnId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub title: String,
    pub position: u32,
    #[serde(default)]
    pub cards: Vec<Card>,
}

impl Column {
    pub fn card_index(&self, card_id: CardId) -> Option<usize> {
        self.cards.iter().position(|c| c.id == card_id)
    }

    /// Next free position for an appended card (`max + 1`, or 0 when empty).
    pub fn next_card_position(&self) -> u32 {
        next_position(self.cards.iter().map(|c| c.position))
    }
}

/// A complete board snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub id: BoardId,
    pub title: String,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl Board {
    pub fn new(id: BoardId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            columns: Vec::new(),
        }
    }

    /// Normalises a snapshot into a safe local copy.
    ///
    /// Columns and each column's cards are put in ascending `position` order
    /// (stable, so ties keep delivery order). Positions are not renumbered.
    pub fn sanitized(mut self) -> Self {
        self.columns.sort_by_key(|c| c.position);
        for column in &mut self.columns {
            column.cards.sort_by_key(|c| c.position);
        }
        self
    }

    pub fn column(&self, id: ColumnId) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    pub fn column_mut(&mut self, id: ColumnId) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.id == id)
    }

    pub fn column_index(&self, id: ColumnId) -> Option<usize> {
        self.columns.iter().position(|c| c.id == id)
    }

    /// Finds a card, returning `(column index, card index)`.
    pub fn locate_card(&self, id: CardId) -> Option<(usize, usize)> {
        self.columns
            .iter()
            .enumerate()
            .find_map(|(ci, col)| col.card_index(id).map(|k| (ci, k)))
    }

    pub fn card(&self, id: CardId) -> Option<&Card> {
        self.locate_card(id)
            .map(|(ci, k)| &self.columns[ci].cards[k])
    }

    pub fn card_count(&self) -> usize {
        self.columns.iter().map(|c| c.cards.len()).sum()
    }

    /// Next free position for an appended column.
    pub fn next_column_position(&self) -> u32 {
        next_position(self.columns.iter().map(|c| c.position))
    }

    /// Checks the ordering invariants of a fully reconciled board:
    /// dense zero-based column positions, dense zero-based card positions per
    /// column, matching `column_id` back-references, and each card held by
    /// exactly one column.
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        if !is_dense(self.columns.iter().map(|c| c.position)) {
            return Err(InvariantViolation::ColumnPositions {
                positions: self.columns.iter().map(|c| c.position).collect(),
            });
        }

        let mut owner: HashMap<CardId, ColumnId> = HashMap::new();
        for column in &self.columns {
            if !is_dense(column.cards.iter().map(|c| c.position)) {
                return Err(InvariantViolation::CardPositions {
                    column_id: column.id,
                    positions: column.cards.iter().map(|c| c.position).collect(),
                });
            }
            for card in &column.cards {
                if card.column_id != column.id {
                    return Err(InvariantViolation::BackReference {
                        card_id: card.id,
                        expected: column.id,
                        found: card.column_id,
                    });
                }
                if owner.insert(card.id, column.id).is_some() {
                    return Err(InvariantViolation::DuplicateCard { card_id: card.id });
                }
            }
        }
        Ok(())
    }
}

/// A broken ordering invariant, reported by [`Board::verify`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("column positions {positions:?} are not 0..n")]
    ColumnPositions { positions: Vec<u32> },

    #[error("card positions {positions:?} in {column_id} are not 0..m")]
    CardPositions {
        column_id: ColumnId,
        positions: Vec<u32>,
    },

    #[error("{card_id} is held by {expected} but points at {found}")]
    BackReference {
        card_id: CardId,
        expected: ColumnId,
        found: ColumnId,
    },

    #[error("{card_id} appears in more than one column")]
    DuplicateCard { card_id: CardId },
}

fn is_dense(positions: impl Iterator<Item = u32>) -> bool {
    let mut count = 0usize;
    let set: BTreeSet<u32> = positions.inspect(|_| count += 1).collect();
    set.len() == count && set.iter().copied().eq((0u32..).take(count))
}

fn next_position(positions: impl Iterator<Item = u32>) -> u32 {
    positions.max().map_or(0, |max| max.saturating_add(1))
}
