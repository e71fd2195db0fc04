//! Gesture moves: what the drag layer reports when an item is dropped.

use serde::{Deserialize, Serialize};

use super::ids::{ColumnId, IdParseError};

/// One end of a card move: a card container plus an index inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSlot {
    pub column_id: ColumnId,
    pub index: usize,
}

impl CardSlot {
    pub fn new(column_id: ColumnId, index: usize) -> Self {
        Self { column_id, index }
    }

    /// Builds a slot from a droppable container name such as `column-<id>`.
    pub fn from_droppable(droppable_id: &str, index: usize) -> Result<Self, IdParseError> {
        Ok(Self::new(droppable_id.parse()?, index))
    }
}

/// A completed drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GestureMove {
    /// A column moved along the board.
    Column { from: usize, to: usize },

    /// A card moved within one column or across two.
    Card { from: CardSlot, to: CardSlot },
}

impl GestureMove {
    pub fn column(from: usize, to: usize) -> Self {
        Self::Column { from, to }
    }

    pub fn card(from: CardSlot, to: CardSlot) -> Self {
        Self::Card { from, to }
    }

    pub fn is_cross_column(&self) -> bool {
        matches!(self, Self::Card { from, to } if from.column_id != to.column_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn droppable_id_is_parsed() {
        let column_id = ColumnId::from_ulid(Ulid::new());
        let slot = CardSlot::from_droppable(&format!("column-{}", column_id.as_ulid()), 2).unwrap();
        assert_eq!(slot, CardSlot::new(column_id, 2));
    }

    #[test]
    fn droppable_id_with_other_prefix_fails() {
        assert!(CardSlot::from_droppable("board", 0).is_err());
    }

    #[test]
    fn cross_column_detection() {
        let a = ColumnId::from_ulid(Ulid::new());
        let b = ColumnId::from_ulid(Ulid::new());

        assert!(GestureMove::card(CardSlot::new(a, 0), CardSlot::new(b, 0)).is_cross_column());
        assert!(!GestureMove::card(CardSlot::new(a, 0), CardSlot::new(a, 1)).is_cross_column());
        assert!(!GestureMove::column(0, 1).is_cross_column());
    }
}
