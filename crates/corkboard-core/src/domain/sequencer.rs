//! Position Sequencer: pure reorder transforms over positioned sequences.
//!
//! Every function here takes owned sequences and hands back new ones; nothing
//! touches the store. The reconciler decides what to do with the result.
//!
//! After any transform, each element's `position` equals its index.

use super::board::{Card, Column};
use super::ids::ColumnId;

/// An element with an integer position inside an ordered sequence.
pub trait Positioned {
    fn position(&self) -> u32;
    fn set_position(&mut self, position: u32);
}

impl Positioned for Column {
    fn position(&self) -> u32 {
        self.position
    }

    fn set_position(&mut self, position: u32) {
        self.position = position;
    }
}

impl Positioned for Card {
    fn position(&self) -> u32 {
        self.position
    }

    fn set_position(&mut self, position: u32) {
        self.position = position;
    }
}

/// Index given to the sequencer lies outside the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SequenceError {
    #[error("source index {index} out of range (len {len})")]
    SourceOutOfRange { index: usize, len: usize },

    #[error("destination index {index} out of range (max {max})")]
    DestinationOutOfRange { index: usize, max: usize },
}

/// Index to position. Sequences never get near `u32::MAX` elements.
pub fn position_of(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

/// Assigns `position = index` to every element.
pub fn restamp<T: Positioned>(items: &mut [T]) {
    for (index, item) in items.iter_mut().enumerate() {
        item.set_position(position_of(index));
    }
}

/// Moves the element at `from` to `to` within one sequence, then restamps.
///
/// `from == to` leaves the order alone but still restamps, so applying the
/// same move twice yields the same positions.
pub fn reorder<T: Positioned>(mut items: Vec<T>, from: usize, to: usize) -> Result<Vec<T>, SequenceError> {
    let len = items.len();
    if from >= len {
        return Err(SequenceError::SourceOutOfRange { index: from, len });
    }
    if to >= len {
        return Err(SequenceError::DestinationOutOfRange {
            index: to,
            max: len - 1,
        });
    }

    let moved = items.remove(from);
    items.insert(to, moved);
    restamp(&mut items);
    Ok(items)
}

/// Moves a card from one column's sequence into another's.
///
/// Both resulting sequences are restamped and the moved card's back-reference
/// is pointed at `destination_column`. `to` may equal the destination length
/// (drop at the end).
pub fn transfer(
    mut source: Vec<Card>,
    mut destination: Vec<Card>,
    from: usize,
    to: usize,
    destination_column: ColumnId,
) -> Result<(Vec<Card>, Vec<Card>), SequenceError> {
    if from >= source.len() {
        return Err(SequenceError::SourceOutOfRange {
            index: from,
            len: source.len(),
        });
    }
    if to > destination.len() {
        return Err(SequenceError::DestinationOutOfRange {
            index: to,
            max: destination.len(),
        });
    }

    let mut moved = source.remove(from);
    moved.column_id = destination_column;
    destination.insert(to, moved);

    restamp(&mut source);
    restamp(&mut destination);
    Ok((source, destination))
}
