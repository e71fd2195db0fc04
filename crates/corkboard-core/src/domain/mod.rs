//! Domain model (IDs, board, moves, sequencer, state, intents, errors).
//!
//! I/O を一切持たない層です。ports / app から利用されます。

pub mod board;
pub mod errors;
pub mod ids;
pub mod intents;
pub mod moves;
pub mod mutation;
pub mod sequencer;
pub mod state;

pub use self::board::{Board, Card, Column, InvariantViolation};
pub use self::errors::BoardError;
pub use self::ids::{BoardId, CardId, ColumnId, IdParseError};
pub use self::intents::{DiscardReason, Handled, Intent};
pub use self::moves::{CardSlot, GestureMove};
pub use self::mutation::{
    BatchId, CardPosition, ColumnPosition, MutationBatch, NewCard, NewColumn, PositionMutation,
};
pub use self::sequencer::{Positioned, SequenceError};
pub use self::state::{DragGate, InvalidTransition, ReconcilerState, Transition};
