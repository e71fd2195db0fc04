//! Reconciler - snapshot 取り込みとローカル変更の調停
//!
//! Every write to the [`BoardStore`] goes through [`Reconciler::handle`]. The
//! reconciler performs no I/O: it returns the mutation batch a completed
//! gesture implies, and the session sends it.
//!
//! # ルール
//! - ゲートが閉じている間、snapshot は全置換（push wins）
//! - ゲートが開いている間、snapshot は破棄（キューしない）
//! - ドラッグ終了時はまずゲートを閉じ、それから並べ替えを計算する
//!   （計算が失敗してもゲートは閉じたまま）

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::sequencer;
use crate::domain::{
    BatchId, Board, BoardError, BoardId, CardId, CardPosition, CardSlot, ColumnId, ColumnPosition,
    DiscardReason, GestureMove, Handled, Intent, MutationBatch, PositionMutation, ReconcilerState,
    Transition,
};
use crate::ports::{Clock, SystemClock};
use crate::store::BoardStore;

use super::status::{PhaseView, SyncStatus};

pub struct Reconciler {
    board_id: Option<BoardId>,
    state: ReconcilerState,
    store: BoardStore,
    in_flight: HashSet<BatchId>,
    next_batch: u64,
    clock: Arc<dyn Clock>,
    stats: Stats,
}

#[derive(Debug, Default, Clone)]
struct Stats {
    snapshots_applied: u64,
    snapshots_discarded: u64,
    last_snapshot_at: Option<DateTime<Utc>>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            board_id: None,
            state: ReconcilerState::Uninitialized,
            store: BoardStore::new(),
            in_flight: HashSet::new(),
            next_batch: 1,
            clock,
            stats: Stats::default(),
        }
    }

    pub fn board_id(&self) -> Option<BoardId> {
        self.board_id
    }

    pub fn state(&self) -> ReconcilerState {
        self.state
    }

    pub fn board(&self) -> Option<&Board> {
        self.store.board()
    }

    pub fn store(&self) -> &BoardStore {
        &self.store
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            board_id: self.board_id,
            phase: PhaseView::from(self.state),
            pending_batches: self.state.pending_batches(),
            snapshots_applied: self.stats.snapshots_applied,
            snapshots_discarded: self.stats.snapshots_discarded,
            last_snapshot_at: self.stats.last_snapshot_at,
            ..SyncStatus::default()
        }
    }

    /// The single reconciliation function.
    pub fn handle(&mut self, intent: Intent) -> Result<Handled, BoardError> {
        tracing::trace!(intent = intent.name(), state = ?self.state, "handle");
        match intent {
            Intent::OpenBoard(board_id) => Ok(self.open_board(board_id)),
            Intent::CloseBoard => Ok(self.close_board()),
            Intent::Initialize(board) => self.ingest(board, true),
            Intent::ApplySnapshot(board) => self.ingest(board, false),
            Intent::BeginGesture => self.begin_gesture(),
            Intent::CompleteGesture(movement) => self.complete_gesture(movement),
            Intent::BatchSettled(batch) => self.settle(batch),
            Intent::ColumnCreated { board_id, column } => self.for_board(board_id, |store| {
                store.append_column(column)
            }),
            Intent::CardCreated { board_id, card } => {
                self.for_board(board_id, |store| store.append_card(card))
            }
            Intent::ColumnDeleted { board_id, column_id } => self.for_board(board_id, |store| {
                Ok(store.remove_column(column_id)?.is_some())
            }),
            Intent::CardDeleted { board_id, card_id } => self.for_board(board_id, |store| {
                Ok(store.remove_card(card_id)?.is_some())
            }),
        }
    }

    fn transition(&mut self, transition: Transition) -> Result<(), BoardError> {
        self.state = self.state.next(transition)?;
        Ok(())
    }

    fn open_board(&mut self, board_id: BoardId) -> Handled {
        if self.board_id == Some(board_id) {
            return Handled::Unchanged;
        }
        self.reset();
        self.board_id = Some(board_id);
        tracing::debug!(board_id = %board_id, "board opened");
        Handled::Applied
    }

    fn close_board(&mut self) -> Handled {
        if self.board_id.is_none() {
            return Handled::Unchanged;
        }
        self.reset();
        Handled::Applied
    }

    fn reset(&mut self) {
        self.state = ReconcilerState::Uninitialized;
        self.board_id = None;
        self.store.clear();
        self.in_flight.clear();
        self.stats = Stats::default();
    }

    fn discard(&mut self, reason: DiscardReason) -> Result<Handled, BoardError> {
        self.stats.snapshots_discarded += 1;
        Ok(Handled::Discarded(reason))
    }

    /// Snapshot ingestion for both the fetch response and subscription pushes.
    fn ingest(&mut self, board: Board, initial: bool) -> Result<Handled, BoardError> {
        let Some(active) = self.board_id else {
            return self.discard(DiscardReason::NoActiveBoard);
        };
        if board.id != active {
            tracing::debug!(board_id = %board.id, active = %active, "snapshot for another board discarded");
            return self.discard(DiscardReason::ForeignBoard);
        }
        if self.state.is_gesture_open() {
            tracing::debug!(board_id = %active, "snapshot discarded: gesture in flight");
            return self.discard(DiscardReason::GestureInFlight);
        }
        if initial && self.state.is_initialized() {
            return self.discard(DiscardReason::AlreadyInitialized);
        }

        self.transition(Transition::SnapshotAccepted)?;
        self.store.replace(board);
        self.stats.snapshots_applied += 1;
        self.stats.last_snapshot_at = Some(self.clock.now());
        Ok(Handled::Applied)
    }

    fn begin_gesture(&mut self) -> Result<Handled, BoardError> {
        if self.board_id.is_none() || !self.store.is_loaded() {
            return Err(BoardError::NoActiveBoard);
        }
        self.transition(Transition::GestureStarted)?;
        Ok(Handled::Applied)
    }

    fn complete_gesture(&mut self, movement: Option<GestureMove>) -> Result<Handled, BoardError> {
        let Some(board_id) = self.board_id.filter(|_| self.state.is_initialized()) else {
            return Err(BoardError::NoActiveBoard);
        };
        // gate first: whatever happens below, the gesture is over
        self.transition(Transition::GestureEnded)?;

        let Some(movement) = movement else {
            return Ok(Handled::Unchanged);
        };
        let mutations = match movement {
            GestureMove::Column { from, to } => self.move_column(from, to)?,
            GestureMove::Card { from, to } if movement.is_cross_column() => {
                self.move_card_across(from, to)?
            }
            GestureMove::Card { from, to } => self.move_card_within(from, to)?,
        };
        if mutations.is_empty() {
            return Ok(Handled::Unchanged);
        }

        let batch = MutationBatch {
            id: BatchId(self.next_batch),
            board_id,
            mutations,
        };
        self.next_batch += 1;
        self.in_flight.insert(batch.id);
        self.transition(Transition::BatchIssued)?;
        tracing::debug!(board_id = %board_id, batch = %batch.id, mutations = batch.len(), "batch issued");
        Ok(Handled::Issued(batch))
    }

    fn move_column(&mut self, from: usize, to: usize) -> Result<Vec<PositionMutation>, BoardError> {
        let before = self.store.columns()?.to_vec();
        let previous: Vec<_> = before.iter().map(|c| (c.id, c.position)).collect();

        let after = sequencer::reorder(before, from, to)?;
        let mutations = after
            .iter()
            .filter(|col| !previous.contains(&(col.id, col.position)))
            .map(|col| {
                PositionMutation::Column(ColumnPosition {
                    id: col.id,
                    position: col.position,
                })
            })
            .collect();

        self.store.replace_columns(after)?;
        Ok(mutations)
    }

    fn move_card_within(&mut self, from: CardSlot, to: CardSlot) -> Result<Vec<PositionMutation>, BoardError> {
        let column_id = from.column_id;
        let before = self.store.cards(column_id)?.to_vec();
        let previous: Vec<_> = before.iter().map(|c| (c.id, c.position)).collect();

        let after = sequencer::reorder(before, from.index, to.index)?;
        let mutations = after
            .iter()
            .filter(|card| !previous.contains(&(card.id, card.position)))
            .map(|card| card_mutation(card.id, card.position, column_id))
            .collect();

        self.store.replace_cards(column_id, after)?;
        Ok(mutations)
    }

    /// Cross-column move: every card of both columns gets a mutation, since
    /// every index in both sequences may have shifted.
    fn move_card_across(&mut self, from: CardSlot, to: CardSlot) -> Result<Vec<PositionMutation>, BoardError> {
        let source = self.store.cards(from.column_id)?.to_vec();
        let destination = self.store.cards(to.column_id)?.to_vec();

        let (source, destination) =
            sequencer::transfer(source, destination, from.index, to.index, to.column_id)?;

        let mutations = source
            .iter()
            .map(|c| card_mutation(c.id, c.position, from.column_id))
            .chain(
                destination
                    .iter()
                    .map(|c| card_mutation(c.id, c.position, to.column_id)),
            )
            .collect();

        self.store.replace_cards(from.column_id, source)?;
        self.store.replace_cards(to.column_id, destination)?;
        Ok(mutations)
    }

    fn settle(&mut self, batch: BatchId) -> Result<Handled, BoardError> {
        if !self.in_flight.remove(&batch) {
            return Ok(Handled::Discarded(DiscardReason::UnknownBatch));
        }
        self.transition(Transition::BatchSettled)?;
        tracing::debug!(batch = %batch, state = ?self.state, "batch settled");
        Ok(Handled::Applied)
    }

    /// Applies a CRUD acknowledgement if it belongs to the active board.
    fn for_board(
        &mut self,
        board_id: BoardId,
        apply: impl FnOnce(&mut BoardStore) -> Result<bool, BoardError>,
    ) -> Result<Handled, BoardError> {
        match self.board_id {
            None => Ok(Handled::Discarded(DiscardReason::NoActiveBoard)),
            Some(active) if active != board_id => Ok(Handled::Discarded(DiscardReason::ForeignBoard)),
            Some(_) if !self.store.is_loaded() => Ok(Handled::Discarded(DiscardReason::NoActiveBoard)),
            Some(_) => Ok(if apply(&mut self.store)? {
                Handled::Applied
            } else {
                Handled::Unchanged
            }),
        }
    }
}

fn card_mutation(id: CardId, position: u32, column_id: ColumnId) -> PositionMutation {
    PositionMutation::Card(CardPosition {
        id,
        position,
        column_id,
    })
}
