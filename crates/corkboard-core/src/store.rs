//! Board State Store: the client's copy of one board.
//!
//! # 設計
//! - I/O を持たない（ネットワークを知らない）
//! - 書き込みは reconciler からのみ
//! - sequence 置き換え系の操作は position を振り直す
//! - append / remove は既存要素の position を振り直さない（削除による穴は次の snapshot で解消）

use crate::domain::sequencer::restamp;
use crate::domain::{Board, BoardError, Card, CardId, Column, ColumnId};

#[derive(Debug, Default, Clone)]
pub struct BoardStore {
    board: Option<Board>,
}

impl BoardStore {
    pub fn new() -> Self {
        Self { board: None }
    }

    /// Current board for rendering.
    pub fn board(&self) -> Option<&Board> {
        self.board.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.board.is_some()
    }

    /// Wholesale replace with a snapshot.
    pub fn replace(&mut self, board: Board) {
        self.board = Some(board.sanitized());
    }

    pub fn clear(&mut self) {
        self.board = None;
    }

    fn loaded_mut(&mut self) -> Result<&mut Board, BoardError> {
        self.board.as_mut().ok_or(BoardError::NoActiveBoard)
    }

    fn loaded(&self) -> Result<&Board, BoardError> {
        self.board.as_ref().ok_or(BoardError::NoActiveBoard)
    }

    pub fn columns(&self) -> Result<&[Column], BoardError> {
        Ok(&self.loaded()?.columns)
    }

    pub fn cards(&self, column_id: ColumnId) -> Result<&[Card], BoardError> {
        self.loaded()?
            .column(column_id)
            .map(|c| c.cards.as_slice())
            .ok_or(BoardError::UnknownColumn(column_id))
    }

    /// Replaces the board's column order and restamps column positions.
    pub fn replace_columns(&mut self, mut columns: Vec<Column>) -> Result<(), BoardError> {
        let board = self.loaded_mut()?;
        restamp(&mut columns);
        board.columns = columns;
        Ok(())
    }

    /// Replaces one column's cards, restamping positions and back-references.
    pub fn replace_cards(&mut self, column_id: ColumnId, mut cards: Vec<Card>) -> Result<(), BoardError> {
        let column = self
            .loaded_mut()?
            .column_mut(column_id)
            .ok_or(BoardError::UnknownColumn(column_id))?;
        restamp(&mut cards);
        for card in &mut cards {
            card.column_id = column_id;
        }
        column.cards = cards;
        Ok(())
    }

    /// Appends a column at the next free position.
    ///
    /// Returns `false` if a column with that id is already present (a snapshot
    /// delivered it first).
    pub fn append_column(&mut self, mut column: Column) -> Result<bool, BoardError> {
        let board = self.loaded_mut()?;
        if board.column(column.id).is_some() {
            return Ok(false);
        }
        column.position = board.next_column_position();
        board.columns.push(column);
        Ok(true)
    }

    /// Removes a column and its cards. Survivors keep their positions.
    pub fn remove_column(&mut self, column_id: ColumnId) -> Result<Option<Column>, BoardError> {
        let board = self.loaded_mut()?;
        Ok(board
            .column_index(column_id)
            .map(|index| board.columns.remove(index)))
    }

    /// Appends a card to the column named by its `column_id`.
    pub fn append_card(&mut self, mut card: Card) -> Result<bool, BoardError> {
        let board = self.loaded_mut()?;
        if board.locate_card(card.id).is_some() {
            return Ok(false);
        }
        let column = board
            .column_mut(card.column_id)
            .ok_or(BoardError::UnknownColumn(card.column_id))?;
        card.position = column.next_card_position();
        column.cards.push(card);
        Ok(true)
    }

    /// Removes a card from whichever column holds it. Survivors keep their positions.
    pub fn remove_card(&mut self, card_id: CardId) -> Result<Option<Card>, BoardError> {
        let board = self.loaded_mut()?;
        Ok(board
            .locate_card(card_id)
            .map(|(ci, k)| board.columns[ci].cards.remove(k)))
    }

    pub fn next_column_position(&self) -> Result<u32, BoardError> {
        Ok(self.loaded()?.next_column_position())
    }

    pub fn next_card_position(&self, column_id: ColumnId) -> Result<u32, BoardError> {
        self.loaded()?
            .column(column_id)
            .map(Column::next_card_position)
            .ok_or(BoardError::UnknownColumn(column_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BoardId;
    use ulid::Ulid;

    fn seeded() -> (BoardStore, ColumnId, ColumnId) {
        let todo = ColumnId::from_ulid(Ulid::new());
        let done = ColumnId::from_ulid(Ulid::new());
        let cards = (0..3)
            .map(|p| Card {
                id: CardId::from_ulid(Ulid::new()),
                title: format!("t{p}"),
                position: p,
                column_id: todo,
            })
            .collect();
        let board = Board {
            id: BoardId::from_ulid(Ulid::new()),
            title: "b".into(),
            columns: vec![
                Column { id: todo, title: "Todo".into(), position: 0, cards },
                Column { id: done, title: "Done".into(), position: 1, cards: vec![] },
            ],
        };
        let mut store = BoardStore::new();
        store.replace(board);
        (store, todo, done)
    }

    fn card_positions(store: &BoardStore, column_id: ColumnId) -> Vec<u32> {
        store.cards(column_id).unwrap().iter().map(|c| c.position).collect()
    }

    #[test]
    fn empty_store_rejects_mutations() {
        let mut store = BoardStore::new();
        assert!(matches!(store.replace_columns(vec![]), Err(BoardError::NoActiveBoard)));
        assert!(matches!(store.remove_card(CardId::from_ulid(Ulid::new())), Err(BoardError::NoActiveBoard)));
        assert!(store.board().is_none());
    }

    #[test]
    fn replace_cards_restamps_and_fixes_back_references() {
        let (mut store, todo, done) = seeded();
        let mut moved = store.cards(todo).unwrap().to_vec();
        moved.reverse();

        store.replace_cards(done, moved).unwrap();

        assert_eq!(card_positions(&store, done), vec![0, 1, 2]);
        assert!(store.cards(done).unwrap().iter().all(|c| c.column_id == done));
    }

    #[test]
    fn replace_cards_on_unknown_column_fails() {
        let (mut store, _, _) = seeded();
        let ghost = ColumnId::from_ulid(Ulid::new());
        assert!(matches!(
            store.replace_cards(ghost, vec![]),
            Err(BoardError::UnknownColumn(id)) if id == ghost
        ));
    }

    #[test]
    fn deleting_a_card_keeps_survivor_positions() {
        let (mut store, todo, _) = seeded();
        let middle = store.cards(todo).unwrap()[1].id;

        let removed = store.remove_card(middle).unwrap();

        assert_eq!(removed.map(|c| c.id), Some(middle));
        assert_eq!(card_positions(&store, todo), vec![0, 2]);
    }

    #[test]
    fn appended_card_takes_next_free_position() {
        let (mut store, todo, _) = seeded();
        let first = store.cards(todo).unwrap()[0].id;
        store.remove_card(first).unwrap();

        let card = Card {
            id: CardId::from_ulid(Ulid::new()),
            title: "new".into(),
            position: 0,
            column_id: todo,
        };
        assert!(store.append_card(card.clone()).unwrap());
        assert!(!store.append_card(card).unwrap());

        assert_eq!(card_positions(&store, todo), vec![1, 2, 3]);
    }

    #[test]
    fn appended_column_is_not_duplicated() {
        let (mut store, _, _) = seeded();
        let column = Column {
            id: ColumnId::from_ulid(Ulid::new()),
            title: "Later".into(),
            position: 0,
            cards: vec![],
        };

        assert!(store.append_column(column.clone()).unwrap());
        assert!(!store.append_column(column).unwrap());

        let positions: Vec<u32> = store.columns().unwrap().iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn removing_a_column_removes_its_cards() {
        let (mut store, todo, _) = seeded();
        let card = store.cards(todo).unwrap()[0].id;

        store.remove_column(todo).unwrap();

        let board = store.board().unwrap();
        assert_eq!(board.columns.len(), 1);
        assert_eq!(board.columns[0].position, 1);
        assert!(board.card(card).is_none());
    }
}
