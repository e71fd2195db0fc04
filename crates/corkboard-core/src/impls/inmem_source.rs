//! InMemoryBoardSource - 開発・テスト用の remote board source
//!
//! # 学習ポイント
//! - tokio::sync::Mutex で状態を保護（ロックを跨いだ await はしない）
//! - 購読者ごとの bounded mpsc に `try_send` で snapshot を配信
//! - 失敗注入（card / column / operation 単位）と人工レイテンシ

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::domain::{
    Board, BoardId, Card, CardId, CardPosition, Column, ColumnId, ColumnPosition, NewCard,
    NewColumn, PositionMutation,
};
use crate::ports::{IdGenerator, RemoteBoardSource, SourceError, Subscription, SystemClock, UlidGenerator};

const DEFAULT_SUBSCRIPTION_BUFFER: usize = 16;

#[derive(Default)]
struct Failures {
    cards: HashMap<CardId, SourceError>,
    columns: HashMap<ColumnId, SourceError>,
    operations: HashMap<&'static str, SourceError>,
}

#[derive(Default)]
struct Inner {
    boards: HashMap<BoardId, Board>,
    subscribers: HashMap<BoardId, Vec<mpsc::Sender<Board>>>,
    failures: Failures,
    /// Every position mutation received, including rejected attempts.
    received: Vec<PositionMutation>,
    /// Mutating operations that arrived with an optimistic value.
    optimistic: Vec<&'static str>,
}

impl Inner {
    fn note_optimistic<T>(&mut self, operation: &'static str, optimistic: &Option<T>) {
        if optimistic.is_some() {
            self.optimistic.push(operation);
        }
    }

    fn injected(&self, operation: &'static str) -> Result<(), SourceError> {
        match self.failures.operations.get(operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn board_of_column(&self, column_id: ColumnId) -> Option<BoardId> {
        self.boards
            .values()
            .find(|b| b.column(column_id).is_some())
            .map(|b| b.id)
    }

    fn board_of_card(&self, card_id: CardId) -> Option<BoardId> {
        self.boards
            .values()
            .find(|b| b.locate_card(card_id).is_some())
            .map(|b| b.id)
    }

    fn board_mut(&mut self, board_id: BoardId) -> Result<&mut Board, SourceError> {
        self.boards
            .get_mut(&board_id)
            .ok_or(SourceError::NotFound(board_id))
    }

    /// Pushes the current snapshot to every live subscriber of `board_id`.
    fn broadcast(&mut self, board_id: BoardId) {
        let Some(board) = self.boards.get(&board_id) else {
            return;
        };
        let snapshot = board.clone().sanitized();
        let Some(subscribers) = self.subscribers.get_mut(&board_id) else {
            return;
        };
        subscribers.retain(|tx| match tx.try_send(snapshot.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(board_id = %board_id, "subscriber lagging; snapshot dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

/// InMemoryBoardSource は開発用の remote board source
///
/// # 使用例
/// ```ignore
/// let source = Arc::new(InMemoryBoardSource::new());
/// let board_id = source.create_board("Roadmap").await;
/// let board = source.fetch_board(board_id).await?;
/// ```
pub struct InMemoryBoardSource {
    inner: Mutex<Inner>,
    ids: UlidGenerator<SystemClock>,
    latency: Duration,
    subscription_buffer: usize,
}

impl Default for InMemoryBoardSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBoardSource {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            ids: UlidGenerator::new(SystemClock),
            latency: Duration::ZERO,
            subscription_buffer: DEFAULT_SUBSCRIPTION_BUFFER,
        }
    }

    /// Delay applied before every request is served.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_subscription_buffer(mut self, buffer: usize) -> Self {
        self.subscription_buffer = buffer.max(1);
        self
    }

    /// Stores `board` as-is, replacing any board with the same id.
    pub async fn seed(&self, board: Board) {
        let mut inner = self.inner.lock().await;
        let board_id = board.id;
        inner.boards.insert(board_id, board);
        inner.broadcast(board_id);
    }

    /// Creates an empty board with a fresh id.
    pub async fn create_board(&self, title: impl Into<String>) -> BoardId {
        let board = Board::new(self.ids.generate_board_id(), title);
        let board_id = board.id;
        self.seed(board).await;
        board_id
    }

    /// Current authoritative snapshot, bypassing latency and failure injection.
    pub async fn board(&self, board_id: BoardId) -> Option<Board> {
        let inner = self.inner.lock().await;
        inner.boards.get(&board_id).cloned().map(Board::sanitized)
    }

    pub async fn received(&self) -> Vec<PositionMutation> {
        self.inner.lock().await.received.clone()
    }

    /// Names of the operations called with an optimistic value, in call order.
    pub async fn optimistic_calls(&self) -> Vec<&'static str> {
        self.inner.lock().await.optimistic.clone()
    }

    pub async fn subscriber_count(&self, board_id: BoardId) -> usize {
        let inner = self.inner.lock().await;
        inner
            .subscribers
            .get(&board_id)
            .map_or(0, |subs| subs.iter().filter(|tx| !tx.is_closed()).count())
    }

    /// Ends every open subscription stream of `board_id`.
    pub async fn end_subscriptions(&self, board_id: BoardId) {
        self.inner.lock().await.subscribers.remove(&board_id);
    }

    pub async fn fail_card(&self, card_id: CardId, error: SourceError) {
        self.inner.lock().await.failures.cards.insert(card_id, error);
    }

    pub async fn fail_column(&self, column_id: ColumnId, error: SourceError) {
        self.inner.lock().await.failures.columns.insert(column_id, error);
    }

    /// Fails every call of the named operation (trait method name).
    pub async fn fail_operation(&self, operation: &'static str, error: SourceError) {
        self.inner
            .lock()
            .await
            .failures
            .operations
            .insert(operation, error);
    }

    pub async fn clear_failures(&self) {
        self.inner.lock().await.failures = Failures::default();
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl RemoteBoardSource for InMemoryBoardSource {
    async fn fetch_board(&self, board_id: BoardId) -> Result<Board, SourceError> {
        self.delay().await;
        let inner = self.inner.lock().await;
        inner.injected("fetch_board")?;
        inner
            .boards
            .get(&board_id)
            .cloned()
            .map(Board::sanitized)
            .ok_or(SourceError::NotFound(board_id))
    }

    async fn subscribe_board(&self, board_id: BoardId) -> Result<Subscription, SourceError> {
        self.delay().await;
        let mut inner = self.inner.lock().await;
        inner.injected("subscribe_board")?;
        if !inner.boards.contains_key(&board_id) {
            return Err(SourceError::NotFound(board_id));
        }
        let (tx, rx) = mpsc::channel(self.subscription_buffer);
        inner.subscribers.entry(board_id).or_default().push(tx);
        tracing::debug!(board_id = %board_id, "subscribed");
        Ok(Subscription::new(rx))
    }

    async fn update_column_position(
        &self,
        update: ColumnPosition,
        optimistic: Option<ColumnPosition>,
    ) -> Result<ColumnPosition, SourceError> {
        self.delay().await;
        let mut inner = self.inner.lock().await;
        inner.received.push(PositionMutation::Column(update));
        inner.note_optimistic("update_column_position", &optimistic);
        inner.injected("update_column_position")?;
        if let Some(err) = inner.failures.columns.get(&update.id) {
            return Err(err.clone());
        }

        let board_id = inner
            .board_of_column(update.id)
            .ok_or_else(|| SourceError::Rejected(format!("unknown column {}", update.id)))?;
        if let Some(column) = inner.board_mut(board_id)?.column_mut(update.id) {
            column.position = update.position;
        }
        inner.broadcast(board_id);
        Ok(update)
    }

    async fn update_card_position(
        &self,
        update: CardPosition,
        optimistic: Option<CardPosition>,
    ) -> Result<CardPosition, SourceError> {
        self.delay().await;
        let mut inner = self.inner.lock().await;
        inner.received.push(PositionMutation::Card(update));
        inner.note_optimistic("update_card_position", &optimistic);
        inner.injected("update_card_position")?;
        if let Some(err) = inner.failures.cards.get(&update.id) {
            return Err(err.clone());
        }

        let board_id = inner
            .board_of_card(update.id)
            .ok_or_else(|| SourceError::Rejected(format!("unknown card {}", update.id)))?;
        let board = inner.board_mut(board_id)?;
        let target = board.column_index(update.column_id).ok_or_else(|| {
            SourceError::Rejected(format!("unknown column {}", update.column_id))
        })?;
        if let Some((ci, k)) = board.locate_card(update.id) {
            let mut card = board.columns[ci].cards.remove(k);
            card.position = update.position;
            card.column_id = update.column_id;
            board.columns[target].cards.push(card);
        }
        inner.broadcast(board_id);
        Ok(update)
    }

    async fn create_column(
        &self,
        request: NewColumn,
        optimistic: Option<NewColumn>,
    ) -> Result<Column, SourceError> {
        self.delay().await;
        let mut inner = self.inner.lock().await;
        inner.note_optimistic("create_column", &optimistic);
        inner.injected("create_column")?;
        let column = Column {
            id: self.ids.generate_column_id(),
            title: request.title,
            position: request.position,
            cards: Vec::new(),
        };
        inner.board_mut(request.board_id)?.columns.push(column.clone());
        inner.broadcast(request.board_id);
        Ok(column)
    }

    async fn create_card(
        &self,
        request: NewCard,
        optimistic: Option<NewCard>,
    ) -> Result<Card, SourceError> {
        self.delay().await;
        let mut inner = self.inner.lock().await;
        inner.note_optimistic("create_card", &optimistic);
        inner.injected("create_card")?;
        if let Some(err) = inner.failures.columns.get(&request.column_id) {
            return Err(err.clone());
        }

        let board_id = inner.board_of_column(request.column_id).ok_or_else(|| {
            SourceError::Rejected(format!("unknown column {}", request.column_id))
        })?;
        let card = Card {
            id: self.ids.generate_card_id(),
            title: request.title,
            position: request.position,
            column_id: request.column_id,
        };
        if let Some(column) = inner.board_mut(board_id)?.column_mut(request.column_id) {
            column.cards.push(card.clone());
        }
        inner.broadcast(board_id);
        Ok(card)
    }

    async fn delete_column(
        &self,
        column_id: ColumnId,
        optimistic: Option<ColumnId>,
    ) -> Result<ColumnId, SourceError> {
        self.delay().await;
        let mut inner = self.inner.lock().await;
        inner.note_optimistic("delete_column", &optimistic);
        inner.injected("delete_column")?;
        if let Some(err) = inner.failures.columns.get(&column_id) {
            return Err(err.clone());
        }

        let board_id = inner
            .board_of_column(column_id)
            .ok_or_else(|| SourceError::Rejected(format!("unknown column {column_id}")))?;
        inner.board_mut(board_id)?.columns.retain(|c| c.id != column_id);
        inner.broadcast(board_id);
        Ok(column_id)
    }

    async fn delete_card(
        &self,
        card_id: CardId,
        optimistic: Option<CardId>,
    ) -> Result<CardId, SourceError> {
        self.delay().await;
        let mut inner = self.inner.lock().await;
        inner.note_optimistic("delete_card", &optimistic);
        inner.injected("delete_card")?;
        if let Some(err) = inner.failures.cards.get(&card_id) {
            return Err(err.clone());
        }

        let board_id = inner
            .board_of_card(card_id)
            .ok_or_else(|| SourceError::Rejected(format!("unknown card {card_id}")))?;
        for column in &mut inner.board_mut(board_id)?.columns {
            column.cards.retain(|c| c.id != card_id);
        }
        inner.broadcast(board_id);
        Ok(card_id)
    }
}
