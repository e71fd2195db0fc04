//! BoardSession - reconciler を駆動する非同期ループ
//!
//! # 構造
//! - `BoardHandle`: UI 側。コマンドを mpsc で送り、結果を oneshot で受け取る
//! - session loop: コマンド / snapshot / リモート応答を 1 本のループで直列に処理
//! - リモート呼び出しは spawn したタスクで実行し、結果をイベントとしてループへ戻す
//!   （ループ自体はネットワーク待ちでブロックしない）
//!
//! store への書き込みはすべてループ内の `Reconciler::handle` を通ります。

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::domain::{
    BatchId, Board, BoardError, BoardId, Card, CardId, Column, ColumnId, GestureMove, Handled,
    Intent, MutationBatch, NewCard, NewColumn,
};
use crate::ports::{RemoteBoardSource, SourceError, Subscription};

use super::dispatcher::{BatchReport, MutationDispatcher};
use super::reconciler::Reconciler;
use super::status::SyncStatus;

type Reply<T> = oneshot::Sender<Result<T, BoardError>>;

enum Command {
    Open(BoardId, Reply<()>),
    Close(Reply<()>),
    GestureStart(Reply<()>),
    GestureEnd(Option<GestureMove>, Reply<Option<BatchId>>),
    AddColumn { title: String, reply: Reply<Column> },
    AddCard { column_id: ColumnId, title: String, reply: Reply<Card> },
    DeleteColumn { column_id: ColumnId, reply: Reply<()> },
    DeleteCard { card_id: CardId, reply: Reply<()> },
}

/// Results of spawned remote calls, fed back into the loop.
enum Event {
    Fetched {
        board_id: BoardId,
        result: Result<Board, SourceError>,
        reply: Reply<()>,
    },
    Subscribed {
        board_id: BoardId,
        result: Result<Subscription, SourceError>,
    },
    Settled(BatchReport),
    ColumnCreated {
        board_id: BoardId,
        result: Result<Column, SourceError>,
        reply: Reply<Column>,
    },
    CardCreated {
        board_id: BoardId,
        result: Result<Card, SourceError>,
        reply: Reply<Card>,
    },
    ColumnDeleted {
        board_id: BoardId,
        result: Result<ColumnId, SourceError>,
        reply: Reply<()>,
    },
    CardDeleted {
        board_id: BoardId,
        result: Result<CardId, SourceError>,
        reply: Reply<()>,
    },
}

enum Step {
    Shutdown,
    Command(Command),
    Event(Event),
    Snapshot(Option<Board>),
}

/// UI-facing handle of a running [`BoardSession`].
///
/// - `shutdown()` でループを止めて終了を待つ
/// - handle を drop してもループは止まる
pub struct BoardHandle {
    commands: mpsc::Sender<Command>,
    board: watch::Receiver<Option<Board>>,
    status: watch::Receiver<SyncStatus>,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl BoardHandle {
    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, BoardError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| BoardError::SessionClosed)?;
        rx.await.map_err(|_| BoardError::SessionClosed)?
    }

    /// Shows `board_id`, dropping whatever board was shown before.
    ///
    /// Resolves once the initial fetch completes; a missing board is
    /// [`BoardError::NotFound`].
    pub async fn open_board(&self, board_id: BoardId) -> Result<(), BoardError> {
        self.request(|reply| Command::Open(board_id, reply)).await
    }

    pub async fn close_board(&self) -> Result<(), BoardError> {
        self.request(Command::Close).await
    }

    /// Drag picked up: opens the Drag Gate.
    pub async fn gesture_start(&self) -> Result<(), BoardError> {
        self.request(Command::GestureStart).await
    }

    /// Drag released. Returns the id of the issued mutation batch, if any.
    ///
    /// The gate is closed even when this returns an error.
    pub async fn gesture_end(&self, movement: Option<GestureMove>) -> Result<Option<BatchId>, BoardError> {
        self.request(|reply| Command::GestureEnd(movement, reply)).await
    }

    pub async fn add_column(&self, title: impl Into<String>) -> Result<Column, BoardError> {
        let title = title.into();
        self.request(|reply| Command::AddColumn { title, reply }).await
    }

    pub async fn add_card(&self, column_id: ColumnId, title: impl Into<String>) -> Result<Card, BoardError> {
        let title = title.into();
        self.request(|reply| Command::AddCard {
            column_id,
            title,
            reply,
        })
        .await
    }

    pub async fn delete_column(&self, column_id: ColumnId) -> Result<(), BoardError> {
        self.request(|reply| Command::DeleteColumn { column_id, reply })
            .await
    }

    pub async fn delete_card(&self, card_id: CardId) -> Result<(), BoardError> {
        self.request(|reply| Command::DeleteCard { card_id, reply })
            .await
    }

    /// Current board as the view should render it.
    pub fn board(&self) -> Option<Board> {
        self.board.borrow().clone()
    }

    pub fn watch_board(&self) -> watch::Receiver<Option<Board>> {
        self.board.clone()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    /// Waits until no gesture is open and every issued batch has settled.
    pub async fn settled(&self) -> Result<SyncStatus, BoardError> {
        let mut status = self.status.clone();
        let settled = status
            .wait_for(SyncStatus::is_settled)
            .await
            .map_err(|_| BoardError::SessionClosed)?;
        Ok(settled.clone())
    }

    /// Stops the session loop and waits for it to exit.
    ///
    /// In-flight remote calls are not cancelled; their results are dropped.
    pub async fn shutdown(self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
        let _ = self.join.await;
    }
}

pub struct BoardSession {
    reconciler: Reconciler,
    source: Arc<dyn RemoteBoardSource>,
    dispatcher: MutationDispatcher,
    config: SessionConfig,
    subscription: Option<Subscription>,
    commands: mpsc::Receiver<Command>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    board_tx: watch::Sender<Option<Board>>,
    status_tx: watch::Sender<SyncStatus>,
    mutation_failures: u64,
    last_error: Option<String>,
}

impl BoardSession {
    /// Spawns a session loop on the current tokio runtime.
    pub fn spawn(source: Arc<dyn RemoteBoardSource>, config: SessionConfig) -> BoardHandle {
        Self::spawn_with(Reconciler::new(), source, config)
    }

    /// Like [`spawn`](Self::spawn), with a caller-built reconciler (custom clock).
    pub fn spawn_with(
        reconciler: Reconciler,
        source: Arc<dyn RemoteBoardSource>,
        config: SessionConfig,
    ) -> BoardHandle {
        let (commands_tx, commands) = mpsc::channel(config.command_buffer.max(1));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (board_tx, board) = watch::channel(None);
        let (status_tx, status) = watch::channel(SyncStatus::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let session = Self {
            reconciler,
            dispatcher: MutationDispatcher::new(Arc::clone(&source), config.retry.clone()),
            source,
            config,
            subscription: None,
            commands,
            events_tx,
            events_rx,
            board_tx,
            status_tx,
            mutation_failures: 0,
            last_error: None,
        };
        let join = tokio::spawn(session.run(shutdown_rx));

        BoardHandle {
            commands: commands_tx,
            board,
            status,
            shutdown_tx,
            join,
        }
    }

    async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let step = tokio::select! {
                _ = shutdown_rx.changed() => Step::Shutdown,
                command = self.commands.recv() => match command {
                    Some(command) => Step::Command(command),
                    None => Step::Shutdown,
                },
                Some(event) = self.events_rx.recv() => Step::Event(event),
                snapshot = next_snapshot(&mut self.subscription) => Step::Snapshot(snapshot),
            };

            match step {
                Step::Shutdown => break,
                Step::Command(command) => self.on_command(command),
                Step::Event(event) => self.on_event(event),
                Step::Snapshot(Some(board)) => {
                    self.apply(Intent::ApplySnapshot(board));
                }
                Step::Snapshot(None) => self.on_stream_end(),
            }
            self.publish();
        }
        tracing::info!(board_id = ?self.reconciler.board_id(), "board session stopped");
    }

    /// Feeds the reconciler, logging failures that have no caller to report to.
    fn apply(&mut self, intent: Intent) -> Option<Handled> {
        let name = intent.name();
        match self.reconciler.handle(intent) {
            Ok(handled) => Some(handled),
            Err(err) => {
                tracing::warn!(intent = name, error = %err, "intent rejected");
                None
            }
        }
    }

    fn publish(&self) {
        let board = self.reconciler.board();
        self.board_tx.send_if_modified(|current| {
            if current.as_ref() == board {
                return false;
            }
            *current = board.cloned();
            true
        });

        let status = SyncStatus {
            mutation_failures: self.mutation_failures,
            last_error: self.last_error.clone(),
            ..self.reconciler.status()
        };
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    fn fail(&mut self, err: BoardError) -> BoardError {
        if err.is_user_visible() {
            self.last_error = Some(err.to_string());
        }
        err
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Open(board_id, reply) => self.open(board_id, reply),
            Command::Close(reply) => {
                self.subscription = None;
                let result = self.reconciler.handle(Intent::CloseBoard).map(|_| ());
                self.last_error = None;
                self.respond(reply, result);
            }
            Command::GestureStart(reply) => {
                let result = self.reconciler.handle(Intent::BeginGesture).map(|_| ());
                self.respond(reply, result);
            }
            Command::GestureEnd(movement, reply) => {
                let result = self
                    .reconciler
                    .handle(Intent::CompleteGesture(movement))
                    .map(|handled| handled.batch().map(|batch| self.send_batch(batch)));
                self.respond(reply, result);
            }
            Command::AddColumn { title, reply } => self.add_column(title, reply),
            Command::AddCard {
                column_id,
                title,
                reply,
            } => self.add_card(column_id, title, reply),
            Command::DeleteColumn { column_id, reply } => {
                let Some(board_id) = self.loaded_board() else {
                    self.respond(reply, Err(BoardError::NoActiveBoard));
                    return;
                };
                if self.reconciler.store().cards(column_id).is_err() {
                    self.respond(reply, Err(BoardError::UnknownColumn(column_id)));
                    return;
                }
                let source = Arc::clone(&self.source);
                self.spawn_call(async move {
                    let result = source.delete_column(column_id, Some(column_id)).await;
                    Event::ColumnDeleted {
                        board_id,
                        result,
                        reply,
                    }
                });
            }
            Command::DeleteCard { card_id, reply } => {
                let Some(board_id) = self.loaded_board() else {
                    self.respond(reply, Err(BoardError::NoActiveBoard));
                    return;
                };
                if self.reconciler.board().and_then(|b| b.card(card_id)).is_none() {
                    self.respond(reply, Err(BoardError::UnknownCard(card_id)));
                    return;
                }
                let source = Arc::clone(&self.source);
                self.spawn_call(async move {
                    let result = source.delete_card(card_id, Some(card_id)).await;
                    Event::CardDeleted {
                        board_id,
                        result,
                        reply,
                    }
                });
            }
        }
    }

    fn open(&mut self, board_id: BoardId, reply: Reply<()>) {
        match self.reconciler.handle(Intent::OpenBoard(board_id)) {
            // same board, but only done if its first snapshot arrived
            Ok(Handled::Unchanged) if self.loaded_board() == Some(board_id) => {
                self.respond(reply, Ok(()));
                return;
            }
            Ok(_) => {}
            Err(err) => {
                self.respond(reply, Err(err));
                return;
            }
        }
        self.subscription = None;
        self.last_error = None;
        tracing::info!(board_id = %board_id, "opening board");

        let source = Arc::clone(&self.source);
        self.spawn_call(async move {
            let result = source.fetch_board(board_id).await;
            Event::Fetched {
                board_id,
                result,
                reply,
            }
        });
        self.subscribe(board_id, None);
    }

    /// Subscribes to `board_id`, optionally after a delay.
    fn subscribe(&self, board_id: BoardId, after: Option<std::time::Duration>) {
        let source = Arc::clone(&self.source);
        self.spawn_call(async move {
            if let Some(delay) = after {
                tokio::time::sleep(delay).await;
            }
            let result = source.subscribe_board(board_id).await;
            Event::Subscribed { board_id, result }
        });
    }

    fn on_stream_end(&mut self) {
        self.subscription = None;
        if let Some(board_id) = self.reconciler.board_id() {
            tracing::warn!(board_id = %board_id, delay = ?self.config.resubscribe_delay(), "snapshot stream ended; resubscribing");
            self.subscribe(board_id, Some(self.config.resubscribe_delay()));
        }
    }

    /// Active board id, once its first snapshot is in the store.
    fn loaded_board(&self) -> Option<BoardId> {
        self.reconciler
            .board_id()
            .filter(|_| self.reconciler.store().is_loaded())
    }

    /// Publishes, then replies.
    fn respond<T>(&self, reply: Reply<T>, result: Result<T, BoardError>) {
        self.publish();
        // ignore send error: the caller stopped waiting
        let _ = reply.send(result);
    }

    fn add_column(&mut self, title: String, reply: Reply<Column>) {
        let (Some(board_id), Ok(position)) = (
            self.loaded_board(),
            self.reconciler.store().next_column_position(),
        ) else {
            self.respond(reply, Err(BoardError::NoActiveBoard));
            return;
        };
        let request = NewColumn {
            board_id,
            title,
            position,
        };
        let source = Arc::clone(&self.source);
        self.spawn_call(async move {
            let result = source.create_column(request.clone(), Some(request)).await;
            Event::ColumnCreated {
                board_id,
                result,
                reply,
            }
        });
    }

    fn add_card(&mut self, column_id: ColumnId, title: String, reply: Reply<Card>) {
        let Some(board_id) = self.loaded_board() else {
            self.respond(reply, Err(BoardError::NoActiveBoard));
            return;
        };
        let position = match self.reconciler.store().next_card_position(column_id) {
            Ok(position) => position,
            Err(err) => {
                self.respond(reply, Err(err));
                return;
            }
        };
        let request = NewCard {
            column_id,
            title,
            position,
        };
        let source = Arc::clone(&self.source);
        self.spawn_call(async move {
            let result = source.create_card(request.clone(), Some(request)).await;
            Event::CardCreated {
                board_id,
                result,
                reply,
            }
        });
    }

    fn send_batch(&self, batch: MutationBatch) -> BatchId {
        let batch_id = batch.id;
        let dispatcher = self.dispatcher.clone();
        self.spawn_call(async move { Event::Settled(dispatcher.dispatch(batch).await) });
        batch_id
    }

    fn spawn_call(&self, call: impl Future<Output = Event> + Send + 'static) {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            // ignore send error: the session is gone
            let _ = events.send(call.await);
        });
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Fetched {
                board_id,
                result,
                reply,
            } => {
                let result = match result {
                    Ok(board) => {
                        self.apply(Intent::Initialize(board));
                        Ok(())
                    }
                    Err(err) if self.reconciler.board_id() == Some(board_id) => {
                        tracing::warn!(board_id = %board_id, error = %err, "initial fetch failed");
                        Err(self.fail(BoardError::from_source("fetch_board", err)))
                    }
                    Err(err) => Err(BoardError::from_source("fetch_board", err)),
                };
                self.respond(reply, result);
            }
            Event::Subscribed { board_id, result } => {
                if self.reconciler.board_id() != Some(board_id) {
                    return;
                }
                match result {
                    Ok(subscription) => self.subscription = Some(subscription),
                    Err(err) if err.is_transient() => {
                        tracing::warn!(board_id = %board_id, error = %err, "subscribe failed; retrying");
                        self.subscribe(board_id, Some(self.config.resubscribe_delay()));
                    }
                    Err(err) => {
                        tracing::warn!(board_id = %board_id, error = %err, "subscribe failed");
                        self.fail(BoardError::from_source("subscribe_board", err));
                    }
                }
            }
            Event::Settled(report) => {
                self.mutation_failures += report.failed.len() as u64;
                self.apply(Intent::BatchSettled(report.batch_id));
            }
            Event::ColumnCreated {
                board_id,
                result,
                reply,
            } => {
                let result = self.acknowledge("create_column", result, |column| Intent::ColumnCreated {
                    board_id,
                    column: column.clone(),
                });
                self.respond(reply, result);
            }
            Event::CardCreated {
                board_id,
                result,
                reply,
            } => {
                let result = self.acknowledge("create_card", result, |card| Intent::CardCreated {
                    board_id,
                    card: card.clone(),
                });
                self.respond(reply, result);
            }
            Event::ColumnDeleted {
                board_id,
                result,
                reply,
            } => {
                let result = self.acknowledge("delete_column", result, |column_id| Intent::ColumnDeleted {
                    board_id,
                    column_id: *column_id,
                });
                self.respond(reply, result.map(|_| ()));
            }
            Event::CardDeleted {
                board_id,
                result,
                reply,
            } => {
                let result = self.acknowledge("delete_card", result, |card_id| Intent::CardDeleted {
                    board_id,
                    card_id: *card_id,
                });
                self.respond(reply, result.map(|_| ()));
            }
        }
    }

    /// Applies a remote CRUD acknowledgement to the store, or surfaces the failure.
    fn acknowledge<T>(
        &mut self,
        operation: &'static str,
        result: Result<T, SourceError>,
        intent: impl FnOnce(&T) -> Intent,
    ) -> Result<T, BoardError> {
        match result {
            Ok(value) => {
                self.apply(intent(&value));
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(operation, error = %err, "remote operation failed");
                Err(self.fail(BoardError::from_source(operation, err)))
            }
        }
    }
}

async fn next_snapshot(subscription: &mut Option<Subscription>) -> Option<Board> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CardSlot;
    use crate::impls::InMemoryBoardSource;
    use std::time::Duration;
    use ulid::Ulid;

    async fn within<F: Future>(future: F) -> F::Output {
        tokio::time::timeout(Duration::from_secs(5), future)
            .await
            .expect("timed out")
    }

    fn roadmap() -> Board {
        let mut board = Board::new(BoardId::from_ulid(Ulid::new()), "Roadmap");
        for (position, (title, n)) in [("A", 3u32), ("B", 2)].into_iter().enumerate() {
            let id = ColumnId::from_ulid(Ulid::new());
            board.columns.push(Column {
                id,
                title: title.into(),
                position: position as u32,
                cards: (0..n)
                    .map(|k| Card {
                        id: CardId::from_ulid(Ulid::new()),
                        title: format!("{title}{k}"),
                        position: k,
                        column_id: id,
                    })
                    .collect(),
            });
        }
        board
    }

    async fn start(board: &Board) -> (Arc<InMemoryBoardSource>, BoardHandle) {
        let source = Arc::new(InMemoryBoardSource::new());
        source.seed(board.clone()).await;
        let config = SessionConfig {
            resubscribe_delay_ms: 5,
            ..SessionConfig::default()
        };
        let handle = BoardSession::spawn(source.clone(), config);
        handle.open_board(board.id).await.unwrap();
        within(until_subscribed(&source, board.id)).await;
        (source, handle)
    }

    async fn until_subscribed(source: &InMemoryBoardSource, board_id: BoardId) {
        while source.subscriber_count(board_id).await == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    async fn until_board(handle: &BoardHandle, done: impl Fn(&Board) -> bool) -> Board {
        let mut rx = handle.watch_board();
        let board = within(rx.wait_for(|b| b.as_ref().is_some_and(&done)))
            .await
            .unwrap();
        board.clone().unwrap()
    }

    #[tokio::test]
    async fn open_board_loads_the_initial_snapshot() {
        let board = roadmap();
        let (_source, handle) = start(&board).await;

        assert_eq!(handle.board(), Some(board.clone()));
        let status = handle.status();
        assert_eq!(status.board_id, Some(board.id));
        assert!(status.is_settled());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn missing_board_is_reported_as_not_found() {
        let source = Arc::new(InMemoryBoardSource::new());
        let handle = BoardSession::spawn(source, SessionConfig::default());
        let board_id = BoardId::from_ulid(Ulid::new());

        let err = handle.open_board(board_id).await.unwrap_err();

        assert!(matches!(err, BoardError::NotFound(id) if id == board_id));
        assert!(handle.board().is_none());
        assert!(handle.status().last_error.is_some());
    }

    #[tokio::test]
    async fn board_created_after_not_found_can_be_reopened() {
        let board = roadmap();
        let source = Arc::new(InMemoryBoardSource::new());
        let handle = BoardSession::spawn(source.clone(), SessionConfig::default());

        let err = handle.open_board(board.id).await.unwrap_err();
        assert!(matches!(err, BoardError::NotFound(_)));

        source.seed(board.clone()).await;
        handle.open_board(board.id).await.unwrap();

        assert_eq!(handle.board(), Some(board.clone()));
        within(until_subscribed(&source, board.id)).await;

        // a loaded board is not fetched again
        handle.open_board(board.id).await.unwrap();
        assert_eq!(handle.board(), Some(board));
    }

    #[tokio::test]
    async fn cross_column_drop_converges_with_the_remote() {
        let board = roadmap();
        let (source, handle) = start(&board).await;
        let (a, b) = (board.columns[0].id, board.columns[1].id);
        let moved = board.columns[0].cards[1].id;

        handle.gesture_start().await.unwrap();
        let batch = handle
            .gesture_end(Some(GestureMove::card(CardSlot::new(a, 1), CardSlot::new(b, 1))))
            .await
            .unwrap();
        assert!(batch.is_some());

        let local = handle.board().unwrap();
        assert_eq!(local.card(moved).unwrap().column_id, b);
        assert_eq!(local.verify(), Ok(()));

        within(handle.settled()).await.unwrap();
        let remote = source.board(board.id).await.unwrap();
        until_board(&handle, |b| *b == remote).await;
        assert_eq!(source.received().await.len(), 5);
    }

    #[tokio::test]
    async fn push_during_gesture_is_dropped_and_healed_by_the_next_one() {
        let board = roadmap();
        let (source, handle) = start(&board).await;
        let b = board.columns[1].id;

        handle.gesture_start().await.unwrap();
        let foreign = source
            .create_card(
                NewCard {
                    column_id: b,
                    title: "from another viewer".into(),
                    position: 2,
                },
                None,
            )
            .await
            .unwrap();

        let mut status = handle.watch_status();
        within(status.wait_for(|s| s.snapshots_discarded >= 1)).await.unwrap();
        assert!(handle.board().unwrap().card(foreign.id).is_none());

        assert_eq!(handle.gesture_end(None).await.unwrap(), None);
        assert!(handle.board().unwrap().card(foreign.id).is_none());

        let second = source
            .create_card(
                NewCard {
                    column_id: b,
                    title: "another one".into(),
                    position: 3,
                },
                None,
            )
            .await
            .unwrap();
        let healed = until_board(&handle, |board| board.card(second.id).is_some()).await;
        assert!(healed.card(foreign.id).is_some());
    }

    #[tokio::test]
    async fn rejected_reorder_is_counted_and_overwritten_by_the_remote() {
        let board = roadmap();
        let (source, handle) = start(&board).await;
        let a = board.columns[0].id;
        let stuck = board.columns[0].cards[0].id;
        source
            .fail_card(stuck, SourceError::Rejected("locked".into()))
            .await;

        handle.gesture_start().await.unwrap();
        handle
            .gesture_end(Some(GestureMove::card(CardSlot::new(a, 0), CardSlot::new(a, 2))))
            .await
            .unwrap();

        let status = within(handle.settled()).await.unwrap();
        assert_eq!(status.mutation_failures, 1);

        let remote = source.board(board.id).await.unwrap();
        assert_eq!(remote.card(stuck).unwrap().position, 0);
        until_board(&handle, |b| *b == remote).await;
    }

    #[tokio::test]
    async fn failed_card_keeps_the_rest_of_the_reorder() {
        let mut board = roadmap();
        let a = board.columns[0].id;
        board.columns[0].cards.push(Card {
            id: CardId::from_ulid(Ulid::new()),
            title: "A3".into(),
            position: 3,
            column_id: a,
        });
        let stuck = board.columns[0].cards[0].id;

        // no subscriber: nothing from the remote can overwrite the local store
        let source = Arc::new(InMemoryBoardSource::new());
        source.seed(board.clone()).await;
        source
            .fail_operation("subscribe_board", SourceError::Rejected("no streams".into()))
            .await;
        source
            .fail_card(stuck, SourceError::Rejected("locked".into()))
            .await;
        let handle = BoardSession::spawn(source.clone(), SessionConfig::default());
        handle.open_board(board.id).await.unwrap();

        handle.gesture_start().await.unwrap();
        handle
            .gesture_end(Some(GestureMove::card(CardSlot::new(a, 0), CardSlot::new(a, 3))))
            .await
            .unwrap();
        let optimistic = handle.board().unwrap();
        let order: Vec<_> = optimistic.columns[0]
            .cards
            .iter()
            .map(|c| (c.title.as_str(), c.position))
            .collect();
        assert_eq!(order, vec![("A1", 0), ("A2", 1), ("A3", 2), ("A0", 3)]);

        let status = within(handle.settled()).await.unwrap();
        assert_eq!(status.mutation_failures, 1);
        assert_eq!(source.received().await.len(), 4);
        assert_eq!(handle.board(), Some(optimistic));
        assert_eq!(source.subscriber_count(board.id).await, 0);
    }

    #[tokio::test]
    async fn crud_calls_carry_the_optimistic_value() {
        let board = roadmap();
        let (source, handle) = start(&board).await;

        let card = handle.add_card(board.columns[1].id, "new").await.unwrap();
        handle.delete_card(card.id).await.unwrap();
        handle.add_column("C").await.unwrap();
        handle.delete_column(board.columns[1].id).await.unwrap();

        assert_eq!(
            source.optimistic_calls().await,
            vec!["create_card", "delete_card", "create_column", "delete_column"]
        );
    }

    #[tokio::test]
    async fn created_card_lands_at_the_end_of_its_column() {
        let board = roadmap();
        let (_source, handle) = start(&board).await;
        let b = board.columns[1].id;

        let card = handle.add_card(b, "new").await.unwrap();

        assert_eq!(card.position, 2);
        let local = handle.board().unwrap();
        assert_eq!(local.columns[1].cards.last().map(|c| c.id), Some(card.id));
        assert_eq!(local.columns[1].cards.len(), 3);
    }

    #[tokio::test]
    async fn failed_create_surfaces_to_the_caller() {
        let board = roadmap();
        let (source, handle) = start(&board).await;
        source
            .fail_operation("create_column", SourceError::Unavailable("offline".into()))
            .await;

        let err = handle.add_column("Later").await.unwrap_err();

        assert!(matches!(err, BoardError::MutationFailed { operation: "create_column", .. }));
        assert_eq!(handle.board().unwrap().columns.len(), 2);
        assert!(handle.status().last_error.is_some());
    }

    #[tokio::test]
    async fn deleted_card_disappears_without_renumbering() {
        let board = roadmap();
        let (_source, handle) = start(&board).await;
        let doomed = board.columns[0].cards[0].id;

        handle.delete_card(doomed).await.unwrap();

        let local = handle.board().unwrap();
        assert!(local.card(doomed).is_none());
        let positions: Vec<_> = local.columns[0].cards.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![1, 2]);
    }

    #[tokio::test]
    async fn deleting_an_unknown_card_fails_locally() {
        let board = roadmap();
        let (source, handle) = start(&board).await;
        let ghost = CardId::from_ulid(Ulid::new());

        let err = handle.delete_card(ghost).await.unwrap_err();

        assert!(matches!(err, BoardError::UnknownCard(id) if id == ghost));
        assert_eq!(source.board(board.id).await.unwrap().card_count(), 5);
    }

    #[tokio::test]
    async fn gesture_requires_an_open_board() {
        let source = Arc::new(InMemoryBoardSource::new());
        let handle = BoardSession::spawn(source, SessionConfig::default());

        assert!(matches!(handle.gesture_start().await, Err(BoardError::NoActiveBoard)));
        assert!(matches!(
            handle.add_card(ColumnId::from_ulid(Ulid::new()), "x").await,
            Err(BoardError::NoActiveBoard)
        ));
    }

    #[tokio::test]
    async fn ended_stream_is_resubscribed() {
        let board = roadmap();
        let (source, handle) = start(&board).await;

        source.end_subscriptions(board.id).await;
        within(until_subscribed(&source, board.id)).await;

        let card = source
            .create_card(
                NewCard {
                    column_id: board.columns[0].id,
                    title: "after reconnect".into(),
                    position: 3,
                },
                None,
            )
            .await
            .unwrap();
        until_board(&handle, |b| b.card(card.id).is_some()).await;
    }

    #[tokio::test]
    async fn switching_boards_drops_the_previous_one() {
        let first = roadmap();
        let second = roadmap();
        let (source, handle) = start(&first).await;
        source.seed(second.clone()).await;

        handle.open_board(second.id).await.unwrap();
        assert_eq!(handle.board(), Some(second.clone()));

        // pushes for the old board no longer reach the store
        source
            .create_card(
                NewCard {
                    column_id: first.columns[0].id,
                    title: "stale".into(),
                    position: 3,
                },
                None,
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.board(), Some(second));
    }

    #[tokio::test]
    async fn dropped_handle_stops_the_loop() {
        let board = roadmap();
        let (_source, handle) = start(&board).await;
        let mut status = handle.watch_status();
        status.borrow_and_update();

        drop(handle);
        within(async { while status.changed().await.is_ok() {} }).await;
    }
}
