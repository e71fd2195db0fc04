//! MutationDispatcher - 位置更新の送信
//!
//! 1 バッチ内の mutation は互いに独立で、順序保証なしに並行送信します。
//! 失敗はログに残すだけでローカルの store は巻き戻しません（次の snapshot が正）。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::{self, JoinSet};

use crate::domain::{BatchId, MutationBatch, PositionMutation};
use crate::ports::{RemoteBoardSource, SourceError};

use super::retry::RetryPolicy;

/// One mutation the remote source did not accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedMutation {
    pub mutation: PositionMutation,
    pub error: SourceError,
    pub attempts: u32,
}

/// Outcome of sending one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub batch_id: BatchId,
    pub succeeded: usize,
    pub failed: Vec<FailedMutation>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct MutationDispatcher {
    source: Arc<dyn RemoteBoardSource>,
    retry: RetryPolicy,
}

impl MutationDispatcher {
    pub fn new(source: Arc<dyn RemoteBoardSource>, retry: RetryPolicy) -> Self {
        Self { source, retry }
    }

    /// Sends every mutation of `batch` and waits for all of them to settle.
    #[tracing::instrument(skip_all, fields(batch = %batch.id, board_id = %batch.board_id, mutations = batch.len()))]
    pub async fn dispatch(&self, batch: MutationBatch) -> BatchReport {
        let mut tasks = JoinSet::new();
        // aborted or panicked tasks hand back only their id
        let mut spawned: HashMap<task::Id, PositionMutation> = HashMap::new();
        for mutation in batch.mutations {
            let source = Arc::clone(&self.source);
            let retry = self.retry.clone();
            let handle = tasks.spawn(async move {
                send_with_retry(source.as_ref(), &retry, mutation).await
            });
            spawned.insert(handle.id(), mutation);
        }

        let mut report = BatchReport {
            batch_id: batch.id,
            succeeded: 0,
            failed: Vec::new(),
        };
        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, outcome),
                Err(e) => {
                    tracing::error!(error = %e, "mutation task aborted");
                    let error = SourceError::Unavailable(format!("mutation task aborted: {e}"));
                    (e.id(), Err((error, 0)))
                }
            };
            let Some(mutation) = spawned.remove(&id) else {
                continue;
            };
            match outcome {
                Ok(()) => report.succeeded += 1,
                Err((error, attempts)) => {
                    tracing::warn!(
                        operation = mutation.operation(),
                        %mutation,
                        attempts,
                        error = %error,
                        "position mutation failed; local order kept until next snapshot"
                    );
                    report.failed.push(FailedMutation {
                        mutation,
                        error,
                        attempts,
                    });
                }
            }
        }

        tracing::debug!(succeeded = report.succeeded, failed = report.failed.len(), "batch settled");
        report
    }
}

async fn send_with_retry(
    source: &dyn RemoteBoardSource,
    retry: &RetryPolicy,
    mutation: PositionMutation,
) -> Result<(), (SourceError, u32)> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match send_once(source, mutation).await {
            Ok(()) => return Ok(()),
            Err(err) if retry.should_retry(attempts, &err) => {
                let delay = retry.next_delay(attempts);
                tracing::debug!(%mutation, attempts, ?delay, error = %err, "retrying position mutation");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err((err, attempts)),
        }
    }
}

async fn send_once(source: &dyn RemoteBoardSource, mutation: PositionMutation) -> Result<(), SourceError> {
    match mutation {
        PositionMutation::Column(update) => {
            source.update_column_position(update, Some(update)).await?;
        }
        PositionMutation::Card(update) => {
            source.update_card_position(update, Some(update)).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Board, BoardId, Card, CardId, CardPosition, Column, ColumnId, ColumnPosition, NewCard,
        NewColumn,
    };
    use crate::impls::InMemoryBoardSource;
    use crate::ports::Subscription;
    use async_trait::async_trait;
    use std::time::Duration;
    use ulid::Ulid;

    /// Panics while handling one card; everything else goes to `inner`.
    struct PanicsOnCard {
        inner: InMemoryBoardSource,
        card_id: CardId,
    }

    #[async_trait]
    impl RemoteBoardSource for PanicsOnCard {
        async fn fetch_board(&self, board_id: BoardId) -> Result<Board, SourceError> {
            self.inner.fetch_board(board_id).await
        }

        async fn subscribe_board(&self, board_id: BoardId) -> Result<Subscription, SourceError> {
            self.inner.subscribe_board(board_id).await
        }

        async fn update_column_position(
            &self,
            update: ColumnPosition,
            optimistic: Option<ColumnPosition>,
        ) -> Result<ColumnPosition, SourceError> {
            self.inner.update_column_position(update, optimistic).await
        }

        async fn update_card_position(
            &self,
            update: CardPosition,
            optimistic: Option<CardPosition>,
        ) -> Result<CardPosition, SourceError> {
            if update.id == self.card_id {
                panic!("card {} blew up", update.id);
            }
            self.inner.update_card_position(update, optimistic).await
        }

        async fn create_column(
            &self,
            request: NewColumn,
            optimistic: Option<NewColumn>,
        ) -> Result<Column, SourceError> {
            self.inner.create_column(request, optimistic).await
        }

        async fn create_card(
            &self,
            request: NewCard,
            optimistic: Option<NewCard>,
        ) -> Result<Card, SourceError> {
            self.inner.create_card(request, optimistic).await
        }

        async fn delete_column(
            &self,
            column_id: ColumnId,
            optimistic: Option<ColumnId>,
        ) -> Result<ColumnId, SourceError> {
            self.inner.delete_column(column_id, optimistic).await
        }

        async fn delete_card(
            &self,
            card_id: CardId,
            optimistic: Option<CardId>,
        ) -> Result<CardId, SourceError> {
            self.inner.delete_card(card_id, optimistic).await
        }
    }

    fn board() -> Board {
        let column_id = ColumnId::from_ulid(Ulid::new());
        Board {
            id: BoardId::from_ulid(Ulid::new()),
            title: "dispatch".into(),
            columns: vec![Column {
                id: column_id,
                title: "Todo".into(),
                position: 0,
                cards: (0..4)
                    .map(|p| Card {
                        id: CardId::from_ulid(Ulid::new()),
                        title: format!("c{p}"),
                        position: p,
                        column_id,
                    })
                    .collect(),
            }],
        }
    }

    fn reversed(board: &Board) -> MutationBatch {
        let column = &board.columns[0];
        MutationBatch {
            id: BatchId(1),
            board_id: board.id,
            mutations: column
                .cards
                .iter()
                .rev()
                .enumerate()
                .map(|(i, c)| {
                    PositionMutation::Card(CardPosition {
                        id: c.id,
                        position: i as u32,
                        column_id: column.id,
                    })
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_block_the_rest() {
        let board = board();
        let source = Arc::new(InMemoryBoardSource::new());
        source.seed(board.clone()).await;
        let doomed = board.columns[0].cards[2].id;
        source.fail_card(doomed, SourceError::Rejected("locked".into())).await;

        let dispatcher = MutationDispatcher::new(source.clone(), RetryPolicy::default());
        let report = dispatcher.dispatch(reversed(&board)).await;

        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].attempts, 1);

        let remote = source.fetch_board(board.id).await.unwrap();
        let remote_doomed = remote.card(doomed).unwrap();
        assert_eq!(remote_doomed.position, 2);
        assert_eq!(remote.card(board.columns[0].cards[0].id).unwrap().position, 3);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_up_to_the_limit() {
        let board = board();
        let source = Arc::new(InMemoryBoardSource::new());
        source.seed(board.clone()).await;
        let flaky = board.columns[0].cards[0].id;
        source.fail_card(flaky, SourceError::Unavailable("timeout".into())).await;

        let retry = RetryPolicy::with_backoff(3, Duration::from_millis(1), 1.0);
        let report = MutationDispatcher::new(source.clone(), retry)
            .dispatch(reversed(&board))
            .await;

        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed[0].attempts, 3);
        assert!(!report.is_clean());

        let attempts_on_flaky = source
            .received()
            .await
            .iter()
            .filter(|m| matches!(m, PositionMutation::Card(c) if c.id == flaky))
            .count();
        assert_eq!(attempts_on_flaky, 3);
    }

    #[tokio::test]
    async fn panicked_send_is_reported_as_failed() {
        let board = board();
        let inner = InMemoryBoardSource::new();
        inner.seed(board.clone()).await;
        let cursed = board.columns[0].cards[1].id;
        let source = Arc::new(PanicsOnCard {
            inner,
            card_id: cursed,
        });

        let report = MutationDispatcher::new(source.clone(), RetryPolicy::default())
            .dispatch(reversed(&board))
            .await;

        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed.len(), 1);
        let failed = &report.failed[0];
        assert!(matches!(failed.mutation, PositionMutation::Card(c) if c.id == cursed));
        assert!(matches!(failed.error, SourceError::Unavailable(_)));
        assert_eq!(failed.attempts, 0);
        assert_eq!(source.inner.received().await.len(), 3);
    }

    #[tokio::test]
    async fn empty_batch_reports_nothing() {
        let source = Arc::new(InMemoryBoardSource::new());
        let report = MutationDispatcher::new(source, RetryPolicy::default())
            .dispatch(MutationBatch {
                id: BatchId(7),
                board_id: BoardId::from_ulid(Ulid::new()),
                mutations: vec![],
            })
            .await;

        assert_eq!(report.batch_id, BatchId(7));
        assert_eq!(report.succeeded, 0);
        assert!(report.is_clean());
    }
}
