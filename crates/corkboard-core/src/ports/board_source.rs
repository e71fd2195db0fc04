//! RemoteBoardSource port - ボードの正本（source of truth）
//!
//! 実装はサーバー側の ordered-record store（query / mutation / subscription）。
//! トランスポート（GraphQL など）の詳細はこの trait の裏に隠れます。
//!
//! # 実装
//! - `impls::InMemoryBoardSource`: 開発・テスト用

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{
    Board, BoardId, Card, CardId, CardPosition, Column, ColumnId, ColumnPosition, NewCard,
    NewColumn,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("board {0} not found")]
    NotFound(BoardId),

    /// The source refused the request; retrying will not help.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The source could not be reached or timed out.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Unavailable(_))
    }
}

/// A live stream of snapshots for one board.
///
/// Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<Board>,
}

impl Subscription {
    pub fn new(receiver: mpsc::Receiver<Board>) -> Self {
        Self { receiver }
    }

    /// Next snapshot, or `None` once the source ends the stream.
    pub async fn next(&mut self) -> Option<Board> {
        self.receiver.recv().await
    }
}

/// RemoteBoardSource は snapshot の取得・購読と、位置更新 / CRUD の mutation を提供
///
/// `optimistic` は呼び出し側がローカルに既に反映済みだと主張する値です。
/// トランスポート側のキャッシュが一瞬古い状態を描画しないために渡します。
#[async_trait]
pub trait RemoteBoardSource: Send + Sync {
    async fn fetch_board(&self, board_id: BoardId) -> Result<Board, SourceError>;

    async fn subscribe_board(&self, board_id: BoardId) -> Result<Subscription, SourceError>;

    async fn update_column_position(
        &self,
        update: ColumnPosition,
        optimistic: Option<ColumnPosition>,
    ) -> Result<ColumnPosition, SourceError>;

    async fn update_card_position(
        &self,
        update: CardPosition,
        optimistic: Option<CardPosition>,
    ) -> Result<CardPosition, SourceError>;

    /// `optimistic` は作成後に見えるはずの形（id はまだ無い）。
    async fn create_column(
        &self,
        request: NewColumn,
        optimistic: Option<NewColumn>,
    ) -> Result<Column, SourceError>;

    async fn create_card(
        &self,
        request: NewCard,
        optimistic: Option<NewCard>,
    ) -> Result<Card, SourceError>;

    /// `optimistic` は呼び出し側が既に消したものとして扱っている id。
    async fn delete_column(
        &self,
        column_id: ColumnId,
        optimistic: Option<ColumnId>,
    ) -> Result<ColumnId, SourceError>;

    async fn delete_card(
        &self,
        card_id: CardId,
        optimistic: Option<CardId>,
    ) -> Result<CardId, SourceError>;
}
