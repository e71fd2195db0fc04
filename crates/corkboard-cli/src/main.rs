use std::error::Error;
use std::sync::Arc;

use tokio::time::{Duration, sleep};
use tracing_subscriber::EnvFilter;

use corkboard_core::domain::{BoardId, CardSlot, ColumnId, GestureMove, NewCard, NewColumn};
use corkboard_core::impls::InMemoryBoardSource;
use corkboard_core::ports::RemoteBoardSource;
use corkboard_core::{BoardSession, SessionConfig};

/// 3 列のボードを remote 側に用意する
async fn seed(source: &InMemoryBoardSource) -> Result<(BoardId, Vec<ColumnId>), Box<dyn Error>> {
    let board_id = source.create_board("Launch").await;

    let mut columns = Vec::new();
    for (position, title) in ["Todo", "Doing", "Done"].into_iter().enumerate() {
        let column = source
            .create_column(
                NewColumn {
                    board_id,
                    title: title.to_string(),
                    position: position as u32,
                },
                None,
            )
            .await?;
        columns.push(column.id);
    }

    for (position, title) in ["write docs", "cut release", "announce"].into_iter().enumerate() {
        source
            .create_card(
                NewCard {
                    column_id: columns[0],
                    title: title.to_string(),
                    position: position as u32,
                },
                None,
            )
            .await?;
    }
    Ok((board_id, columns))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,corkboard_core=debug")),
        )
        .init();

    // (A) 設定（引数があれば JSON ファイルから）
    let config = match std::env::args().nth(1) {
        Some(path) => SessionConfig::from_path(path)?,
        None => SessionConfig::default(),
    };

    // (B) remote 側（レイテンシつき in-memory）
    let source = Arc::new(
        InMemoryBoardSource::new()
            .with_latency(Duration::from_millis(20))
            .with_subscription_buffer(config.subscription_buffer),
    );
    let (board_id, columns) = seed(&source).await?;

    // (C) セッションを起動してボードを開く
    let handle = BoardSession::spawn(source.clone(), config);
    handle.open_board(board_id).await?;
    sleep(Duration::from_millis(50)).await;

    // (D) ドラッグ中に別の閲覧者がカードを追加（この push は破棄される）
    handle.gesture_start().await?;
    let viewer = Arc::clone(&source);
    let done = columns[2];
    let concurrent = tokio::spawn(async move {
        viewer
            .create_card(
                NewCard {
                    column_id: done,
                    title: "hotfix (other viewer)".into(),
                    position: 0,
                },
                None,
            )
            .await
    });
    sleep(Duration::from_millis(40)).await;

    let from = CardSlot::from_droppable(&columns[0].to_string(), 0)?;
    let to = CardSlot::from_droppable(&columns[1].to_string(), 0)?;
    let batch = handle.gesture_end(Some(GestureMove::card(from, to))).await?;
    tracing::info!(?batch, "card moved Todo -> Doing");
    concurrent.await??;

    // (E) 列の並べ替え: Done を先頭へ
    handle.gesture_start().await?;
    handle.gesture_end(Some(GestureMove::column(2, 0))).await?;

    // (F) CRUD は remote の応答後に反映
    let card = handle.add_card(columns[1], "review PR").await?;
    tracing::info!(card_id = %card.id, position = card.position, "card created");

    // (G) すべてのバッチが落ち着くのを待ち、最後の push を取り込む
    handle.settled().await?;
    sleep(Duration::from_millis(100)).await;

    println!("{}", serde_json::to_string_pretty(&handle.board())?);
    println!("{}", serde_json::to_string_pretty(&handle.status())?);

    handle.shutdown().await;
    Ok(())
}
