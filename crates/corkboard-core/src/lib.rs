//! corkboard-core
//!
//! Client-side state reconciliation for a collaborative kanban board.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, board, moves, sequencer, state, intents, mutation, errors）
//! - **store**: Board State Store（クライアント側のボードのコピー）
//! - **ports**: 抽象化レイヤー（RemoteBoardSource, Clock, IdGenerator）
//! - **app**: Reconciler, BoardSession, MutationDispatcher
//! - **impls**: 実装（InMemoryBoardSource など開発用）
//! - **config**: SessionConfig

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod store;

pub use app::{BoardHandle, BoardSession, Reconciler, SyncStatus};
pub use config::SessionConfig;
pub use domain::BoardError;
