//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryBoardSource**: 失敗注入つきの in-memory remote board source
//!
//! 本番用（GraphQL クライアントなど）の実装は別クレートに置く想定です。

pub mod inmem_source;

pub use self::inmem_source::InMemoryBoardSource;
