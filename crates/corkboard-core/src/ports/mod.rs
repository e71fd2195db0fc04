//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//!
//! # 設計原則
//! - サーバー（remote board source）が正本
//! - クライアントの store は楽観的更新を含むコピー

pub mod board_source;
pub mod clock;
pub mod id_generator;

pub use self::board_source::{RemoteBoardSource, SourceError, Subscription};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
