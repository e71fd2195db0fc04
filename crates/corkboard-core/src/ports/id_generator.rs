//! IdGenerator port - ID 生成の抽象化
//!
//! ID を採番するのはサーバー側（remote source の実装）だけです。
//! クライアントの reconciler は ID を生成しません。

use crate::domain::ids::{BoardId, CardId, ColumnId, Id, IdMarker};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は ID を生成
pub trait IdGenerator: Send + Sync {
    fn generate_board_id(&self) -> BoardId;

    fn generate_column_id(&self) -> ColumnId;

    fn generate_card_id(&self) -> CardId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// timestamp 部分は Clock から取るので、FixedClock を使えば時刻部分が決定的になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn generate<T: IdMarker>(&self) -> Id<T> {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Id::from_ulid(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_board_id(&self) -> BoardId {
        self.generate()
    }

    fn generate_column_id(&self) -> ColumnId {
        self.generate()
    }

    fn generate_card_id(&self) -> CardId {
        self.generate()
    }
}
