//! Domain identifiers (strongly-typed IDs).
//!
//! Board / Column / Card の ID はサーバー（Remote Board Source）が採番します。
//! クライアントは ID を生成せず、受け取った値をそのまま使います。
//!
//! ## Phantom Type パターン
//! `Id<T>` で共通実装を持ちつつ、`T` はマーカー型としてコンパイル時にだけ使います。
//! `ColumnId` を `CardId` の場所に渡すようなミスは型エラーになります。
//!
//! Wire format is the bare ULID string (`#[serde(transparent)]`); `Display`
//! adds a kind prefix (`column-01H...`), which is also the shape droppable
//! containers are named with in the gesture layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// Display で使うプレフィックス（例: "board-", "card-"）
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は PhantomData なので実行時のサイズは `Ulid` と同じ 16 bytes です。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// ULID から Id を作成
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// 内部の ULID を取得
    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Error returned when an identifier string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} id '{input}'")]
pub struct IdParseError {
    pub kind: &'static str,
    pub input: String,
}

impl<T: IdMarker> FromStr for Id<T> {
    type Err = IdParseError;

    /// Accepts both the prefixed display form and the bare ULID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self::from_ulid)
            .map_err(|_| IdParseError {
                kind: T::prefix().trim_end_matches('-'),
                input: s.to_string(),
            })
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Board のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BoardKind {}

impl IdMarker for BoardKind {
    fn prefix() -> &'static str {
        "board-"
    }
}

/// Column のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnKind {}

impl IdMarker for ColumnKind {
    fn prefix() -> &'static str {
        "column-"
    }
}

/// Card のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CardKind {}

impl IdMarker for CardKind {
    fn prefix() -> &'static str {
        "card-"
    }
}

/// Identifier of a board.
pub type BoardId = Id<BoardKind>;

/// Identifier of a column (unique across boards).
pub type ColumnId = Id<ColumnKind>;

/// Identifier of a card (unique across boards).
pub type CardId = Id<CardKind>;
