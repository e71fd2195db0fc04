//! App - アプリケーション層
//!
//! domain と ports を組み合わせて、ボード状態の調停を実装します。
//!
//! # 主要コンポーネント
//! - **Reconciler**: 同期・I/O なしの調停関数（store の唯一の書き手）
//! - **BoardSession / BoardHandle**: reconciler を駆動する非同期ループと UI 側ハンドル
//! - **MutationDispatcher**: 位置更新バッチの並行送信
//! - **RetryPolicy**: 一時的な失敗に対するリトライ方針
//! - **SyncStatus**: watch で公開される同期状態

pub mod dispatcher;
pub mod reconciler;
pub mod retry;
pub mod session;
pub mod status;

pub use self::dispatcher::{BatchReport, FailedMutation, MutationDispatcher};
pub use self::reconciler::Reconciler;
pub use self::retry::RetryPolicy;
pub use self::session::{BoardHandle, BoardSession};
pub use self::status::{PhaseView, SyncStatus};
