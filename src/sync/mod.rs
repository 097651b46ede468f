//! partitionやhunkが利用する同期プリミティブ群.
//!
//! 保護対象のクリティカルセクションは、マーカーの更新やブロックの連結といった
//! ごく短い処理に限られるので、OSの待機プリミティブではなくスピンロックを採用している.
pub use self::ticket_mutex::{TicketMutex, TicketMutexGuard};

mod ticket_mutex;
