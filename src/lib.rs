//! Hunk Arena.
//!
//! `hunkarena`は、プロセス起動時に一度だけ確保した巨大なメモリ領域("hunk")から、
//! バンプポインタ方式で領域を切り出すためのアロケータ.
//!
//! # 特徴
//!
//! - 全てのメモリは、単一のゼロ初期化済みの[hunk]から切り出される
//!   - hunkは縮小も拡張もされず、切り出された領域がOSに返却されるのはhunkの破棄時のみ
//! - 利用者は[partition]単位で領域を取得する
//!   - partitionは固定長の"ブロック"の連鎖を保持し、容量が不足した場合には新しいブロックを連結して成長する
//!   - 個々の割当を解放する手段は存在せず、partition全体のリセットのみが提供される
//!   - リセットはブロック数に比例する時間で完了し、成長済みの容量は維持される
//! - 同一partitionへの操作は[ticket mutex]によって到着順(FIFO)に直列化される
//!   - 異なるpartitionへの操作は互いに独立しており、並列に実行可能
//!
//! # モジュールの依存関係
//!
//! ```text
//! partition => hunk => sync
//! ```
//!
//! - [partition]モジュール:
//!   - 主に[Partition]構造体を提供
//!   - `hunkarena`の利用者が直接触るのはこの構造体
//! - [hunk]モジュール:
//!   - 主に[Hunk]構造体を提供
//!   - OSから取得したメモリ領域を保持し、partitionにブロックを切り出す
//! - [sync]モジュール:
//!   - 主に[TicketMutex]構造体を提供
//!
//! # Examples
//!
//! ```
//! # #[macro_use] extern crate trackable;
//! # fn main() -> trackable::result::TopLevelResult {
//! use hunkarena::hunk::Hunk;
//! use hunkarena::partition::Partition;
//!
//! let hunk = track!(Hunk::new(1024 * 1024))?;
//! let mut partition = Partition::new(&hunk);
//! track!(partition.initialize(4096, 0))?;
//!
//! let bytes = partition.push_size(100).expect("enough space");
//! assert_eq!(bytes.len(), 100);
//! assert!(bytes.iter().all(|&b| b == 0));
//!
//! partition.reset();
//! assert_eq!(partition.used_bytes(), 0);
//! # Ok(())
//! # }
//! ```
//!
//! [hunk]: ./hunk/index.html
//! [Hunk]: ./hunk/struct.Hunk.html
//! [partition]: ./partition/index.html
//! [Partition]: ./partition/struct.Partition.html
//! [sync]: ./sync/index.html
//! [ticket mutex]: ./sync/struct.TicketMutex.html
//! [TicketMutex]: ./sync/struct.TicketMutex.html
#![warn(missing_docs)]
extern crate bytemuck;
extern crate libc;
extern crate prometrics;
#[macro_use]
extern crate trackable;
#[macro_use]
extern crate slog;

pub use crate::error::{Error, ErrorKind};

// 誤用の検出: デバッグビルドではパニックし、リリースビルドではエラーを返す.
macro_rules! misuse_assert {
    ($cond:expr, $($format_arg:tt)+) => {
        debug_assert!($cond, $($format_arg)+);
        track_assert!($cond, crate::ErrorKind::InvalidInput, $($format_arg)+);
    };
}

pub mod alignment;
pub mod hunk;
pub mod metrics;
pub mod partition;
pub mod sync;

mod error;

/// crate固有の`Result`型.
pub type Result<T> = std::result::Result<T, Error>;
