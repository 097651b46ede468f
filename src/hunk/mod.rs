//! 全てのpartitionの領域の供給源となるメモリ領域(hunk).
//!
//! hunkは、プロセス起動時に一度だけOSから取得される、ゼロ初期化済みの巨大なバイト列である.
//!
//! hunk自体は「リセットも排他制御もされない単一ブロックのアリーナ」に近いもので、
//! 先頭から順に、ブロックのヘッダ用の領域とデータ用の領域を切り出していくだけの単純な構造となっている.
//! 一度切り出された領域が再利用されることはなく、OSに返却されるのは、
//! 全ての`Hunk`ハンドルが破棄された時点のみである.
//!
//! 複数のpartitionが同時に成長する可能性があるので、
//! 切り出し位置の更新は、hunk全体で共有される[`TicketMutex`]によって保護されている.
//!
//! [`TicketMutex`]: ../sync/struct.TicketMutex.html
use std::cmp;
use std::sync::Arc;

pub use self::builder::HunkBuilder;
pub use self::piece::Piece;

use self::region::RawRegion;
use crate::alignment::Alignment;
use crate::metrics::HunkMetrics;
use crate::sync::TicketMutex;
use crate::Result;

mod builder;
mod piece;
mod region;

/// ブロック一つ毎に、データ領域の手前に予約されるヘッダ領域のサイズ.
///
/// ブロックの管理情報(データ領域の位置とサイズ、マーカー、前のブロックへのリンク)の四ワード分に相当する.
pub const BLOCK_HEADER_SIZE: usize = 4 * std::mem::size_of::<usize>();

/// partition群にブロックを供給するメモリ領域.
///
/// 内部的には参照カウントで管理されているので、`clone`は安価に行える.
/// 各partitionは、自身のブロックの供給元となる`Hunk`のハンドルを明示的に保持する.
#[derive(Debug, Clone)]
pub struct Hunk {
    inner: Arc<HunkInner>,
}
impl Hunk {
    /// デフォルト設定で、指定サイズの`Hunk`インスタンスを生成する.
    ///
    /// サイズはOSのページサイズ境界に切り上げられる.
    pub fn new(size: usize) -> Result<Self> {
        track!(HunkBuilder::new().size(size).create())
    }

    pub(crate) fn from_region(region: RawRegion, metrics: HunkMetrics) -> Self {
        Hunk {
            inner: Arc::new(HunkInner {
                region,
                used: TicketMutex::new(0),
                metrics,
            }),
        }
    }

    /// hunkの容量(バイト単位)を返す.
    pub fn capacity(&self) -> usize {
        self.inner.region.len()
    }

    /// 既に切り出し済みのバイト数を返す.
    ///
    /// ブロックのヘッダ領域やアライメント用のパディングも含まれる.
    pub fn consumed(&self) -> usize {
        *self.inner.used.lock()
    }

    /// まだ切り出されていないバイト数を返す.
    pub fn remaining(&self) -> usize {
        self.capacity() - self.consumed()
    }

    /// hunkのメトリクスを返す.
    pub fn metrics(&self) -> &HunkMetrics {
        &self.inner.metrics
    }

    /// ブロック一つ分の領域を切り出す.
    ///
    /// ヘッダ領域(`BLOCK_HEADER_SIZE`)と、ちょうど`size`バイトのデータ領域を連続して確保し、
    /// データ領域の方を返す.
    /// 切り出される領域の開始位置は、常に`Alignment::BLOCK`の境界に揃えられている.
    ///
    /// 両方の領域を確保できるだけの空きがない場合には`None`が返され、hunkの状態は変化しない.
    ///
    /// 呼び出し元はpartitionのロックを保持しているので、ここではログ出力を行わない.
    pub(crate) fn carve_block(&self, size: usize) -> Option<Piece> {
        let capacity = self.capacity();
        let mut used = self.inner.used.lock();
        let start = *used;
        let end = start
            .checked_add(BLOCK_HEADER_SIZE)
            .and_then(|n| n.checked_add(size))
            .filter(|&end| end <= capacity);
        if let Some(end) = end {
            let next = cmp::min(Alignment::BLOCK.ceil_align(end), capacity);
            *used = next;
            drop(used);

            self.inner.metrics.count_carving(next - start);
            Some(Piece {
                start: start + BLOCK_HEADER_SIZE,
                len: size,
            })
        } else {
            drop(used);

            self.inner.metrics.nospace_failures.increment();
            None
        }
    }

    /// 指定された部分領域のバイト列を返す.
    ///
    /// # Safety
    ///
    /// - `piece`はこのhunkから切り出された領域に含まれていなければならない
    /// - 返り値が生存している間、同じ領域に対する他の参照が存在してはならない
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn bytes_mut(&self, piece: Piece) -> &mut [u8] {
        debug_assert!(piece.end() <= self.capacity(), "{:?}", piece);
        std::slice::from_raw_parts_mut(self.inner.region.as_ptr().add(piece.start), piece.len)
    }
}

#[derive(Debug)]
struct HunkInner {
    region: RawRegion,
    used: TicketMutex<usize>,
    metrics: HunkMetrics,
}
