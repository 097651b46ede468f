//! hunkから切り出したブロック群を束ねる、成長可能なアリーナ(partition).
//!
//! partitionは、利用者に対する割当およびリセットの単位である.
//!
//! # 典型的な使い方
//!
//! 1. partitionを一度だけ初期化する(最初のブロックがhunkから切り出される)
//! 2. 通常処理の中で、必要なサイズの領域を繰り返し割り当てる(push)
//! 3. 論理的な処理単位の終わり(e.g., フレーム毎)にリセットして、全ての領域を一度に回収する
//!
//! # 割当戦略
//!
//! 割当要求が発行されると、ブロック群を新しいものから古いものへと順に辿り、
//! 要求サイズが残り容量より真に小さい最初のブロックから領域を切り出す.
//!
//! どのブロックにも収まらない場合には、
//! `max(要求サイズを4バイト境界に切り上げた値, 最小ブロックサイズ)`のブロックをhunkから新たに切り出し、
//! それを最新のブロックとして連結した上で、その先頭から領域を割り当てる.
//!
//! リセットでは、各ブロックのマーカーを巻き戻すだけで、ブロック自体は解放されない.
//! そのため、一度ピーク時の負荷に合わせて成長したpartitionは、以後hunkを消費することなく、その容量を再利用し続ける.
//!
//! # 並行性
//!
//! マーカーやブロックの連鎖の更新は、partition毎の[`TicketMutex`]によって保護されている.
//! 同一partitionへの割当は到着順に直列化され、異なるpartitionへの操作は互いに独立して並列に実行される.
//!
//! リセットは`&mut self`を要求するので、割当済みの領域への参照が残っている間にリセットされることはない.
//!
//! [`TicketMutex`]: ../sync/struct.TicketMutex.html
use bytemuck::Pod;
use slog::Logger;
use std::cmp;
use std::mem;

pub use self::block::BlockInfo;
pub use self::builder::PartitionBuilder;

use self::block::{Block, BlockIndex, Chain};
use crate::alignment::Alignment;
use crate::hunk::{Hunk, Piece};
use crate::metrics::PartitionMetrics;
use crate::sync::TicketMutex;
use crate::{ErrorKind, Result};

mod block;
mod builder;

/// hunkから切り出したブロック群を束ねる、成長可能なアリーナ.
///
/// `Partition`は`Send`かつ`Sync`であり、複数のスレッドから同時に割当を行うことができる.
///
/// # 注意
///
/// 割当済みの領域を個別に解放する手段は存在しない.
/// 領域の回収は`reset()`による一括回収のみである.
#[derive(Debug)]
pub struct Partition {
    hunk: Hunk,
    state: TicketMutex<PartitionState>,
    clear_on_reset: bool,
    metrics: PartitionMetrics,
    logger: Logger,
}
impl Partition {
    /// デフォルト設定で、未初期化のpartitionを生成する.
    ///
    /// `PartitionBuilder::new().build(hunk)`と等しい.
    pub fn new(hunk: &Hunk) -> Self {
        PartitionBuilder::new().build(hunk)
    }

    pub(crate) fn new_with(
        hunk: Hunk,
        clear_on_reset: bool,
        metrics: PartitionMetrics,
        logger: Logger,
    ) -> Self {
        Partition {
            hunk,
            state: TicketMutex::new(PartitionState::default()),
            clear_on_reset,
            metrics,
            logger,
        }
    }

    /// partitionを初期化して、最初のブロックを割り当てる.
    ///
    /// 最初のブロックのサイズは`max(initial_size, min_block_size)`となる.
    /// `min_block_size`は以降の成長時に確保されるブロックの最小サイズであり、
    /// `0`が指定された場合には`initial_size`を4バイト境界に切り上げた値が使われる.
    ///
    /// 初期化直後のブロックの内容は、全てゼロであることが保証されている.
    ///
    /// # Errors
    ///
    /// - hunkに十分な空きがない場合には、種類が`ErrorKind::HunkFull`のエラーが返される
    ///   - この場合、partitionは未初期化のまま残る
    ///
    /// # Panics
    ///
    /// 以下の誤用は、デバッグビルドではパニックとなり、
    /// リリースビルドでは種類が`ErrorKind::InvalidInput`のエラーとなる:
    ///
    /// - 既に初期化済みのpartitionに対して呼び出された
    /// - `initial_size`が`0`
    pub fn initialize(&self, initial_size: usize, min_block_size: usize) -> Result<()> {
        misuse_assert!(initial_size > 0, "Initial size must be positive");

        let mut state = self.state.lock();
        misuse_assert!(
            !state.is_initialized(),
            "Partition is already initialized"
        );

        let min_block_size = if min_block_size == 0 {
            track_assert_some!(
                Alignment::WORD.checked_ceil_align(initial_size),
                ErrorKind::InvalidInput,
                "Too large initial size: {}",
                initial_size
            )
        } else {
            min_block_size
        };
        let block_size = cmp::max(initial_size, min_block_size);
        let piece = match self.hunk.carve_block(block_size) {
            None => {
                drop(state);

                warn!(
                    self.logger,
                    "Cannot allocate the first block";
                    "block_size" => block_size,
                    "remaining" => self.hunk.remaining()
                );
                track_panic!(
                    ErrorKind::HunkFull,
                    "Cannot allocate the first block: size={}",
                    block_size
                );
            }
            Some(piece) => piece,
        };
        state.min_block_size = min_block_size;
        state.append_block(piece);
        let capacity = state.capacity();
        drop(state);

        self.metrics.count_block(capacity);
        debug!(
            self.logger,
            "Partition is initialized";
            "block_size" => block_size,
            "min_block_size" => min_block_size
        );
        Ok(())
    }

    /// `size`バイトの領域を割り当てる.
    ///
    /// 返り値の領域は、次に`reset()`が呼ばれるまで有効である.
    /// hunkから新規に切り出されたブロックの領域は、ゼロ初期化済みであることが保証されている.
    /// リセット後に再利用される領域の内容は、`PartitionBuilder::clear_on_reset`が有効でない限り不定となる.
    ///
    /// 割当に成功したブロックのマーカーは、ちょうど`size`だけ進む.
    ///
    /// hunkの空き容量が不足しており、新しいブロックを確保できない場合には`None`が返される.
    /// この場合、partitionの状態は変化しない.
    ///
    /// # 注意
    ///
    /// 以下の誤用は、デバッグビルドではパニックとなり、リリースビルドでは`None`が返される
    /// (`size`が`0`の場合は、長さ`0`の領域が返される):
    ///
    /// - 未初期化のpartitionに対して呼び出された
    /// - `size`が`0`
    ///
    /// # Examples
    ///
    /// ```
    /// # #[macro_use] extern crate trackable;
    /// # fn main() -> trackable::result::TopLevelResult {
    /// use hunkarena::hunk::Hunk;
    /// use hunkarena::partition::PartitionBuilder;
    ///
    /// let hunk = track!(Hunk::new(4096))?;
    /// let partition = track!(PartitionBuilder::new().create(&hunk, 100))?;
    ///
    /// let a = partition.push_size(60).expect("fits in the first block");
    /// let b = partition.push_size(60).expect("fits in a new block");
    /// a.copy_from_slice(&[1; 60]);
    /// b.copy_from_slice(&[2; 60]);
    /// assert_eq!(partition.block_count(), 2);
    /// # Ok(())
    /// # }
    /// ```
    #[allow(clippy::mut_from_ref)]
    pub fn push_size(&self, size: usize) -> Option<&mut [u8]> {
        let piece = self.push_aligned(size, Alignment::BYTE)?;

        // `piece`は今回新たに割り当てた領域であり、次のリセットまで他の割当と重なることはない
        Some(unsafe { self.hunk.bytes_mut(piece) })
    }

    /// 型`T`の値一つ分の領域を割り当てる.
    ///
    /// 領域の開始位置は`T`のアライメントに揃えられる.
    /// そのため、直前のマーカー位置によっては、パディング分だけ余分にマーカーが進むことがある.
    ///
    /// # Panics
    ///
    /// `T`のアライメントが`Alignment::BLOCK`を超える場合にはパニックする.
    #[allow(clippy::mut_from_ref)]
    pub fn push_type<T: Pod>(&self) -> Option<&mut T> {
        let bytes = self.push_typed_bytes::<T>(mem::size_of::<T>())?;
        Some(bytemuck::from_bytes_mut(bytes))
    }

    /// 型`T`の値`count`個分の領域を配列として割り当てる.
    ///
    /// 領域の開始位置は`T`のアライメントに揃えられる.
    ///
    /// # Panics
    ///
    /// `T`のアライメントが`Alignment::BLOCK`を超える場合にはパニックする.
    #[allow(clippy::mut_from_ref)]
    pub fn push_array<T: Pod>(&self, count: usize) -> Option<&mut [T]> {
        let size = mem::size_of::<T>().checked_mul(count)?;
        let bytes = self.push_typed_bytes::<T>(size)?;
        Some(bytemuck::cast_slice_mut(bytes))
    }

    /// partitionをリセットして、全ての割当済み領域を回収する.
    ///
    /// 全てのブロックのマーカーが`0`に巻き戻されるが、ブロック自体は解放されず、容量は維持される.
    /// 処理時間はブロック数に比例する(`clear_on_reset`が有効な場合は、割当済みのバイト数に比例する).
    ///
    /// `&mut self`を要求するので、このpartitionから割り当てた領域への参照は、
    /// この呼び出しよりも前に全て破棄されている必要がある.
    pub fn reset(&mut self) {
        let hunk = &self.hunk;
        let clear_on_reset = self.clear_on_reset;
        let state = self.state.get_mut();
        debug_assert!(state.is_initialized(), "Partition is not initialized");

        let mut next = state.current;
        while let Some(index) = next {
            let block = &mut state.blocks[index];
            if clear_on_reset {
                // `&mut self`を保持しているので、割当済みの領域への参照は残っていない
                let bytes = unsafe { hunk.bytes_mut(block.used()) };
                for b in bytes.iter_mut() {
                    *b = 0;
                }
            }
            block.reset();
            next = block.prev();
        }

        self.metrics.resets.increment();
        debug!(self.logger, "Partition is reset"; "blocks" => state.blocks.len());
    }

    /// partitionが初期化済みかどうかを判定する.
    pub fn is_initialized(&self) -> bool {
        self.state.lock().is_initialized()
    }

    /// partitionが保持するブロックの数を返す.
    pub fn block_count(&self) -> usize {
        self.state.lock().blocks.len()
    }

    /// partitionが保持するブロック群の容量の合計を返す.
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity()
    }

    /// 割当済みのバイト数の合計を返す.
    ///
    /// アライメント調整用のパディングも含まれる.
    pub fn used_bytes(&self) -> usize {
        let state = self.state.lock();
        let used = state.chain().map(|(_, b)| b.marker()).sum();
        used
    }

    /// 成長時に確保されるブロックの最小サイズを返す.
    ///
    /// 未初期化の場合には`0`が返される.
    pub fn min_block_size(&self) -> usize {
        self.state.lock().min_block_size
    }

    /// 各ブロックの状態のスナップショットを、新しいものから順に返す.
    pub fn blocks(&self) -> Vec<BlockInfo> {
        let state = self.state.lock();
        let blocks = state.chain().map(|(_, b)| BlockInfo::from(b)).collect();
        blocks
    }

    /// ブロックの供給元のhunkを返す.
    pub fn hunk(&self) -> &Hunk {
        &self.hunk
    }

    /// partitionのメトリクスを返す.
    pub fn metrics(&self) -> &PartitionMetrics {
        &self.metrics
    }

    #[allow(clippy::mut_from_ref)]
    fn push_typed_bytes<T>(&self, size: usize) -> Option<&mut [u8]> {
        let alignment = Alignment::of::<T>();
        assert!(
            Alignment::BLOCK.contains(alignment),
            "Too large alignment: {:?}",
            alignment
        );
        let piece = self.push_aligned(size, alignment)?;

        // `push_size`と同様
        Some(unsafe { self.hunk.bytes_mut(piece) })
    }

    fn push_aligned(&self, size: usize, alignment: Alignment) -> Option<Piece> {
        debug_assert!(size > 0, "Size must be positive");

        let mut state = self.state.lock();
        debug_assert!(state.is_initialized(), "Partition is not initialized");
        if !state.is_initialized() {
            return None;
        }

        if let Some((index, offset)) = state.find_fit(size, alignment) {
            let piece = state.blocks[index].bump(offset, size);
            drop(state);

            self.metrics.count_push(size);
            return Some(piece);
        }

        // どのブロックにも収まらないので、新しいブロックを連結する
        let block_size = Alignment::WORD
            .checked_ceil_align(size)
            .map(|n| cmp::max(n, state.min_block_size));
        let block_piece = match block_size.and_then(|n| self.hunk.carve_block(n)) {
            None => {
                drop(state);

                self.metrics.nospace_failures.increment();
                warn!(
                    self.logger,
                    "Cannot grow the partition";
                    "requested" => size,
                    "block_size" => ?block_size,
                    "remaining" => self.hunk.remaining()
                );
                return None;
            }
            Some(piece) => piece,
        };
        let index = state.append_block(block_piece);
        let piece = state.blocks[index].bump(0, size);
        let capacity = state.capacity();
        drop(state);

        self.metrics.count_block(capacity);
        self.metrics.count_push(size);
        debug!(
            self.logger,
            "Partition is grown";
            "block" => index,
            "block_size" => block_piece.len,
            "requested" => size
        );
        Some(piece)
    }
}

/// `TicketMutex`によって保護される、partitionの可変な状態.
#[derive(Debug, Default)]
struct PartitionState {
    blocks: Vec<Block>,
    current: Option<BlockIndex>,
    min_block_size: usize,
}
impl PartitionState {
    fn is_initialized(&self) -> bool {
        self.current.is_some()
    }

    fn chain(&self) -> Chain<'_> {
        Chain::new(&self.blocks, self.current)
    }

    fn capacity(&self) -> usize {
        self.chain().map(|(_, b)| b.piece().len).sum()
    }

    fn find_fit(&self, size: usize, alignment: Alignment) -> Option<(BlockIndex, usize)> {
        self.chain()
            .filter_map(|(i, b)| b.fit(size, alignment).map(|offset| (i, offset)))
            .next()
    }

    fn append_block(&mut self, piece: Piece) -> BlockIndex {
        let index = self.blocks.len();
        self.blocks.push(Block::new(piece, self.current));
        self.current = Some(index);
        index
    }
}

#[cfg(test)]
mod tests {
    use slog::{Drain, Level, Never, OwnedKVList, Record};
    use std::sync::{Arc, Barrier, Mutex, Weak};
    use std::thread;
    use trackable::result::TestResult;

    use super::*;
    use crate::hunk::{Hunk, BLOCK_HEADER_SIZE};

    #[test]
    fn it_works() -> TestResult {
        let hunk = track!(Hunk::new(64 * 1024))?;
        let mut partition = Partition::new(&hunk);
        assert!(!partition.is_initialized());
        assert_eq!(partition.block_count(), 0);

        track!(partition.initialize(1024, 0))?;
        assert!(partition.is_initialized());
        assert_eq!(partition.block_count(), 1);
        assert_eq!(partition.capacity(), 1024);
        assert_eq!(partition.min_block_size(), 1024);

        let a = partition.push_size(100).unwrap();
        assert_eq!(a.len(), 100);
        assert!(a.iter().all(|&b| b == 0));
        a.copy_from_slice(&[1; 100]);

        let b = partition.push_size(200).unwrap();
        assert!(b.iter().all(|&b| b == 0));
        assert_eq!(partition.used_bytes(), 300);

        partition.reset();
        assert_eq!(partition.used_bytes(), 0);
        assert_eq!(partition.block_count(), 1);

        let m = partition.metrics();
        assert_eq!(m.blocks(), 1);
        assert_eq!(m.pushes(), 2);
        assert_eq!(m.pushed_bytes(), 300);
        assert_eq!(m.resets(), 1);
        assert_eq!(m.capacity_bytes(), 1024);
        Ok(())
    }

    #[test]
    fn pushes_within_a_block_bump_its_marker() -> TestResult {
        let hunk = track!(Hunk::new(64 * 1024))?;
        let partition = track!(PartitionBuilder::new().create(&hunk, 1000))?;

        let mut ranges = Vec::new();
        for size in &[1, 7, 64, 3, 100] {
            let before = partition.blocks()[0].marker;
            let bytes = partition.push_size(*size).unwrap();
            let start = bytes.as_ptr() as usize;
            ranges.push(start..start + bytes.len());
            assert_eq!(partition.blocks()[0].marker, before + size);
        }
        assert_eq!(partition.block_count(), 1);

        for (i, r0) in ranges.iter().enumerate() {
            for r1 in &ranges[i + 1..] {
                assert!(r0.end <= r1.start || r1.end <= r0.start);
            }
        }
        // 連続して割り当てられる
        for w in ranges.windows(2) {
            assert_eq!(w[0].end, w[1].start);
        }
        Ok(())
    }

    #[test]
    fn exact_fit_triggers_growth() -> TestResult {
        let hunk = track!(Hunk::new(64 * 1024))?;
        let partition = track!(PartitionBuilder::new().create(&hunk, 100))?;

        partition.push_size(90).unwrap();
        assert_eq!(partition.blocks()[0].remaining(), 10);

        // 残り容量とちょうど等しいサイズは、既存のブロックには収まらない
        partition.push_size(10).unwrap();
        assert_eq!(partition.block_count(), 2);

        let blocks = partition.blocks();
        assert_eq!(blocks[1].marker, 90);
        assert_eq!(blocks[0].piece.len, 100); // max(align4(10), 100)
        assert_eq!(blocks[0].marker, 10);

        // 新しいブロックから順に探索され、残り容量より小さければ古いブロックも再利用される
        partition.push_size(89).unwrap();
        partition.push_size(9).unwrap();
        let blocks = partition.blocks();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].marker, 99);
        assert_eq!(blocks[1].marker, 99);
        Ok(())
    }

    #[test]
    fn growth_appends_exactly_one_block() -> TestResult {
        let hunk = track!(Hunk::new(1024 * 1024))?;
        let partition = track!(PartitionBuilder::new()
            .min_block_size(256)
            .create(&hunk, 64))?;
        assert_eq!(partition.capacity(), 256);
        assert_eq!(partition.min_block_size(), 256);

        let mut expected_blocks = 1;
        for size in &[200, 100, 300, 1000, 7, 255] {
            let before = partition.block_count();
            let grows = partition.blocks().iter().all(|b| b.remaining() <= *size);
            partition.push_size(*size).unwrap();
            if grows {
                expected_blocks += 1;
                let newest = partition.blocks()[0];
                assert_eq!(
                    newest.piece.len,
                    cmp::max(Alignment::WORD.ceil_align(*size), 256)
                );
                assert_eq!(newest.marker, *size);
            }
            assert!(partition.block_count() - before <= 1);
            assert_eq!(partition.block_count(), expected_blocks);
            assert_eq!(partition.min_block_size(), 256);
        }
        assert_eq!(partition.metrics().blocks(), expected_blocks as u64);
        assert_eq!(
            partition.metrics().capacity_bytes(),
            partition.capacity() as u64
        );
        Ok(())
    }

    #[test]
    fn growth_rounds_up_to_word_boundary() -> TestResult {
        let hunk = track!(Hunk::new(64 * 1024))?;
        let partition = track!(PartitionBuilder::new()
            .min_block_size(8)
            .create(&hunk, 8))?;

        partition.push_size(13).unwrap();
        let blocks = partition.blocks();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].piece.len, 16);
        assert_eq!(blocks[0].marker, 13);

        // 新規ブロックからの割当には、真に小さいかどうかの判定は適用されない
        partition.push_size(20).unwrap();
        let blocks = partition.blocks();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].piece.len, 20);
        assert_eq!(blocks[0].marker, 20);
        Ok(())
    }

    #[test]
    fn reset_is_idempotent_and_preserves_capacity() -> TestResult {
        let hunk = track!(Hunk::new(64 * 1024))?;
        let mut partition = track!(PartitionBuilder::new().create(&hunk, 128))?;

        partition.push_size(64).unwrap();
        for _ in 0..10 {
            partition.push_size(100).unwrap();
        }
        let blocks = partition.block_count();
        let capacity = partition.capacity();
        let consumed = hunk.consumed();
        assert!(blocks > 1);

        partition.reset();
        partition.reset();
        assert!(partition.blocks().iter().all(|b| b.marker == 0));
        assert_eq!(partition.block_count(), blocks);
        assert_eq!(partition.capacity(), capacity);
        assert_eq!(partition.metrics().resets(), 2);

        // 単一ブロックの場合は、最初のブロックが再利用される
        let mut single = track!(PartitionBuilder::new().create(&hunk, 128))?;
        let first_of_single = single.push_size(64).unwrap().as_ptr() as usize;
        single.reset();
        let reused = single.push_size(64).unwrap().as_ptr() as usize;
        assert_eq!(reused, first_of_single);
        assert_eq!(single.block_count(), 1);

        // 成長済みのpartitionでも、hunkを追加で消費することはない
        let consumed_by_single = hunk.consumed();
        for _ in 0..10 {
            partition.push_size(100).unwrap();
        }
        assert_eq!(partition.block_count(), blocks);
        assert_eq!(hunk.consumed(), consumed_by_single);
        assert!(consumed < consumed_by_single);
        Ok(())
    }

    #[test]
    fn clear_on_reset_works() -> TestResult {
        let hunk = track!(Hunk::new(64 * 1024))?;

        let mut partition = track!(PartitionBuilder::new().create(&hunk, 64))?;
        partition.push_size(32).unwrap().copy_from_slice(&[0xFF; 32]);
        partition.reset();
        assert!(partition.push_size(32).unwrap().iter().all(|&b| b == 0xFF));

        let mut partition = track!(PartitionBuilder::new()
            .clear_on_reset(true)
            .create(&hunk, 64))?;
        partition.push_size(32).unwrap().copy_from_slice(&[0xFF; 32]);
        partition.push_size(100).unwrap().copy_from_slice(&[0xFF; 100]);
        partition.reset();
        assert!(partition.push_size(32).unwrap().iter().all(|&b| b == 0));
        assert!(partition.push_size(60).unwrap().iter().all(|&b| b == 0));
        Ok(())
    }

    #[test]
    fn hunk_exhaustion_is_reported() -> TestResult {
        let hunk = track!(Hunk::new(4096))?;
        let capacity = hunk.capacity();

        let partition = Partition::new(&hunk);
        let e = partition.initialize(capacity, 0).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::HunkFull));
        assert!(!partition.is_initialized());

        track!(partition.initialize(100, 0))?;
        let remaining = hunk.remaining();
        assert!(partition.push_size(remaining).is_none());
        assert_eq!(partition.metrics().nospace_failures(), 1);
        assert_eq!(partition.block_count(), 1);
        assert_eq!(hunk.remaining(), remaining);

        // 既存ブロックに収まるなら、hunkの状態とは無関係に成功する
        assert!(partition.push_size(50).is_some());

        // ちょうど使い切るサイズのブロックは確保できる
        let rest = remaining - BLOCK_HEADER_SIZE;
        assert!(partition.push_size(rest).is_some());
        assert_eq!(hunk.remaining(), 0);
        Ok(())
    }

    #[test]
    fn typed_pushes_are_aligned() -> TestResult {
        let hunk = track!(Hunk::new(64 * 1024))?;
        let partition = track!(PartitionBuilder::new().create(&hunk, 256))?;

        partition.push_size(3).unwrap();
        let value = partition.push_type::<u64>().unwrap();
        assert_eq!(*value, 0);
        assert_eq!(&*value as *const u64 as usize % mem::align_of::<u64>(), 0);
        *value = 0x0123_4567_89AB_CDEF;
        assert_eq!(partition.used_bytes(), 16);

        let array = partition.push_array::<u32>(10).unwrap();
        assert_eq!(array.len(), 10);
        assert_eq!(array.as_ptr() as usize % mem::align_of::<u32>(), 0);
        for (i, v) in array.iter_mut().enumerate() {
            *v = i as u32;
        }
        assert_eq!(partition.used_bytes(), 56);

        assert!(partition.push_array::<u64>(std::usize::MAX).is_none());
        Ok(())
    }

    #[test]
    fn concurrent_pushes_never_overlap() -> TestResult {
        const THREADS: usize = 16;

        let hunk = track!(Hunk::new(1024 * 1024))?;
        let partition = track!(PartitionBuilder::new().create(&hunk, 256))?;
        let barrier = Barrier::new(THREADS);

        let ranges = thread::scope(|s| {
            let handles = (0..THREADS)
                .map(|i| {
                    let partition = &partition;
                    let barrier = &barrier;
                    s.spawn(move || {
                        let pattern = i as u8 + 1;
                        let bytes = partition.push_size(i * 13 + 5).unwrap();
                        for b in bytes.iter_mut() {
                            *b = pattern;
                        }
                        barrier.wait();

                        assert!(bytes.iter().all(|&b| b == pattern));
                        let start = bytes.as_ptr() as usize;
                        start..start + bytes.len()
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });

        for (i, r0) in ranges.iter().enumerate() {
            assert_eq!(r0.len(), i * 13 + 5);
            for r1 in &ranges[i + 1..] {
                assert!(r0.end <= r1.start || r1.end <= r0.start);
            }
        }
        assert_eq!(partition.metrics().pushes(), THREADS as u64);
        Ok(())
    }

    #[test]
    fn partitions_share_a_hunk_without_overlapping() -> TestResult {
        let hunk = track!(Hunk::new(1024 * 1024))?;
        let partitions = (0..4)
            .map(|i| {
                PartitionBuilder::new()
                    .name(&format!("p{}", i))
                    .create(&hunk, 32)
            })
            .collect::<Result<Vec<_>>>()?;

        let ranges = thread::scope(|s| {
            let handles = partitions
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    s.spawn(move || {
                        (0..50)
                            .map(|j| {
                                let bytes = p.push_size(j % 40 + 1).unwrap();
                                for b in bytes.iter_mut() {
                                    *b = i as u8;
                                }
                                let start = bytes.as_ptr() as usize;
                                (i, start..start + bytes.len())
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });
        assert_eq!(ranges.len(), 200);

        let mut sorted = ranges.iter().map(|(_, r)| r.clone()).collect::<Vec<_>>();
        sorted.sort_by_key(|r| r.start);
        for w in sorted.windows(2) {
            assert!(w[0].end <= w[1].start);
        }
        for p in &partitions {
            assert!(p.block_count() > 1);
        }
        Ok(())
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn double_initialization_panics() {
        let hunk = Hunk::new(4096).unwrap();
        let partition = Partition::new(&hunk);
        partition.initialize(100, 0).unwrap();
        let _ = partition.initialize(100, 0);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn double_initialization_is_rejected() -> TestResult {
        let hunk = track!(Hunk::new(4096))?;
        let partition = Partition::new(&hunk);
        track!(partition.initialize(100, 0))?;
        let e = partition.initialize(100, 0).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::InvalidInput));
        assert_eq!(partition.block_count(), 1);
        Ok(())
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn push_before_initialization_panics() {
        let hunk = Hunk::new(4096).unwrap();
        let partition = Partition::new(&hunk);
        let _ = partition.push_size(10);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn push_before_initialization_returns_none() -> TestResult {
        let hunk = track!(Hunk::new(4096))?;
        let partition = Partition::new(&hunk);
        assert!(partition.push_size(10).is_none());
        assert_eq!(partition.block_count(), 0);
        assert_eq!(hunk.consumed(), 0);
        Ok(())
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn zero_initial_size_panics() {
        let hunk = Hunk::new(4096).unwrap();
        let partition = Partition::new(&hunk);
        let _ = partition.initialize(0, 0);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn zero_initial_size_is_rejected() -> TestResult {
        let hunk = track!(Hunk::new(4096))?;
        let partition = Partition::new(&hunk);
        let e = partition.initialize(0, 0).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::InvalidInput));
        assert!(!partition.is_initialized());
        assert_eq!(hunk.consumed(), 0);

        track!(partition.initialize(100, 0))?;
        assert_eq!(partition.block_count(), 1);
        Ok(())
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn zero_sized_push_panics() {
        let hunk = Hunk::new(4096).unwrap();
        let partition = PartitionBuilder::new().create(&hunk, 100).unwrap();
        let _ = partition.push_size(0);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn zero_sized_push_returns_empty_bytes() -> TestResult {
        let hunk = track!(Hunk::new(4096))?;
        let partition = track!(PartitionBuilder::new().create(&hunk, 100))?;
        let bytes = partition.push_size(0).unwrap();
        assert!(bytes.is_empty());
        assert_eq!(partition.used_bytes(), 0);
        assert_eq!(partition.block_count(), 1);
        Ok(())
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn reset_before_initialization_panics() {
        let hunk = Hunk::new(4096).unwrap();
        let mut partition = Partition::new(&hunk);
        partition.reset();
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn reset_before_initialization_does_nothing() -> TestResult {
        let hunk = track!(Hunk::new(4096))?;
        let mut partition = Partition::new(&hunk);
        partition.reset();
        assert!(!partition.is_initialized());
        assert_eq!(partition.block_count(), 0);

        track!(partition.initialize(100, 0))?;
        assert!(partition.push_size(10).is_some());
        Ok(())
    }

    /// 警告ログの出力時点で、partitionのロックが保持されているかどうかを記録する.
    struct LockObservingDrain {
        partition: Arc<Mutex<Weak<Partition>>>,
        observed: Arc<Mutex<Vec<bool>>>,
    }
    impl Drain for LockObservingDrain {
        type Ok = ();
        type Err = Never;
        fn log(&self, record: &Record, _: &OwnedKVList) -> std::result::Result<(), Never> {
            if record.level() == Level::Warning {
                if let Some(p) = self.partition.lock().unwrap().upgrade() {
                    self.observed.lock().unwrap().push(p.state.is_contested());
                }
            }
            Ok(())
        }
    }

    #[test]
    fn exhaustion_is_logged_without_holding_the_lock() -> TestResult {
        let target = Arc::new(Mutex::new(Weak::new()));
        let observed = Arc::new(Mutex::new(Vec::new()));
        let drain = LockObservingDrain {
            partition: Arc::clone(&target),
            observed: Arc::clone(&observed),
        };
        let logger = Logger::root(drain, o!());

        let hunk = track!(Hunk::new(4096))?;
        let partition = Arc::new(PartitionBuilder::new().logger(logger).build(&hunk));
        *target.lock().unwrap() = Arc::downgrade(&partition);

        let e = partition.initialize(hunk.capacity(), 0).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::HunkFull));

        track!(partition.initialize(100, 0))?;
        assert!(partition.push_size(hunk.remaining()).is_none());

        assert_eq!(*observed.lock().unwrap(), vec![false, false]);
        Ok(())
    }

    #[test]
    #[should_panic]
    fn too_large_alignment_panics() {
        #[derive(Clone, Copy)]
        #[repr(C, align(32))]
        struct Wide([u8; 32]);
        unsafe impl bytemuck::Zeroable for Wide {}
        unsafe impl bytemuck::Pod for Wide {}

        let hunk = Hunk::new(4096).unwrap();
        let partition = PartitionBuilder::new().create(&hunk, 256).unwrap();
        let _ = partition.push_type::<Wide>();
    }
}
