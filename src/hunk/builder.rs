use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};
use std::cmp;

use super::region::{self, RawRegion};
use super::Hunk;
use crate::alignment::Alignment;
use crate::metrics::HunkMetrics;
use crate::{ErrorKind, Result};

/// 利用可能な物理メモリ量が取得できない場合に使われる、デフォルトのhunkサイズ.
#[cfg(target_pointer_width = "64")]
pub const DEFAULT_FALLBACK_SIZE: usize = 4 * 1024 * 1024 * 1024;

/// 利用可能な物理メモリ量が取得できない場合に使われる、デフォルトのhunkサイズ.
#[cfg(not(target_pointer_width = "64"))]
pub const DEFAULT_FALLBACK_SIZE: usize = 2 * 1024 * 1024 * 1024;

/// `Hunk`のビルダ.
///
/// hunkのサイズは、以下の優先順位で決定される:
///
/// 1. `size`で明示的に指定された値
/// 2. 現在利用可能な物理メモリ量に`available_memory_ratio`を乗じた値
/// 3. `fallback_size`で指定された値
///
/// いずれの場合も、最終的なサイズはOSのページサイズ境界に切り上げられる.
#[derive(Debug, Clone)]
pub struct HunkBuilder {
    size: Option<usize>,
    available_memory_ratio: f64,
    fallback_size: usize,
    logger: Logger,
    metrics: MetricBuilder,
}
impl HunkBuilder {
    /// 新しい`HunkBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        HunkBuilder {
            size: None,
            available_memory_ratio: 0.9,
            fallback_size: DEFAULT_FALLBACK_SIZE,
            logger: Logger::root(Discard, o!()),
            metrics: MetricBuilder::new(),
        }
    }

    /// hunkのサイズを明示的に指定する.
    ///
    /// これが指定された場合には、利用可能な物理メモリ量は参照されない.
    pub fn size(&mut self, size: usize) -> &mut Self {
        self.size = Some(size);
        self
    }

    /// 利用可能な物理メモリ量のうち、hunkに割り当てる割合を設定する.
    ///
    /// 取り得る値は、0.0より大きく1.0以下の小数である。
    /// この範囲外の値が指定された場合には、`create()`呼び出し時にエラーが返される.
    ///
    /// デフォルト値は`0.9`.
    pub fn available_memory_ratio(&mut self, ratio: f64) -> &mut Self {
        self.available_memory_ratio = ratio;
        self
    }

    /// 利用可能な物理メモリ量が取得できない環境で使われるhunkのサイズを設定する.
    ///
    /// デフォルト値は`DEFAULT_FALLBACK_SIZE`.
    pub fn fallback_size(&mut self, size: usize) -> &mut Self {
        self.fallback_size = size;
        self
    }

    /// ロガーを登録する.
    ///
    /// デフォルトでは、ログは全て破棄される.
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// メトリクス用の共通設定を登録する.
    ///
    /// デフォルト値は`MetricBuilder::new()`.
    pub fn metrics(&mut self, metrics: MetricBuilder) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// OSからメモリ領域を取得して、新規に`Hunk`を生成する.
    ///
    /// # Errors
    ///
    /// - 設定値が不正な場合には、種類が`ErrorKind::InvalidInput`のエラーが返される
    /// - OSがメモリ領域の確保に失敗した場合には、種類が`ErrorKind::Other`のエラーが返される
    pub fn create(&self) -> Result<Hunk> {
        let (size, source) = track!(self.decide_size())?;
        let region = track!(RawRegion::map(size); size, source)?;
        info!(
            self.logger,
            "Hunk is created";
            "size" => size,
            "source" => source
        );

        let metrics = HunkMetrics::new(&self.metrics, size);
        Ok(Hunk::from_region(region, metrics))
    }

    fn decide_size(&self) -> Result<(usize, &'static str)> {
        track_assert!(
            0.0 < self.available_memory_ratio && self.available_memory_ratio <= 1.0,
            ErrorKind::InvalidInput,
            "Invalid available memory ratio: {}",
            self.available_memory_ratio
        );

        let (size, source) = if let Some(size) = self.size {
            (size, "explicit")
        } else if let Some(available) = region::available_memory() {
            let size = (available as f64 * self.available_memory_ratio) as u64;
            let size = cmp::min(size, std::usize::MAX as u64) as usize;
            (size, "available_memory")
        } else {
            (self.fallback_size, "fallback")
        };
        track_assert!(
            size > 0,
            ErrorKind::InvalidInput,
            "Too small hunk size: {} (source={})",
            size,
            source
        );

        let page = track!(Alignment::new(region::page_size()))?;
        let size = track_assert_some!(
            page.checked_ceil_align(size),
            ErrorKind::InvalidInput,
            "Too large hunk size: {} (source={})",
            size,
            source
        );
        Ok((size, source))
    }
}
impl Default for HunkBuilder {
    fn default() -> Self {
        Self::new()
    }
}
