use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};

use super::Partition;
use crate::hunk::Hunk;
use crate::metrics::PartitionMetrics;
use crate::Result;

/// `Partition`のビルダ.
#[derive(Debug, Clone)]
pub struct PartitionBuilder {
    name: String,
    min_block_size: usize,
    clear_on_reset: bool,
    logger: Logger,
    metrics: MetricBuilder,
}
impl PartitionBuilder {
    /// 新しい`PartitionBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        PartitionBuilder {
            name: "default".to_owned(),
            min_block_size: 0,
            clear_on_reset: false,
            logger: Logger::root(Discard, o!()),
            metrics: MetricBuilder::new(),
        }
    }

    /// partitionの名前を設定する.
    ///
    /// ログの`partition`キーや、メトリクスの`partition`ラベルの値として使われる.
    ///
    /// デフォルト値は`"default"`.
    pub fn name(&mut self, name: &str) -> &mut Self {
        self.name = name.to_owned();
        self
    }

    /// 成長時に確保されるブロックの最小サイズを設定する.
    ///
    /// `0`が指定された場合には、初期サイズを4バイト境界に切り上げた値が使われる.
    ///
    /// この値は`create()`による初期化時にのみ参照される.
    /// (`Partition::initialize()`を直接呼び出す場合には、その引数が優先される)
    ///
    /// デフォルト値は`0`.
    pub fn min_block_size(&mut self, size: usize) -> &mut Self {
        self.min_block_size = size;
        self
    }

    /// リセット時に、割当済みだった領域をゼロで埋めるかどうかを設定する.
    ///
    /// これを有効にすると、リセット後の割当でも、hunkから新規に切り出された領域と同様に
    /// ゼロ初期化済みのバイト列が返されるようになる.
    /// ただし、リセットのコストがブロック数ではなく割当済みのバイト数に比例するようになる.
    ///
    /// デフォルト値は`false`.
    pub fn clear_on_reset(&mut self, enabled: bool) -> &mut Self {
        self.clear_on_reset = enabled;
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

    /// 未初期化のpartitionを生成する.
    ///
    /// 領域を割り当てる前に、`Partition::initialize()`を一度だけ呼び出す必要がある.
    pub fn build(&self, hunk: &Hunk) -> Partition {
        let logger = self.logger.new(o!("partition" => self.name.clone()));
        let metrics = PartitionMetrics::new(&self.metrics, &self.name);
        Partition::new_with(hunk.clone(), self.clear_on_reset, metrics, logger)
    }

    /// partitionを生成し、`initial_size`バイトの最初のブロックを割り当てる.
    ///
    /// # Errors
    ///
    /// - hunkに十分な空きがない場合には、種類が`ErrorKind::HunkFull`のエラーが返される
    /// - `initial_size`が`0`の場合には、種類が`ErrorKind::InvalidInput`のエラーが返される
    ///   (デバッグビルドではパニックする)
    pub fn create(&self, hunk: &Hunk, initial_size: usize) -> Result<Partition> {
        let partition = self.build(hunk);
        track!(partition.initialize(initial_size, self.min_block_size))?;
        Ok(partition)
    }
}
impl Default for PartitionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
