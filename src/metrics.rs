//! [Prometheus][prometheus]用のメトリクス.
//!
//! [prometheus]: https://prometheus.io/
use prometrics::metrics::{Counter, Gauge, MetricBuilder};

/// [`Hunk`]のメトリクス.
///
/// [`Hunk`]: ../hunk/struct.Hunk.html
#[derive(Debug, Clone)]
pub struct HunkMetrics {
    pub(crate) capacity_bytes: Gauge,
    pub(crate) carved_blocks: Counter,
    pub(crate) carved_bytes: Counter,
    pub(crate) nospace_failures: Counter,
}
impl HunkMetrics {
    /// hunkの容量.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// hunkarena_hunk_capacity_bytes <GAUGE>
    /// ```
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes.value() as u64
    }

    /// hunkから切り出されたブロックの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// hunkarena_hunk_carved_blocks_total <COUNTER>
    /// ```
    pub fn carved_blocks(&self) -> u64 {
        self.carved_blocks.value() as u64
    }

    /// hunkから切り出されたバイト数の合計.
    ///
    /// ブロックのデータ部分だけではなく、ヘッダ用の領域やアライメント用のパディングも含まれる.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// hunkarena_hunk_carved_bytes_total <COUNTER>
    /// ```
    pub fn carved_bytes(&self) -> u64 {
        self.carved_bytes.value() as u64
    }

    /// 空き容量不足によるブロックの切り出し失敗回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// hunkarena_hunk_nospace_failures_total <COUNTER>
    /// ```
    pub fn nospace_failures(&self) -> u64 {
        self.nospace_failures.value() as u64
    }

    /// hunkの残り容量.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// hunkarena_hunk_capacity_bytes - hunkarena_hunk_carved_bytes_total
    /// ```
    pub fn remaining_bytes(&self) -> u64 {
        self.capacity_bytes() - self.carved_bytes()
    }

    pub(crate) fn new(builder: &MetricBuilder, capacity_bytes: usize) -> Self {
        let mut builder = builder.clone();
        builder.namespace("hunkarena").subsystem("hunk");
        let metrics = HunkMetrics {
            capacity_bytes: builder
                .gauge("capacity_bytes")
                .help("Capacity of the hunk")
                .finish()
                .expect("Never fails"),
            carved_blocks: builder
                .counter("carved_blocks_total")
                .help("Number of blocks carved out of the hunk")
                .finish()
                .expect("Never fails"),
            carved_bytes: builder
                .counter("carved_bytes_total")
                .help("Number of bytes carved out of the hunk")
                .finish()
                .expect("Never fails"),
            nospace_failures: builder
                .counter("nospace_failures_total")
                .help("Number of block carving failures caused by no available space")
                .finish()
                .expect("Never fails"),
        };
        metrics.capacity_bytes.set(capacity_bytes as f64);
        metrics
    }

    pub(crate) fn count_carving(&self, carved_bytes: usize) {
        self.carved_blocks.increment();
        self.carved_bytes.add_u64(carved_bytes as u64);
    }
}

/// [`Partition`]のメトリクス.
///
/// 全てのメトリクスは`partition="${NAME}"`ラベルを持つ.
///
/// [`Partition`]: ../partition/struct.Partition.html
#[derive(Debug, Clone)]
pub struct PartitionMetrics {
    pub(crate) capacity_bytes: Gauge,
    pub(crate) blocks: Counter,
    pub(crate) pushes: Counter,
    pub(crate) pushed_bytes: Counter,
    pub(crate) resets: Counter,
    pub(crate) nospace_failures: Counter,
}
impl PartitionMetrics {
    /// partitionが保持するブロック群の容量の合計.
    ///
    /// リセットによって減少することはない.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// hunkarena_partition_capacity_bytes { partition="${NAME}" } <GAUGE>
    /// ```
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes.value() as u64
    }

    /// partitionが保持するブロックの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// hunkarena_partition_blocks_total { partition="${NAME}" } <COUNTER>
    /// ```
    pub fn blocks(&self) -> u64 {
        self.blocks.value() as u64
    }

    /// 割当(push)に成功した回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// hunkarena_partition_pushes_total { partition="${NAME}" } <COUNTER>
    /// ```
    pub fn pushes(&self) -> u64 {
        self.pushes.value() as u64
    }

    /// これまでに割り当てたバイト数の合計.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// hunkarena_partition_pushed_bytes_total { partition="${NAME}" } <COUNTER>
    /// ```
    pub fn pushed_bytes(&self) -> u64 {
        self.pushed_bytes.value() as u64
    }

    /// リセット回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// hunkarena_partition_resets_total { partition="${NAME}" } <COUNTER>
    /// ```
    pub fn resets(&self) -> u64 {
        self.resets.value() as u64
    }

    /// hunkの空き容量不足による割当失敗回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// hunkarena_partition_nospace_failures_total { partition="${NAME}" } <COUNTER>
    /// ```
    pub fn nospace_failures(&self) -> u64 {
        self.nospace_failures.value() as u64
    }

    pub(crate) fn new(builder: &MetricBuilder, name: &str) -> Self {
        let mut builder = builder.clone();
        builder.namespace("hunkarena").subsystem("partition");
        PartitionMetrics {
            capacity_bytes: builder
                .gauge("capacity_bytes")
                .help("Total capacity of the blocks owned by the partition")
                .label("partition", name)
                .finish()
                .expect("Never fails"),
            blocks: builder
                .counter("blocks_total")
                .help("Number of blocks owned by the partition")
                .label("partition", name)
                .finish()
                .expect("Never fails"),
            pushes: builder
                .counter("pushes_total")
                .help("Number of successful pushes")
                .label("partition", name)
                .finish()
                .expect("Never fails"),
            pushed_bytes: builder
                .counter("pushed_bytes_total")
                .help("Number of pushed bytes")
                .label("partition", name)
                .finish()
                .expect("Never fails"),
            resets: builder
                .counter("resets_total")
                .help("Number of partition resets")
                .label("partition", name)
                .finish()
                .expect("Never fails"),
            nospace_failures: builder
                .counter("nospace_failures_total")
                .help("Number of push failures caused by no available space in the hunk")
                .label("partition", name)
                .finish()
                .expect("Never fails"),
        }
    }

    pub(crate) fn count_block(&self, capacity_bytes: usize) {
        self.blocks.increment();
        self.capacity_bytes.set(capacity_bytes as f64);
    }

    pub(crate) fn count_push(&self, size: usize) {
        self.pushes.increment();
        self.pushed_bytes.add_u64(size as u64);
    }
}
