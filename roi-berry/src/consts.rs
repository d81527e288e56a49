//! 通用常量.

use std::time::Duration;

/// 默认计算的百分位数.
pub const DEFAULT_PERCENTILES: [f64; 5] = [5.0, 25.0, 50.0, 75.0, 95.0];

/// 并行模式下整批任务的等待上限. 没有单个病例级别的超时.
pub const BATCH_TIMEOUT: Duration = Duration::from_secs(888_888);

/// 并行模式下, 主线程检查取消信号和超时的间隔.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 报表中病例名一列的列名. 该列总是第一列.
pub const CASE_ID_COLUMN: &str = "case_id";

/// 报表文件名前缀, 完整文件名为 `statistics_{unix 秒}.csv`.
pub const REPORT_PREFIX: &str = "statistics";
