//! 批处理调度.
//!
//! [`Extractor`] 在构建时扫描一次根目录得到 [`Worklist`], 随后以串行或并行模式计算每个病例的统计记录,
//! 并最终写出一张报表.
//!
//! # 两种模式的容错差异
//!
//! | 模式 | 触发条件 | 默认策略 |
//! |------|----------|----------|
//! | 串行 | `workers < 2` | [`FailurePolicy::Isolate`]: 记录失败病例, 继续处理 |
//! | 并行 | `workers >= 2` | [`FailurePolicy::Abort`]: 任一病例失败即中止整批, 不写报表 |
//!
//! 该差异是有意保留的行为, 可通过 [`RunOptions::failure_policy`] 覆盖.

use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use thiserror::Error;

use crate::consts::{BATCH_TIMEOUT, DEFAULT_PERCENTILES};
use crate::data::{LoadError, Mask, NiftiReader, Volume, VolumeSource};
use crate::dataset::{check_consistency, Case, CaseMatcher, ImageSpec, SizeMismatch, Worklist};
use crate::refine::{refine, FilterError, MaskFilters, RefineError};
use crate::report::{self, ReportError};
use crate::stats::{compute_statistics, Statistics, StatsError};

mod cancel;
mod pool;

pub use cancel::CancelToken;

/// 配置错误. 在处理任何病例之前报告.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// 过滤规则不合法.
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// 百分位数不在 `[0, 100]` 内.
    #[error("percentile {0} is out of range [0, 100]")]
    InvalidPercentile(f64),

    /// 参数图逻辑名重复.
    #[error("image name `{0}` is configured more than once")]
    DuplicateImageName(String),
}

/// 单个病例的计算错误.
#[derive(Debug, Error)]
pub enum CaseError {
    /// 读取体数据失败.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// 精化掩膜失败.
    #[error(transparent)]
    Refine(#[from] RefineError),

    /// 统计计算失败 (如掩膜为空).
    #[error(transparent)]
    Stats(#[from] StatsError),

    /// 批处理被取消或超时, 病例在检查点处提前结束.
    #[error("case interrupted")]
    Interrupted,
}

/// 批处理运行错误. 发生这些错误时不会写出报表.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// 根目录无法读取.
    #[error("failed to scan root directory `{}`: {source}", path.display())]
    Scan {
        /// 根目录.
        path: PathBuf,

        /// 底层错误.
        #[source]
        source: io::Error,
    },

    /// 批处理被取消 (如收到 SIGINT / SIGTERM).
    #[error("batch cancelled")]
    Cancelled,

    /// 并行批处理超过整批等待上限.
    #[error("batch did not finish within {0:?}")]
    Timeout(Duration),

    /// 某病例失败, 且策略为 [`FailurePolicy::Abort`].
    #[error("case `{case_id}` failed: {source}")]
    CaseFailed {
        /// 病例名.
        case_id: String,

        /// 底层错误.
        #[source]
        source: CaseError,
    },

    /// 写出报表失败.
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// 单个病例失败时整批任务的处理方式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FailurePolicy {
    /// 记录并跳过失败病例, 报表中不含该病例.
    Isolate,

    /// 中止整批任务, 不写报表.
    Abort,
}

/// 批处理静态配置. 构建后不可变, 过滤规则也在此一次性给定.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    root_dir: PathBuf,
    output_dir: PathBuf,
    mask_file_name: String,
    images: Vec<ImageSpec>,
    percentiles: Vec<f64>,
    slice_statistics: bool,
    filters: Option<MaskFilters>,
}

impl ExtractorConfig {
    /// 构建配置. 百分位数默认为 `[5, 25, 50, 75, 95]`, 不做逐切片统计, 无过滤规则.
    ///
    /// 参数图逻辑名重复时返回 `Err`.
    pub fn new(
        root_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        mask_file_name: impl Into<String>,
        images: Vec<ImageSpec>,
    ) -> Result<Self, ConfigError> {
        for (i, image) in images.iter().enumerate() {
            if images[..i].iter().any(|s| s.name == image.name) {
                return Err(ConfigError::DuplicateImageName(image.name.clone()));
            }
        }
        Ok(Self {
            root_dir: root_dir.into(),
            output_dir: output_dir.into(),
            mask_file_name: mask_file_name.into(),
            images,
            percentiles: DEFAULT_PERCENTILES.to_vec(),
            slice_statistics: false,
            filters: None,
        })
    }

    /// 设置百分位数. 每个值必须在 `[0, 100]` 内.
    pub fn with_percentiles<I: IntoIterator<Item = f64>>(
        mut self,
        percentiles: I,
    ) -> Result<Self, ConfigError> {
        let percentiles: Vec<f64> = percentiles.into_iter().collect();
        if let Some(q) = percentiles.iter().find(|q| !(0.0..=100.0).contains(*q)) {
            return Err(ConfigError::InvalidPercentile(*q));
        }
        self.percentiles = percentiles;
        Ok(self)
    }

    /// 是否同时计算逐切片统计量.
    #[inline]
    pub fn with_slice_statistics(mut self, slice_statistics: bool) -> Self {
        self.slice_statistics = slice_statistics;
        self
    }

    /// 设置过滤规则. 键必须是已配置的参数图逻辑名, 否则返回 `Err`.
    pub fn with_filters<I, K>(mut self, filters: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, (f64, f64))>,
        K: Into<String>,
    {
        let names: Vec<&str> = self.image_names().collect();
        let filters = MaskFilters::new(filters, &names)?;
        self.filters = (!filters.is_empty()).then_some(filters);
        Ok(self)
    }

    /// 根目录.
    #[inline]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// 报表输出目录.
    #[inline]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// 掩膜文件名.
    #[inline]
    pub fn mask_file_name(&self) -> &str {
        &self.mask_file_name
    }

    /// 参数图配置.
    #[inline]
    pub fn images(&self) -> &[ImageSpec] {
        &self.images
    }

    /// 参数图逻辑名, 按配置顺序.
    pub fn image_names(&self) -> impl Iterator<Item = &str> {
        self.images.iter().map(|s| s.name.as_str())
    }

    /// 百分位数.
    #[inline]
    pub fn percentiles(&self) -> &[f64] {
        &self.percentiles
    }

    /// 是否计算逐切片统计量.
    #[inline]
    pub fn slice_statistics(&self) -> bool {
        self.slice_statistics
    }

    /// 过滤规则.
    #[inline]
    pub fn filters(&self) -> Option<&MaskFilters> {
        self.filters.as_ref()
    }

    /// 依据配置构建病例匹配器.
    pub fn matcher(&self) -> CaseMatcher {
        CaseMatcher::new(self.mask_file_name.clone(), self.images.clone())
    }
}

/// 单次运行的参数.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// 请求的工作线程数. 小于 2 时串行运行.
    pub workers: usize,

    /// 覆盖默认的失败处理策略. `None` 表示按模式取默认值.
    pub failure_policy: Option<FailurePolicy>,

    /// 并行模式下整批任务的等待上限.
    pub timeout: Duration,

    /// 是否显示进度条.
    pub progress: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            failure_policy: None,
            timeout: BATCH_TIMEOUT,
            progress: false,
        }
    }
}

impl RunOptions {
    /// 以 `workers` 个工作线程运行, 其余取默认值.
    #[inline]
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    /// 是否为并行模式.
    #[inline]
    pub fn is_parallel(&self) -> bool {
        self.workers >= 2
    }

    /// 实际生效的失败处理策略.
    #[inline]
    pub fn policy(&self) -> FailurePolicy {
        self.failure_policy.unwrap_or(if self.is_parallel() {
            FailurePolicy::Abort
        } else {
            FailurePolicy::Isolate
        })
    }
}

/// 将请求的工作线程数限制在 `[1, available - 1]` 内, 给主线程留出一个核心.
#[inline]
pub fn clamp_workers(requested: usize, available: usize) -> usize {
    requested.min(available.saturating_sub(1)).max(1)
}

/// 当前机器可用的并行度. 获取失败时退回 `num_cpus`.
#[inline]
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), NonZeroUsize::get)
}

/// 单个病例的统计记录.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseRecord {
    case_id: String,
    statistics: Statistics,
}

impl CaseRecord {
    /// 构建.
    #[inline]
    pub fn new(case_id: impl Into<String>, statistics: Statistics) -> Self {
        Self {
            case_id: case_id.into(),
            statistics,
        }
    }

    /// 病例名.
    #[inline]
    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    /// 统计量.
    #[inline]
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }
}

/// 一批任务的结果: 成功的记录 (按 worklist 顺序) 与被隔离的失败病例.
#[derive(Debug, Default)]
pub struct Batch {
    records: Vec<CaseRecord>,
    failed: Vec<(String, CaseError)>,
}

impl Batch {
    /// 成功的记录.
    #[inline]
    pub fn records(&self) -> &[CaseRecord] {
        &self.records
    }

    /// 失败病例及原因.
    #[inline]
    pub fn failed(&self) -> &[(String, CaseError)] {
        &self.failed
    }

    /// 成功的病例名.
    pub fn case_ids(&self) -> impl ExactSizeIterator<Item = &str> {
        self.records.iter().map(CaseRecord::case_id)
    }
}

/// 一次完整运行的结果.
#[derive(Debug)]
pub struct RunSummary {
    /// 报表路径.
    pub path: PathBuf,

    /// 批处理结果.
    pub batch: Batch,
}

/// 批处理器.
pub struct Extractor<S = NiftiReader> {
    config: ExtractorConfig,
    worklist: Worklist,
    source: S,
}

impl Extractor<NiftiReader> {
    /// 使用 nifti 读取器构建, 并立即扫描根目录.
    #[inline]
    pub fn new(config: ExtractorConfig) -> Result<Self, ExtractError> {
        Self::with_source(config, NiftiReader)
    }
}

impl<S: VolumeSource> Extractor<S> {
    /// 使用给定的体数据读取器构建, 并立即扫描根目录.
    pub fn with_source(config: ExtractorConfig, source: S) -> Result<Self, ExtractError> {
        let worklist = config
            .matcher()
            .scan(config.root_dir())
            .map_err(|source| ExtractError::Scan {
                path: config.root_dir().to_owned(),
                source,
            })?;
        info!(
            "Found {} complete case(s) under {}",
            worklist.len(),
            config.root_dir().display()
        );
        Ok(Self {
            config,
            worklist,
            source,
        })
    }

    /// 配置.
    #[inline]
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// 构建时扫描得到的病例列表.
    #[inline]
    pub fn worklist(&self) -> &Worklist {
        &self.worklist
    }

    /// 独立地重新扫描根目录并检查各病例的网格尺寸一致性. 只诊断, 不影响后续计算.
    pub fn check_consistency(&self) -> io::Result<Vec<SizeMismatch>> {
        check_consistency(self.config.root_dir(), &self.config.matcher(), &self.source)
    }

    /// 计算单个病例的统计记录.
    ///
    /// 依次: 读取掩膜与全部参数图, 将掩膜按 "大于 0" 解释为布尔值,
    /// 有过滤规则时精化掩膜, 再按配置顺序计算每个参数图的统计量.
    #[inline]
    pub fn compute_case(&self, case: &Case) -> Result<CaseRecord, CaseError> {
        self.compute_case_until(case, || false)
    }

    /// 同 [`Extractor::compute_case`], 但在每次读取之后与每组统计之前检查 `stop`,
    /// 为真时返回 [`CaseError::Interrupted`].
    ///
    /// 单次读取或单组统计本身不可中断.
    pub fn compute_case_until<F>(&self, case: &Case, stop: F) -> Result<CaseRecord, CaseError>
    where
        F: Fn() -> bool,
    {
        let checkpoint = || {
            if stop() {
                return Err(CaseError::Interrupted);
            }
            Ok(())
        };

        let mask = Mask::from_volume(&self.source.read_volume(case.mask())?);
        checkpoint()?;

        let mut images: Vec<(String, Volume)> = Vec::with_capacity(case.images().len());
        for (name, path) in case.images() {
            images.push((name.to_owned(), self.source.read_volume(path)?));
            checkpoint()?;
        }

        let mask = match self.config.filters() {
            Some(filters) => refine(&mask, &images, filters)?,
            None => mask,
        };

        let mut statistics = Statistics::new();
        for (name, image) in images.iter() {
            checkpoint()?;
            statistics.merge(compute_statistics(
                image.data(),
                mask.data(),
                name,
                self.config.percentiles(),
                self.config.slice_statistics(),
            )?);
        }
        Ok(CaseRecord::new(case.case_id(), statistics))
    }

    /// 计算全部病例, 但不写报表.
    ///
    /// `options.workers < 2` 时串行运行, 否则使用固定大小的工作线程池.
    /// 取消或超时后, 正在运行的病例在下一个检查点处结束 (见 [`Extractor::compute_case_until`]),
    /// 所有工作线程汇合后返回 [`ExtractError::Cancelled`] 或 [`ExtractError::Timeout`].
    pub fn extract(
        &self,
        options: &RunOptions,
        cancel: &CancelToken,
    ) -> Result<Batch, ExtractError> {
        if options.is_parallel() {
            let workers = clamp_workers(options.workers, available_parallelism());
            pool::run(self, workers, options, cancel)
        } else {
            self.run_serial(options, cancel)
        }
    }

    /// 计算全部病例并在输出目录写出报表 `statistics_{unix 秒}.csv`.
    ///
    /// 取消、超时或中止时不写报表.
    pub fn run(
        &self,
        options: &RunOptions,
        cancel: &CancelToken,
    ) -> Result<RunSummary, ExtractError> {
        let batch = self.extract(options, cancel)?;
        let path = report::write_report(self.config.output_dir(), batch.records())?;
        info!(
            "Wrote {} row(s) to {} ({} case(s) failed)",
            batch.records().len(),
            path.display(),
            batch.failed().len()
        );
        Ok(RunSummary { path, batch })
    }

    fn run_serial(
        &self,
        options: &RunOptions,
        cancel: &CancelToken,
    ) -> Result<Batch, ExtractError> {
        let policy = options.policy();
        let bar = progress_bar(self.worklist.len(), options.progress);
        let mut batch = Batch::default();

        for case in self.worklist.iter() {
            if cancel.is_cancelled() {
                bar.abandon();
                warn!("...... Exit ......");
                return Err(ExtractError::Cancelled);
            }
            match self.compute_case_until(case, || cancel.is_cancelled()) {
                Err(CaseError::Interrupted) => {
                    bar.abandon();
                    warn!("...... Exit ......");
                    return Err(ExtractError::Cancelled);
                }
                Ok(record) => batch.records.push(record),
                Err(e) => {
                    error!("error occurred in case `{}`: {e}", case.case_id());
                    if policy == FailurePolicy::Abort {
                        bar.abandon();
                        return Err(ExtractError::CaseFailed {
                            case_id: case.case_id().to_owned(),
                            source: e,
                        });
                    }
                    batch.failed.push((case.case_id().to_owned(), e));
                }
            }
            bar.inc(1);
        }

        bar.finish_and_clear();
        Ok(batch)
    }
}

/// 创建进度条. `visible` 为假时返回隐藏的进度条.
fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] Cases: [{bar:40.cyan/blue}] {pos}/{len} (eta {eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}
