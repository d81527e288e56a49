//! 掩膜区域描述性统计.
//!
//! 每组统计量包含: `{prefix}_mean`, `{prefix}_std`, 每个百分位数 `k` 的
//! `{prefix}_p{k}`, `{prefix}_skewness`, `{prefix}_kurtosis`.
//! 逐切片统计的前缀为 `{prefix}-slice-{z}`.

use std::collections::HashMap;

use ndarray::{ArrayView, ArrayView3, Axis, Dimension, Zip};
use thiserror::Error;

pub mod moments;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 统计计算错误.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    /// 掩膜没有选中任何体素, 百分位数无定义.
    #[error("mask selects no voxel for `{prefix}`")]
    EmptySelection {
        /// 统计量前缀.
        prefix: String,
    },

    /// 数据与掩膜形状不一致.
    #[error("`{prefix}`: data shape {data:?} does not match mask shape {mask:?}")]
    ShapeMismatch {
        /// 统计量前缀.
        prefix: String,

        /// 数据形状.
        data: Vec<usize>,

        /// 掩膜形状.
        mask: Vec<usize>,
    },
}

/// 一条扁平的统计记录: 键 -> 数值, 保持插入顺序.
///
/// 重复插入同一个键时, 键的位置不变, 数值被覆盖.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    entries: Vec<(String, f64)>,
    index: HashMap<String, usize>,
}

/// 只比较有序内容, 忽略内部索引.
impl PartialEq for Statistics {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Statistics {
    /// 初始化空记录.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入或覆盖一项.
    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        let key = key.into();
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    /// 合并另一条记录, 语义同逐项 [`Statistics::insert`].
    pub fn merge(&mut self, other: Statistics) {
        for (k, v) in other.entries {
            self.insert(k, v);
        }
    }

    /// 按键取值.
    #[inline]
    pub fn get(&self, key: &str) -> Option<f64> {
        self.index.get(key).map(|&i| self.entries[i].1)
    }

    /// 项数.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按插入顺序迭代键.
    pub fn keys(&self) -> impl ExactSizeIterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// 按插入顺序迭代 (键, 值).
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// 计算 `arr` 中被 `mask` 选中元素的一组统计量.
///
/// 结果恰好包含 `2 + percentiles.len() + 2` 项.
///
/// # 错误
///
/// 1. 形状不一致时返回 [`StatsError::ShapeMismatch`].
/// 2. 选中元素为空时返回 [`StatsError::EmptySelection`]: 百分位数对空样本无定义.
///   均值等统计量在空样本上为 NaN, 但由于整组统计量无法完成, 这里不做特殊填充.
pub fn compute_statistics_core<D: Dimension>(
    arr: ArrayView<'_, f32, D>,
    mask: ArrayView<'_, bool, D>,
    prefix: &str,
    percentiles: &[f64],
) -> Result<Statistics, StatsError> {
    if arr.shape() != mask.shape() {
        return Err(StatsError::ShapeMismatch {
            prefix: prefix.to_owned(),
            data: arr.shape().to_vec(),
            mask: mask.shape().to_vec(),
        });
    }

    let mut samples = Vec::new();
    Zip::from(&arr).and(&mask).for_each(|&v, &m| {
        if m {
            samples.push(f64::from(v));
        }
    });

    let mut ans = Statistics::new();
    ans.insert(format!("{prefix}_mean"), moments::mean(&samples));
    ans.insert(format!("{prefix}_std"), moments::population_std(&samples));

    let mut sorted = samples.clone();
    moments::sort_samples(&mut sorted);
    for &q in percentiles {
        let value = moments::percentile(&sorted, q).ok_or_else(|| StatsError::EmptySelection {
            prefix: prefix.to_owned(),
        })?;
        ans.insert(format!("{prefix}_p{q}"), value);
    }

    ans.insert(format!("{prefix}_skewness"), moments::skewness(&samples));
    ans.insert(format!("{prefix}_kurtosis"), moments::kurtosis(&samples));
    Ok(ans)
}

/// 计算整体统计量; 若 `slice_statistics` 为真, 同时计算每个非空切片的统计量并合并进结果.
///
/// 切片沿第一维 (z) 编号, 掩膜在该切片上没有选中像素时跳过.
/// 整体选区为空时返回 [`StatsError::EmptySelection`].
pub fn compute_statistics(
    arr: ArrayView3<'_, f32>,
    mask: ArrayView3<'_, bool>,
    prefix: &str,
    percentiles: &[f64],
    slice_statistics: bool,
) -> Result<Statistics, StatsError> {
    let mut ans = compute_statistics_core(arr, mask, prefix, percentiles)?;
    if !slice_statistics {
        return Ok(ans);
    }

    let non_empty: Vec<usize> = mask
        .axis_iter(Axis(0))
        .enumerate()
        .filter_map(|(z, s)| s.iter().any(|m| *m).then_some(z))
        .collect();

    let per_slice = |z: usize| {
        compute_statistics_core(
            arr.index_axis(Axis(0), z),
            mask.index_axis(Axis(0), z),
            &format!("{prefix}-slice-{z}"),
            percentiles,
        )
    };

    let slices = collect_slices(non_empty, per_slice)?;

    // 按切片顺序合并.
    slices.into_iter().for_each(|s| ans.merge(s));
    Ok(ans)
}

/// 借助 `rayon`, 并行计算各切片统计量. 结果保持 `zs` 的顺序.
#[cfg(feature = "rayon")]
fn collect_slices<F>(zs: Vec<usize>, op: F) -> Result<Vec<Statistics>, StatsError>
where
    F: Fn(usize) -> Result<Statistics, StatsError> + Sync + Send,
{
    zs.into_par_iter().map(op).collect()
}

/// 依次计算各切片统计量.
#[cfg(not(feature = "rayon"))]
fn collect_slices<F>(zs: Vec<usize>, op: F) -> Result<Vec<Statistics>, StatsError>
where
    F: Fn(usize) -> Result<Statistics, StatsError>,
{
    zs.into_iter().map(op).collect()
}
