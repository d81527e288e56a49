//! 一维样本上的基础统计量.
//!
//! 定义与 numpy / scipy 的默认行为一致:
//!
//! - 标准差为总体标准差 (`ddof = 0`);
//! - 百分位数在顺序统计量之间线性插值;
//! - 偏度与峰度均为有偏估计, 峰度采用 Fisher 定义 (正态分布为 0).
//!
//! 空样本时 `mean` 等返回 NaN, 而 [`percentile`] 返回 `None`.
//! 样本中含 NaN 时, 所有统计量 (包括每个百分位数) 均为 NaN.
//! 方差为 0 时偏度和峰度为 NaN (0 / 0).

use ordered_float::OrderedFloat;

/// 算术平均值.
pub fn mean(samples: &[f64]) -> f64 {
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// 以 `center` 为中心的 `k` 阶矩.
#[inline]
fn central_moment(samples: &[f64], center: f64, k: i32) -> f64 {
    samples.iter().map(|x| (x - center).powi(k)).sum::<f64>() / samples.len() as f64
}

/// 总体标准差.
pub fn population_std(samples: &[f64]) -> f64 {
    central_moment(samples, mean(samples), 2).sqrt()
}

/// 有偏偏度 `m3 / m2^1.5`.
pub fn skewness(samples: &[f64]) -> f64 {
    let mu = mean(samples);
    let m2 = central_moment(samples, mu, 2);
    let m3 = central_moment(samples, mu, 3);
    m3 / m2.powf(1.5)
}

/// 有偏 Fisher 峰度 `m4 / m2^2 - 3`.
pub fn kurtosis(samples: &[f64]) -> f64 {
    let mu = mean(samples);
    let m2 = central_moment(samples, mu, 2);
    let m4 = central_moment(samples, mu, 4);
    m4 / (m2 * m2) - 3.0
}

/// 将样本升序排列. NaN 排在最后.
pub fn sort_samples(samples: &mut [f64]) {
    samples.sort_unstable_by_key(|v| OrderedFloat(*v));
}

/// 在 **已排序** 的样本上求第 `q` 百分位数 (`0 <= q <= 100`).
///
/// 排名为 `q / 100 * (n - 1)`, 在相邻两个顺序统计量之间线性插值.
/// 样本为空时返回 `None`; 样本含 NaN (排序后位于末尾) 时返回 NaN.
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    if sorted[last].is_nan() {
        return Some(f64::NAN);
    }
    let rank = (q / 100.0).clamp(0.0, 1.0) * last as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    let (a, b) = (sorted[lo], sorted[hi]);
    if frac == 0.0 {
        Some(a)
    } else {
        Some(a + (b - a) * frac)
    }
}
