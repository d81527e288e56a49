//! 对 `roi-berry::dataset` 的更一层封装. 提供默认的数据集与输出路径.

use std::env;
use std::path::PathBuf;

/// 根目录环境变量.
pub const ROOT_ENV: &str = "ROI_BERRY_ROOT";

/// 报表输出目录环境变量.
pub const OUTPUT_ENV: &str = "ROI_BERRY_OUTPUT";

/// 获取病例根目录.
///
/// 1. 若环境变量 `$ROI_BERRY_ROOT` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/cases`. 无法确定主目录时返回 `None`.
pub fn root_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var(ROOT_ENV) {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => roi_berry::dataset::home_dataset_dir_with(["cases"]),
    }
}

/// 获取报表输出目录.
///
/// 1. 若环境变量 `$ROI_BERRY_OUTPUT` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/reports`. 无法确定主目录时返回 `None`.
pub fn output_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var(OUTPUT_ENV) {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => roi_berry::dataset::home_dataset_dir_with(["reports"]),
    }
}
