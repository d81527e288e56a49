#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 以 "病例" 为单位, 批量计算掩膜 (mask) 区域内各参数图
//! (如 IVIM 的 `D`, `D*`, `f`) 的描述性统计量, 并汇总为一张 CSV 报表.
//!
//! # 数据组织
//!
//! 根目录下的每个直接子目录都是一个病例 (case). 病例目录的任意深度下,
//! 需要找到一个掩膜文件和 N 个参数图文件 (按文件名匹配).
//! 所有体数据必须已经重采样到相同网格, 本 crate 只检测尺寸不一致, 不做修正.
//!
//! ```text
//! root/
//! ├── case-001/
//! │   ├── IVIM-mask.nii.gz
//! │   └── maps/{D, D-star, f}.nii.gz
//! └── case-002/...
//! ```
//!
//! # 流程
//!
//! 1. [`dataset::CaseMatcher`] 扫描根目录, 生成按病例名排序的 [`Worklist`].
//! 2. (可选) [`dataset::check_consistency`] 检查病例内文件网格尺寸是否一致.
//! 3. [`refine::refine`] 用各参数图的取值范围进一步收缩掩膜.
//! 4. [`stats::compute_statistics`] 计算整体 (及逐切片) 统计量.
//! 5. [`extract::Extractor`] 串行或并行驱动上述过程, 并写出报表.
//!
//! # 注意
//!
//! 1. 串行模式下单个病例失败只会被记录并跳过; 并行模式下默认整批中止.
//!   这一不对称行为是有意保留的, 可通过 [`extract::FailurePolicy`] 覆盖.
//! 2. 掩膜选中体素为空时, 该病例视为失败 (见 [`stats::StatsError::EmptySelection`]).

/// 三维索引 / 形状, 按 (z, 高, 宽) 顺序.
pub type Idx3d = (usize, usize, usize);

/// 体数据基础结构与 nifti 读取.
pub mod data;

pub use data::{LoadError, Mask, NiftiReader, Volume, VolumeSource};

pub mod consts;

pub mod dataset;

pub use dataset::{Case, CaseMatcher, ImageSpec, Worklist};

pub mod refine;

pub mod stats;

pub use stats::Statistics;

pub mod extract;

pub use extract::{CancelToken, Extractor, ExtractorConfig};

pub mod report;

pub mod prelude;
