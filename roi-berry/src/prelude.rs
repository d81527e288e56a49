//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;

pub use crate::data::{Mask, NiftiReader, Volume, VolumeSource};
pub use crate::dataset::{check_consistency, Case, CaseMatcher, ImageSpec, Worklist};

pub use crate::refine::{refine, MaskFilters};
pub use crate::stats::{compute_statistics, compute_statistics_core, Statistics};

pub use crate::extract::{
    clamp_workers, Batch, CancelToken, CaseRecord, Extractor, ExtractorConfig, FailurePolicy,
    RunOptions,
};

pub use crate::consts::DEFAULT_PERCENTILES;
pub use crate::dataset::home_dataset_dir_with;
