//! 病例内文件网格尺寸一致性检查.
//!
//! 这是独立的只读诊断, 与批处理主流程解耦: 它会重新扫描根目录,
//! 只报告问题, 从不中止.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::warn;

use super::CaseMatcher;
use crate::data::VolumeSource;
use crate::Idx3d;

/// 同一病例内两个文件网格尺寸不一致.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeMismatch {
    /// 病例名.
    pub case_id: String,

    /// 第一个文件及其尺寸 (z, 高, 宽).
    pub first: (PathBuf, Idx3d),

    /// 第二个文件及其尺寸 (z, 高, 宽).
    pub second: (PathBuf, Idx3d),
}

impl fmt::Display for SizeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "size mismatch in case `{}`: {} (size: {:?}) and {} (size: {:?})",
            self.case_id,
            self.first.0.display(),
            self.first.1,
            self.second.0.display(),
            self.second.1,
        )
    }
}

/// 对 `root` 下每个完整病例, 两两比较所有必需文件的网格尺寸.
///
/// 每个不一致都会以 `warn` 级别记录并收集返回. 无法读取文件头的文件会被记录并跳过.
/// 仅当 `root` 本身无法读取时返回 `Err`.
pub fn check_consistency<P, S>(
    root: P,
    matcher: &CaseMatcher,
    source: &S,
) -> io::Result<Vec<SizeMismatch>>
where
    P: AsRef<Path>,
    S: VolumeSource + ?Sized,
{
    let worklist = matcher.scan(root)?;
    let mut ans = Vec::new();

    for case in worklist.iter() {
        let sizes: Vec<(&Path, Idx3d)> = case
            .files()
            .filter_map(|p| match source.grid_size(p) {
                Ok(size) => Some((p, size)),
                Err(e) => {
                    warn!("case `{}`: skipping unreadable file: {e}", case.case_id());
                    None
                }
            })
            .collect();

        for ((p1, s1), (p2, s2)) in sizes.iter().tuple_combinations() {
            if s1 != s2 {
                let m = SizeMismatch {
                    case_id: case.case_id().to_owned(),
                    first: (p1.to_path_buf(), *s1),
                    second: (p2.to_path_buf(), *s2),
                };
                warn!("{m}");
                ans.push(m);
            }
        }
    }
    Ok(ans)
}
