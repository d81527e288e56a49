//! 数据集操作: 病例发现与文件匹配.
//!
//! 根目录的每个直接子目录都是一个病例. 在病例子树的任意深度下按 **文件名**
//! 查找掩膜文件和各参数图文件. 匹配只看名字, 不看内容.

use std::collections::HashMap;
use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

mod check;

pub use check::{check_consistency, SizeMismatch};

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = home_dataset_dir()?;
    ans.extend(it);
    Some(ans)
}

/// 一个参数图的配置: 逻辑名 (报表列名前缀) 与磁盘上的文件名.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageSpec {
    /// 逻辑名, 如 `D*`.
    pub name: String,

    /// 文件名 (不含目录), 如 `D-star.nii.gz`.
    pub file_name: String,
}

impl ImageSpec {
    /// 构建.
    #[inline]
    pub fn new(name: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_name: file_name.into(),
        }
    }
}

/// 一个病例: 一个掩膜文件和若干个参数图文件.
///
/// 只有在所有必需文件都找到时才会被创建. 创建后不可变.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Case {
    case_id: String,
    mask: PathBuf,
    images: Vec<(String, PathBuf)>,
}

impl Case {
    /// 病例名, 即子目录名.
    #[inline]
    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    /// 掩膜文件路径.
    #[inline]
    pub fn mask(&self) -> &Path {
        &self.mask
    }

    /// (参数图逻辑名, 文件路径), 按配置顺序排列.
    #[inline]
    pub fn images(&self) -> impl ExactSizeIterator<Item = (&str, &Path)> {
        self.images.iter().map(|(n, p)| (n.as_str(), p.as_path()))
    }

    /// 按逻辑名获取参数图文件路径.
    pub fn image(&self, name: &str) -> Option<&Path> {
        self.images
            .iter()
            .find_map(|(n, p)| (n == name).then_some(p.as_path()))
    }

    /// 病例涉及的所有文件: 掩膜在前, 参数图按配置顺序在后.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.mask.as_path()).chain(self.images.iter().map(|(_, p)| p.as_path()))
    }
}

/// 按病例名字典序排列的待处理病例列表.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Worklist {
    cases: Vec<Case>,
}

/// 对 `Worklist` 的访问本质上是对 `[Case]` 的访问.
impl Deref for Worklist {
    type Target = [Case];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.cases
    }
}

impl IntoIterator for Worklist {
    type Item = Case;
    type IntoIter = std::vec::IntoIter<Case>;

    fn into_iter(self) -> Self::IntoIter {
        self.cases.into_iter()
    }
}

impl<'a> IntoIterator for &'a Worklist {
    type Item = &'a Case;
    type IntoIter = std::slice::Iter<'a, Case>;

    fn into_iter(self) -> Self::IntoIter {
        self.cases.iter()
    }
}

impl Worklist {
    /// 病例名列表.
    pub fn case_ids(&self) -> impl ExactSizeIterator<Item = &str> {
        self.cases.iter().map(Case::case_id)
    }
}

/// 病例匹配器. 持有掩膜文件名和参数图配置.
#[derive(Debug, Clone)]
pub struct CaseMatcher {
    mask_file_name: String,
    images: Vec<ImageSpec>,
}

impl CaseMatcher {
    /// 初始化.
    pub fn new(mask_file_name: impl Into<String>, images: Vec<ImageSpec>) -> Self {
        Self {
            mask_file_name: mask_file_name.into(),
            images,
        }
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

    /// 必需文件名清单: 掩膜在前.
    pub fn checklist(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.mask_file_name.as_str())
            .chain(self.images.iter().map(|s| s.file_name.as_str()))
    }

    /// 扫描 `root` 下所有病例, 返回按病例名排序的 [`Worklist`].
    ///
    /// 只有子目录会被视为病例; 缺少任一必需文件的病例被静默忽略.
    /// `root` 不存在或不可读时返回 `Err`.
    pub fn scan<P: AsRef<Path>>(&self, root: P) -> io::Result<Worklist> {
        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(root.as_ref())? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                dirs.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
            }
        }
        dirs.sort();

        let cases = dirs
            .into_iter()
            .filter_map(|(case_id, dir)| self.match_case(case_id, &dir))
            .collect();
        Ok(Worklist { cases })
    }

    /// 在 `dir` 子树中查找所有必需文件, 若全部找到则构建 [`Case`].
    ///
    /// 同名文件出现多次时, 以遍历中最后遇到的为准 (遍历按文件名排序, 结果确定).
    /// 子树中无法读取的条目被忽略.
    pub fn match_case(&self, case_id: impl Into<String>, dir: &Path) -> Option<Case> {
        let mut found: HashMap<&str, PathBuf> = HashMap::new();
        let checklist: Vec<&str> = self.checklist().collect();

        for entry in WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let key = {
                let name = entry.file_name().to_string_lossy();
                checklist.iter().copied().find(|k| *k == name)
            };
            if let Some(key) = key {
                found.insert(key, entry.into_path());
            }
        }

        let mask = found.get(self.mask_file_name.as_str())?.clone();
        let images = self
            .images
            .iter()
            .map(|s| Some((s.name.clone(), found.get(s.file_name.as_str())?.clone())))
            .collect::<Option<Vec<_>>>()?;

        Some(Case {
            case_id: case_id.into(),
            mask,
            images,
        })
    }
}
