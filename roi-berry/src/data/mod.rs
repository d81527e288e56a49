use std::io;
use std::ops::Index;
use std::path::{Path, PathBuf};

use ndarray::{Array3, ArrayView2, ArrayView3, Axis, Ix3, Zip};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use thiserror::Error;

use crate::Idx3d;

/// 读取体数据时的错误.
#[derive(Debug, Error)]
pub enum LoadError {
    /// nifti 文件无法解码.
    #[error("failed to decode `{}`: {source}", path.display())]
    Nifti {
        /// 文件路径.
        path: PathBuf,

        /// 底层错误.
        #[source]
        source: nifti::NiftiError,
    },

    /// 文件不是三维体数据 (允许第四维长度为 1).
    #[error("`{}` is not a 3-D volume (dims: {dims:?})", path.display())]
    NotVolumetric {
        /// 文件路径.
        path: PathBuf,

        /// 文件中记录的各维长度.
        dims: Vec<usize>,
    },

    /// 其他底层 I/O 错误.
    #[error("failed to read `{}`: {source}", path.display())]
    Io {
        /// 文件路径.
        path: PathBuf,

        /// 底层错误.
        #[source]
        source: io::Error,
    },
}

/// 体数据读取能力.
///
/// 批处理流程只通过该 trait 访问磁盘上的图像, 这样测试时可以替换为内存实现.
/// 实现者必须可以跨线程共享.
pub trait VolumeSource: Sync {
    /// 读取 `path` 处的三维体数据, 按 (z, 高, 宽) 顺序排列.
    fn read_volume(&self, path: &Path) -> Result<Volume, LoadError>;

    /// 只读取 `path` 处体数据的网格尺寸, 按 (z, 高, 宽) 顺序.
    ///
    /// 默认实现会读取完整数据, 实现者应尽量只读取文件头.
    fn grid_size(&self, path: &Path) -> Result<Idx3d, LoadError> {
        self.read_volume(path).map(|v| v.shape())
    }
}

/// 基于 `nifti` crate 的读取器, 支持 `.nii` 与 `.nii.gz`.
#[derive(Copy, Clone, Debug, Default)]
pub struct NiftiReader;

/// 将 (W, H, z) 转换成 (z, H, W). 以后均按照该模式访问.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    // [W, H, z]. 体素个数数组.
    let [_, w, h, z, ..] = h.dim;
    (z as usize, h as usize, w as usize)
}

impl VolumeSource for NiftiReader {
    fn read_volume(&self, path: &Path) -> Result<Volume, LoadError> {
        let nifti_err = |source| LoadError::Nifti {
            path: path.to_owned(),
            source,
        };
        let obj = ReaderOptions::new().read_file(path).map_err(nifti_err)?;
        let data = obj
            .into_volume()
            .into_ndarray::<f32>()
            .map_err(nifti_err)?;

        let dims = data.shape().to_vec();
        let data = match dims.as_slice() {
            [_, _, _] => data,
            // 单帧 4D 文件 (如部分拟合软件输出的参数图), 去掉时间维.
            [_, _, _, 1] => data.index_axis_move(Axis(3), 0),
            _ => {
                return Err(LoadError::NotVolumetric {
                    path: path.to_owned(),
                    dims: dims.clone(),
                })
            }
        };

        // [W, H, z] -> [z, H, W].
        // hint: 原第一维向下增长, 原第二维向右增长.
        let data = data
            .into_dimensionality::<Ix3>()
            .map_err(|_| LoadError::NotVolumetric {
                path: path.to_owned(),
                dims,
            })?
            .permuted_axes([2, 1, 0]);

        // The nature of nifti data field layout.
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };

        Ok(Volume::from_array(data))
    }

    fn grid_size(&self, path: &Path) -> Result<Idx3d, LoadError> {
        let header = NiftiHeader::from_file(path).map_err(|source| LoadError::Nifti {
            path: path.to_owned(),
            source,
        })?;
        Ok(get_shape_from_header(&header))
    }
}

/// 三维标量图 (参数图), 体素值以 `f32` 保存, 按 (z, 高, 宽) 顺序访问.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    data: Array3<f32>,
}

impl Index<Idx3d> for Volume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl Volume {
    /// 打开 nii 文件格式的体数据. 如果打开成功, 则返回 `Ok(Self)`, 否则返回 `Err`.
    #[inline]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        NiftiReader.read_volume(path.as_ref())
    }

    /// 直接由 (z, 高, 宽) 排列的数组创建.
    #[inline]
    pub fn from_array(data: Array3<f32>) -> Self {
        Self { data }
    }

    /// 获取数据形状大小.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 获取水平切片个数.
    #[inline]
    pub fn len_z(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// 获取第 `z_index` 层切片视图.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), z_index)
    }

    /// 消费自我, 获得底层数组.
    #[inline]
    pub fn into_array(self) -> Array3<f32> {
        self.data
    }
}

/// 三维布尔掩膜, 与配对的参数图形状一致时才有意义.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    data: Array3<bool>,
}

impl Index<Idx3d> for Mask {
    type Output = bool;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl Mask {
    /// 将体数据按 "大于 0" 解释为布尔掩膜.
    pub fn from_volume(volume: &Volume) -> Self {
        let mut data = Array3::from_elem(volume.shape(), false);
        Zip::from(&mut data)
            .and(&volume.data)
            .for_each(|m, &v| *m = v > 0.0);
        Self { data }
    }

    /// 直接由 (z, 高, 宽) 排列的布尔数组创建.
    #[inline]
    pub fn from_array(data: Array3<bool>) -> Self {
        Self { data }
    }

    /// 获取数据形状大小.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 获取水平切片个数.
    #[inline]
    pub fn len_z(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// 被选中的体素个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|p| **p).count()
    }

    /// 第 `z_index` 层切片中被选中的像素个数.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn count_at(&self, z_index: usize) -> usize {
        self.slice_at(z_index).iter().filter(|p| **p).count()
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, bool> {
        self.data.view()
    }

    /// 获取第 `z_index` 层切片视图.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> ArrayView2<'_, bool> {
        self.data.index_axis(Axis(0), z_index)
    }

    /// 消费自我, 获得底层数组.
    #[inline]
    pub fn into_array(self) -> Array3<bool> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::{Mask, Volume};
    use ndarray::Array3;

    #[test]
    fn test_mask_from_volume_is_positive() {
        let v = Volume::from_array(
            Array3::from_shape_vec((2, 1, 3), vec![0.0, 1.0, -1.0, 0.5, 0.0, 2.0]).unwrap(),
        );
        let m = Mask::from_volume(&v);
        assert_eq!(m.shape(), (2, 1, 3));
        assert_eq!(m.count(), 3);
        assert_eq!(m.count_at(0), 1);
        assert_eq!(m.count_at(1), 2);
        assert!(!m[(0, 0, 2)]);
        assert!(m[(1, 0, 0)]);
    }

    #[test]
    fn test_volume_slices() {
        let v = Volume::from_array(Array3::from_shape_fn((3, 2, 2), |(z, h, w)| {
            (z * 100 + h * 10 + w) as f32
        }));
        assert_eq!(v.len_z(), 3);
        assert_eq!(v.slice_at(2)[(1, 0)], 210.0);
        assert_eq!(v[(1, 1, 1)], 111.0);
    }
}
