//! 掩膜精化: 用参数图的取值范围进一步收缩掩膜.
//!
//! 结果为原掩膜与每条过滤规则 `lower < image < upper` (两端均为开区间)
//! 逐体素取逻辑与.

use ndarray::Zip;
use thiserror::Error;

use crate::data::{Mask, Volume};
use crate::Idx3d;

/// 构建过滤规则时的配置错误. 在处理任何病例之前就会报告.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    /// 过滤规则引用了未配置的参数图.
    #[error("filter key `{key}` not in images {known:?}")]
    UnknownImage {
        /// 过滤规则的键.
        key: String,

        /// 已配置的参数图逻辑名.
        known: Vec<String>,
    },

    /// 区间端点为 NaN, 无法比较.
    #[error("filter `{key}` has a NaN bound")]
    NanBound {
        /// 过滤规则的键.
        key: String,
    },
}

/// 精化单个病例掩膜时的错误.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefineError {
    /// 过滤规则对应的参数图未被加载.
    #[error("image `{0}` required by the mask filter is not loaded")]
    MissingImage(String),

    /// 掩膜与参数图形状不一致.
    #[error("mask shape {mask:?} does not match image `{name}` shape {image:?}")]
    ShapeMismatch {
        /// 参数图逻辑名.
        name: String,

        /// 掩膜形状.
        mask: Idx3d,

        /// 参数图形状.
        image: Idx3d,
    },
}

/// 参数图取值范围过滤规则: 逻辑名 -> (下界, 上界), 两端均不包含.
///
/// 构建时校验所有键都是已配置的参数图. 构建后不可变.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MaskFilters {
    ranges: Vec<(String, (f64, f64))>,
}

impl MaskFilters {
    /// 根据 `filters` 构建, `image_names` 为已配置的参数图逻辑名.
    ///
    /// 同一个键出现多次时, 后者覆盖前者.
    pub fn new<I, K, S>(filters: I, image_names: &[S]) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = (K, (f64, f64))>,
        K: Into<String>,
        S: AsRef<str>,
    {
        let mut ranges: Vec<(String, (f64, f64))> = Vec::new();
        for (key, (lower, upper)) in filters {
            let key = key.into();
            if !image_names.iter().any(|n| n.as_ref() == key) {
                return Err(FilterError::UnknownImage {
                    key,
                    known: image_names.iter().map(|n| n.as_ref().to_owned()).collect(),
                });
            }
            if lower.is_nan() || upper.is_nan() {
                return Err(FilterError::NanBound { key });
            }
            match ranges.iter_mut().find(|(k, _)| *k == key) {
                Some((_, r)) => *r = (lower, upper),
                None => ranges.push((key, (lower, upper))),
            }
        }
        Ok(Self { ranges })
    }

    /// 是否没有任何规则.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// 规则个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// 按插入顺序迭代 (逻辑名, (下界, 上界)).
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, (f64, f64))> {
        self.ranges.iter().map(|(k, r)| (k.as_str(), *r))
    }
}

/// 用 `filters` 精化 `mask`. `images` 为 (逻辑名, 体数据) 列表.
///
/// 对同一规则重复精化结果不变.
pub fn refine(
    mask: &Mask,
    images: &[(String, Volume)],
    filters: &MaskFilters,
) -> Result<Mask, RefineError> {
    let mut data = mask.data().to_owned();

    for (key, (lower, upper)) in filters.iter() {
        let image = images
            .iter()
            .find_map(|(n, v)| (n == key).then_some(v))
            .ok_or_else(|| RefineError::MissingImage(key.to_owned()))?;
        if image.shape() != mask.shape() {
            return Err(RefineError::ShapeMismatch {
                name: key.to_owned(),
                mask: mask.shape(),
                image: image.shape(),
            });
        }

        let keep = move |m: &mut bool, v: &f32| {
            let v = f64::from(*v);
            *m = *m && v > lower && v < upper;
        };

        #[cfg(feature = "rayon")]
        Zip::from(&mut data).and(image.data()).par_for_each(keep);
        #[cfg(not(feature = "rayon"))]
        Zip::from(&mut data).and(image.data()).for_each(keep);
    }

    Ok(Mask::from_array(data))
}

#[cfg(test)]
mod tests {
    use super::{refine, FilterError, MaskFilters, RefineError};
    use crate::data::{Mask, Volume};
    use ndarray::Array3;

    fn images() -> Vec<(String, Volume)> {
        let a = Array3::from_shape_vec(
            (1, 2, 4),
            vec![-0.5, 0.0, 0.2, 0.99, 1.0, 1.5, 0.5, 0.7],
        )
        .unwrap();
        let b = Array3::from_elem((1, 2, 4), 10.0);
        vec![
            ("A".to_owned(), Volume::from_array(a)),
            ("B".to_owned(), Volume::from_array(b)),
        ]
    }

    fn mask() -> Mask {
        Mask::from_array(
            Array3::from_shape_vec(
                (1, 2, 4),
                vec![true, true, true, true, true, true, false, true],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_unknown_key_rejected() {
        let e = MaskFilters::new([("C", (0.0, 1.0))], &["A", "B"]).unwrap_err();
        assert_eq!(
            e,
            FilterError::UnknownImage {
                key: "C".to_owned(),
                known: vec!["A".to_owned(), "B".to_owned()],
            }
        );
        let e = MaskFilters::new([("A", (f64::NAN, 1.0))], &["A"]).unwrap_err();
        assert!(matches!(e, FilterError::NanBound { .. }));
    }

    #[test]
    fn test_duplicate_key_overrides() {
        let f = MaskFilters::new([("A", (0.0, 1.0)), ("A", (2.0, 3.0))], &["A"]).unwrap();
        assert_eq!(f.len(), 1);
        assert_eq!(f.iter().next(), Some(("A", (2.0, 3.0))));
    }

    /// `{A: (0, 1)}` 的结果等于 `M & (A > 0) & (A < 1)`.
    #[test]
    fn test_exclusive_bounds() {
        let f = MaskFilters::new([("A", (0.0, 1.0))], &["A", "B"]).unwrap();
        let imgs = images();
        let out = refine(&mask(), &imgs, &f).unwrap();

        let m = mask();
        let a = imgs[0].1.data();
        let expected = Array3::from_shape_fn((1, 2, 4), |p| m[p] && a[p] > 0.0 && a[p] < 1.0);
        assert_eq!(out.data(), expected.view());
        // 0.2, 0.99 选中; 0.5 被原掩膜排除; 0.7 选中.
        assert_eq!(out.count(), 3);
    }

    #[test]
    fn test_idempotent() {
        let f = MaskFilters::new([("A", (0.0, 1.0)), ("B", (5.0, 20.0))], &["A", "B"]).unwrap();
        let imgs = images();
        let once = refine(&mask(), &imgs, &f).unwrap();
        let twice = refine(&once, &imgs, &f).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_filters_keep_mask() {
        let f = MaskFilters::default();
        assert!(f.is_empty());
        assert_eq!(refine(&mask(), &images(), &f).unwrap(), mask());
    }

    #[test]
    fn test_shape_mismatch() {
        let f = MaskFilters::new([("A", (0.0, 1.0))], &["A"]).unwrap();
        let m = Mask::from_array(Array3::from_elem((2, 2, 4), true));
        let e = refine(&m, &images(), &f).unwrap_err();
        assert_eq!(
            e,
            RefineError::ShapeMismatch {
                name: "A".to_owned(),
                mask: (2, 2, 4),
                image: (1, 2, 4),
            }
        );

        let e = refine(&m, &[], &f).unwrap_err();
        assert_eq!(e, RefineError::MissingImage("A".to_owned()));
    }
}
