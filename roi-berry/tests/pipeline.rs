//! 在真实 nifti 文件上跑完整流程.

use std::fs;
use std::path::Path;

use ndarray::{Array, Array3, Dimension, RemoveAxis};
use nifti::writer::WriterOptions;
use roi_berry::prelude::*;

/// 写出 `data`. nifti 的维度顺序为 (W, H, z), 读回后变为 (z, H, W).
fn write<D: Dimension + RemoveAxis>(root: &Path, rel: &str, data: &Array<f32, D>) {
    let p = root.join(rel);
    fs::create_dir_all(p.parent().unwrap()).unwrap();
    WriterOptions::new(&p).write_nifti(data).unwrap();
}

/// (W, H, z) = (3, 2, 2), 体素值只与 z 有关: 第 0 层为 1, 第 1 层为 3.
fn by_slice() -> Array3<f32> {
    Array3::from_shape_fn((3, 2, 2), |(_, _, z)| (2 * z + 1) as f32)
}

fn config(root: &Path, out: &Path) -> ExtractorConfig {
    ExtractorConfig::new(root, out, "mask.nii", vec![ImageSpec::new("img", "img.nii.gz")])
        .unwrap()
}

#[test]
fn test_read_back_axes() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "v.nii", &by_slice());
    let v = Volume::open(tmp.path().join("v.nii")).unwrap();
    assert_eq!(v.shape(), (2, 2, 3));
    assert_eq!(v[(0, 1, 2)], 1.0);
    assert_eq!(v[(1, 0, 0)], 3.0);

    let size = NiftiReader.grid_size(&tmp.path().join("v.nii")).unwrap();
    assert_eq!(size, (2, 2, 3));
}

#[test]
fn test_single_frame_4d() {
    let tmp = tempfile::tempdir().unwrap();
    let data = Array::from_elem((3, 2, 2, 1), 0.5f32);
    write(tmp.path(), "v.nii", &data);
    let v = Volume::open(tmp.path().join("v.nii")).unwrap();
    assert_eq!(v.shape(), (2, 2, 3));

    let data = Array::from_elem((3, 2, 2, 2), 0.5f32);
    write(tmp.path(), "w.nii", &data);
    assert!(matches!(
        Volume::open(tmp.path().join("w.nii")),
        Err(roi_berry::LoadError::NotVolumetric { .. })
    ));
}

/// A 有掩膜和参数图, B 只有参数图: 只有 A 会被处理.
#[test]
fn test_end_to_end() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write(root.path(), "A/mask.nii", &Array3::<f32>::ones((3, 2, 2)));
    write(root.path(), "A/fit/img.nii.gz", &by_slice());
    write(root.path(), "B/img.nii.gz", &by_slice());

    let cfg = config(root.path(), out.path()).with_slice_statistics(true);
    let ex = Extractor::new(cfg).unwrap();
    assert_eq!(ex.worklist().case_ids().collect::<Vec<_>>(), ["A"]);
    assert!(ex.check_consistency().unwrap().is_empty());

    let summary = ex.run(&RunOptions::default(), &CancelToken::new()).unwrap();
    let s = summary.batch.records()[0].statistics();
    assert_eq!(s.get("img_mean"), Some(2.0));
    assert_eq!(s.get("img_std"), Some(1.0));
    assert_eq!(s.get("img_p50"), Some(2.0));
    assert_eq!(s.get("img-slice-0_mean"), Some(1.0));
    assert_eq!(s.get("img-slice-1_p95"), Some(3.0));
    // 常数切片的偏度无定义.
    assert!(s.get("img-slice-0_skewness").unwrap().is_nan());

    let text = fs::read_to_string(&summary.path).unwrap();
    let mut lines = text.lines();
    let header: Vec<_> = lines.next().unwrap().split(',').collect();
    assert_eq!(header.len(), 1 + 9 * 3);
    assert_eq!(&header[..3], ["case_id", "img_mean", "img_std"]);
    let row = lines.next().unwrap();
    assert!(row.starts_with("A,2,1,"));
    // 切片偏度 / 峰度为 NaN, 留空.
    assert!(row.contains(",,"));
    assert!(lines.next().is_none());
}

#[test]
fn test_size_mismatch_detected_and_isolated() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write(root.path(), "A/mask.nii", &Array3::<f32>::ones((3, 2, 2)));
    write(root.path(), "A/img.nii.gz", &Array3::<f32>::ones((4, 2, 2)));
    write(root.path(), "B/mask.nii", &Array3::<f32>::ones((3, 2, 2)));
    write(root.path(), "B/img.nii.gz", &by_slice());

    let ex = Extractor::new(config(root.path(), out.path())).unwrap();
    let found = ex.check_consistency().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].case_id, "A");
    assert_eq!(found[0].first.1, (2, 2, 3));
    assert_eq!(found[0].second.1, (2, 2, 4));

    // 检查只做诊断; 计算时 A 因形状不一致失败, 串行模式下被跳过.
    let summary = ex.run(&RunOptions::default(), &CancelToken::new()).unwrap();
    assert_eq!(summary.batch.case_ids().collect::<Vec<_>>(), ["B"]);
    assert_eq!(summary.batch.failed()[0].0, "A");
}

#[test]
fn test_filter_on_real_files() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write(root.path(), "A/mask.nii", &Array3::<f32>::ones((3, 2, 2)));
    write(root.path(), "A/img.nii.gz", &by_slice());

    let cfg = config(root.path(), out.path())
        .with_filters([("img", (2.0, 10.0))])
        .unwrap();
    let ex = Extractor::new(cfg).unwrap();
    let opts = RunOptions {
        workers: 2,
        ..RunOptions::default()
    };
    let batch = ex.extract(&opts, &CancelToken::new()).unwrap();
    let s = batch.records()[0].statistics();
    assert_eq!(s.get("img_mean"), Some(3.0));
    assert_eq!(s.get("img_std"), Some(0.0));
}
