//! 统计报表输出.
//!
//! 报表为 CSV: 第一列为病例名, 其余列为所有记录中出现过的键的并集,
//! 按首次出现的顺序排列. 某病例缺少的键 (如切片数不同) 以及 NaN 值均留空.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use itertools::Itertools;
use thiserror::Error;

use crate::consts::{CASE_ID_COLUMN, REPORT_PREFIX};
use crate::extract::CaseRecord;

/// 写出报表时的错误.
#[derive(Debug, Error)]
pub enum ReportError {
    /// CSV 序列化错误.
    #[error("failed to write report `{}`: {source}", path.display())]
    Csv {
        /// 报表路径.
        path: PathBuf,

        /// 底层错误.
        #[source]
        source: csv::Error,
    },

    /// 其他底层 I/O 错误.
    #[error("failed to write report `{}`: {source}", path.display())]
    Io {
        /// 报表路径.
        path: PathBuf,

        /// 底层错误.
        #[source]
        source: io::Error,
    },
}

/// 报表文件名, 形如 `statistics_1739923200.csv`.
#[inline]
pub fn report_file_name(unix_seconds: u64) -> String {
    format!("{REPORT_PREFIX}_{unix_seconds}.csv")
}

/// 当前 unix 时间戳 (秒).
fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// 报表列: 病例名在前, 然后是所有键按首次出现顺序去重.
pub fn columns(records: &[CaseRecord]) -> Vec<&str> {
    std::iter::once(CASE_ID_COLUMN)
        .chain(
            records
                .iter()
                .flat_map(|r| r.statistics().keys())
                .filter(|k| *k != CASE_ID_COLUMN)
                .unique(),
        )
        .collect()
}

/// 将 `records` 写入 `w`.
pub fn write_records<W: io::Write>(w: W, records: &[CaseRecord]) -> csv::Result<()> {
    let columns = columns(records);
    let mut writer = csv::Writer::from_writer(w);
    writer.write_record(&columns)?;

    for record in records {
        let stats = record.statistics();
        let row = std::iter::once(record.case_id().to_owned()).chain(columns[1..].iter().map(
            |k| match stats.get(k) {
                Some(v) if !v.is_nan() => v.to_string(),
                _ => String::new(),
            },
        ));
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// 在 `dir` 下新建报表文件 `statistics_{unix 秒}.csv` 并写入, 返回文件路径.
///
/// `dir` 不存在时会先创建. 同名文件会被直接覆盖, 写入不是原子的.
pub fn write_report<P: AsRef<Path>>(dir: P, records: &[CaseRecord]) -> Result<PathBuf, ReportError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(|source| ReportError::Io {
        path: dir.to_owned(),
        source,
    })?;
    let path = dir.join(report_file_name(unix_now()));
    let file = std::fs::File::create(&path).map_err(|source| ReportError::Io {
        path: path.clone(),
        source,
    })?;
    write_records(io::BufWriter::new(file), records).map_err(|source| ReportError::Csv {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::{columns, report_file_name, write_records, write_report};
    use crate::extract::CaseRecord;
    use crate::Statistics;

    fn record(case_id: &str, items: &[(&str, f64)]) -> CaseRecord {
        let mut s = Statistics::new();
        for (k, v) in items {
            s.insert(*k, *v);
        }
        CaseRecord::new(case_id, s)
    }

    #[test]
    fn test_file_name() {
        assert_eq!(report_file_name(1739923200), "statistics_1739923200.csv");
    }

    #[test]
    fn test_union_columns_and_empty_cells() {
        let records = [
            record("A", &[("D_mean", 1.5), ("D-slice-0_mean", 2.0)]),
            record("B", &[("D_mean", 3.0), ("D-slice-1_mean", f64::NAN)]),
        ];
        assert_eq!(
            columns(&records),
            ["case_id", "D_mean", "D-slice-0_mean", "D-slice-1_mean"]
        );

        let mut buf = Vec::new();
        write_records(&mut buf, &records).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "case_id,D_mean,D-slice-0_mean,D-slice-1_mean\nA,1.5,2,\nB,3,,\n"
        );
    }

    #[test]
    fn test_write_report_creates_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_report(tmp.path(), &[record("A", &[("f_mean", 0.25)])]).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("statistics_") && name.ends_with(".csv"));
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "case_id,f_mean\nA,0.25\n");
    }
}
