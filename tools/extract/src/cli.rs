//! 命令行参数.

use std::path::PathBuf;

use clap::Parser;

/// 按病例批量提取掩膜区域内参数图的描述性统计量, 写出一张 CSV 报表.
#[derive(Debug, Parser)]
#[command(name = "roi-extract", version)]
pub struct Cli {
    /// 病例根目录. 缺省时使用 `$HOME/dataset/cases`.
    #[arg(value_name = "ROOT", env = "ROI_BERRY_ROOT")]
    pub root: Option<PathBuf>,

    /// 报表输出目录. 缺省时使用 `$HOME/dataset/reports`.
    #[arg(short, long, value_name = "DIR", env = "ROI_BERRY_OUTPUT")]
    pub output: Option<PathBuf>,

    /// 掩膜文件名.
    #[arg(short, long, value_name = "FILE", default_value = "IVIM-mask.nii.gz")]
    pub mask: String,

    /// 参数图, 形如 `D*=D-star.nii.gz`. 可重复, 顺序即报表列顺序.
    #[arg(
        short,
        long = "image",
        value_name = "NAME=FILE",
        value_parser = parse_image,
        default_values = ["D=D.nii.gz", "D*=D-star.nii.gz", "f=f.nii.gz"]
    )]
    pub images: Vec<(String, String)>,

    /// 过滤规则, 形如 `f=0,1`: 只保留 `0 < f < 1` 的体素. 可重复.
    #[arg(short, long = "filter", value_name = "NAME=LOW,HIGH", value_parser = parse_filter)]
    pub filters: Vec<(String, (f64, f64))>,

    /// 百分位数, 逗号分隔.
    #[arg(
        short,
        long,
        value_name = "Q",
        value_delimiter = ',',
        default_values_t = roi_berry::consts::DEFAULT_PERCENTILES
    )]
    pub percentiles: Vec<f64>,

    /// 同时计算逐切片统计量.
    #[arg(long)]
    pub slice_statistics: bool,

    /// 工作线程数. 小于 2 时串行运行.
    #[arg(short, long, default_value_t = 1)]
    pub cpus: usize,

    /// 计算前先检查各病例文件的网格尺寸是否一致.
    #[arg(long)]
    pub check: bool,

    /// 只检查网格尺寸, 不计算.
    #[arg(long, conflicts_with = "check")]
    pub check_only: bool,

    /// 并行模式下也只跳过失败病例, 而不是中止整批.
    #[arg(long)]
    pub isolate_failures: bool,

    /// 只输出警告与错误, 不显示进度条.
    #[arg(short, long)]
    pub quiet: bool,

    /// 更详细的日志. 可重复.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// 解析 `NAME=FILE`.
pub fn parse_image(s: &str) -> Result<(String, String), String> {
    let (name, file) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=FILE, got `{s}`"))?;
    if name.is_empty() || file.is_empty() {
        return Err(format!("expected NAME=FILE, got `{s}`"));
    }
    Ok((name.to_owned(), file.to_owned()))
}

/// 解析 `NAME=LOW,HIGH`.
pub fn parse_filter(s: &str) -> Result<(String, (f64, f64)), String> {
    let (name, range) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=LOW,HIGH, got `{s}`"))?;
    let (low, high) = range
        .split_once(',')
        .ok_or_else(|| format!("expected LOW,HIGH, got `{range}`"))?;
    let bound = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid bound `{v}`: {e}"))
    };
    if name.is_empty() {
        return Err(format!("missing filter name in `{s}`"));
    }
    Ok((name.to_owned(), (bound(low)?, bound(high)?)))
}

#[cfg(test)]
mod tests {
    use super::{parse_filter, parse_image, Cli};
    use clap::Parser;

    #[test]
    fn test_parse_image() {
        assert_eq!(
            parse_image("D*=D-star.nii.gz").unwrap(),
            ("D*".to_owned(), "D-star.nii.gz".to_owned())
        );
        assert!(parse_image("D.nii.gz").is_err());
        assert!(parse_image("=D.nii.gz").is_err());
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!(
            parse_filter("f=0,1").unwrap(),
            ("f".to_owned(), (0.0, 1.0))
        );
        assert_eq!(
            parse_filter("D=-1e-3, 5").unwrap(),
            ("D".to_owned(), (-1e-3, 5.0))
        );
        assert!(parse_filter("f=0").is_err());
        assert!(parse_filter("f=a,1").is_err());
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["roi-extract", "/data"]).unwrap();
        assert_eq!(cli.mask, "IVIM-mask.nii.gz");
        assert_eq!(cli.images.len(), 3);
        assert_eq!(cli.percentiles, [5.0, 25.0, 50.0, 75.0, 95.0]);
        assert_eq!(cli.cpus, 1);
        assert!(cli.filters.is_empty());
    }

    #[test]
    fn test_full_command_line() {
        let cli = Cli::try_parse_from([
            "roi-extract",
            "/data",
            "-o",
            "/out",
            "-i",
            "img=img.nii",
            "-f",
            "img=0,1",
            "-p",
            "10,90",
            "--slice-statistics",
            "-c",
            "4",
            "--check-only",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.images, [("img".to_owned(), "img.nii".to_owned())]);
        assert_eq!(cli.percentiles, [10.0, 90.0]);
        assert!(cli.slice_statistics && cli.check_only);
        assert_eq!(cli.verbose, 2);
        assert!(Cli::try_parse_from(["roi-extract", "--check", "--check-only"]).is_err());
    }
}
