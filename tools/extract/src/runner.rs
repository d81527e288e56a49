//! 程序运行函数.

use std::error::Error;
use std::path::PathBuf;

use log::{info, warn};
use roi_berry::extract::{FailurePolicy, RunSummary};
use roi_berry::prelude::*;
use utils::loader;

use crate::cli::Cli;

/// 由命令行参数构建配置.
pub fn config_from_cli(cli: &Cli) -> Result<ExtractorConfig, Box<dyn Error>> {
    let root = resolve(cli.root.clone(), loader::root_dir_from_env_or_home, "root")?;
    let output = resolve(
        cli.output.clone(),
        loader::output_dir_from_env_or_home,
        "output",
    )?;
    let images = cli
        .images
        .iter()
        .map(|(name, file)| ImageSpec::new(name.as_str(), file.as_str()))
        .collect();

    let config = ExtractorConfig::new(root, output, cli.mask.as_str(), images)?
        .with_percentiles(cli.percentiles.iter().copied())?
        .with_slice_statistics(cli.slice_statistics)
        .with_filters(cli.filters.iter().cloned())?;
    Ok(config)
}

fn resolve(
    given: Option<PathBuf>,
    fallback: fn() -> Option<PathBuf>,
    what: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    given
        .or_else(fallback)
        .ok_or_else(|| format!("cannot determine {what} directory: no home directory").into())
}

/// 由命令行参数构建运行参数.
pub fn options_from_cli(cli: &Cli) -> RunOptions {
    RunOptions {
        workers: cli.cpus,
        failure_policy: cli.isolate_failures.then_some(FailurePolicy::Isolate),
        progress: !cli.quiet,
        ..RunOptions::default()
    }
}

/// 实际运行. `check_only` 时只检查网格尺寸, 返回 `None`.
pub fn run(cli: &Cli, cancel: &CancelToken) -> Result<Option<RunSummary>, Box<dyn Error>> {
    let config = config_from_cli(cli)?;
    info!("Root: {}", config.root_dir().display());
    info!("Output: {}", config.output_dir().display());

    let extractor = Extractor::new(config)?;

    if cli.check || cli.check_only {
        let found = extractor.check_consistency()?;
        if found.is_empty() {
            info!("All cases are consistent in grid size");
        } else {
            warn!("{} size mismatch(es) found", found.len());
        }
        if cli.check_only {
            return Ok(None);
        }
    }

    let options = options_from_cli(cli);
    if options.is_parallel() {
        info!(
            "Workers: {} (requested {})",
            clamp_workers(options.workers, utils::cpus()),
            options.workers
        );
    }
    Ok(Some(extractor.run(&options, cancel)?))
}
