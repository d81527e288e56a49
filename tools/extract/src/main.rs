//! `roi-extract`: 按病例批量提取掩膜区域统计量.

use std::error::Error;

use clap::Parser;
use log::{error, warn};
use roi_berry::CancelToken;

mod cli;
mod runner;

fn main() -> Result<(), Box<dyn Error>> {
    let cli = cli::Cli::parse();
    utils::init_logger(utils::log_level(cli.verbose, cli.quiet))?;

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            warn!("Processor abort");
            cancel.cancel();
        })?;
    }

    let summary = match runner::run(&cli, &cancel) {
        Ok(Some(summary)) => summary,
        Ok(None) => return Ok(()),
        Err(e) => {
            error!("{e}");
            return Err(e);
        }
    };

    utils::sep();
    println!("Report: {}", summary.path.display());
    println!("Rows: {}", summary.batch.records().len());
    if !summary.batch.failed().is_empty() {
        println!("Failed cases:");
        for (case_id, e) in summary.batch.failed() {
            println!("  {case_id}: {e}");
        }
    }
    utils::sep();
    Ok(())
}
