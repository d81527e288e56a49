//! 并行模式: 固定大小的工作线程池.
//!
//! 工作线程从共享游标领取病例下标, 计算完成后经通道把结果送回主线程.
//! 主线程按 [`POLL_INTERVAL`] 轮询结果, 同时检查取消信号和整批超时.
//! 无论以何种方式结束, 都会先升起停止标志再汇合全部线程后返回.
//! 工作线程不再领取新病例, 正在计算的病例在下一个检查点处以 [`CaseError::Interrupted`] 结束.
//! 单次读取本身不可中断, 因此返回前最多还需等待一次读取.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Instant;

use log::{debug, error, info, warn};

use super::{
    progress_bar, Batch, CancelToken, CaseError, CaseRecord, ExtractError, Extractor,
    FailurePolicy, RunOptions,
};
use crate::consts::POLL_INTERVAL;
use crate::data::VolumeSource;

type Outcome = (usize, Result<CaseRecord, CaseError>);

/// 以 `workers` 个工作线程计算 `extractor` 的全部病例. 结果按 worklist 顺序排列.
pub(super) fn run<S: VolumeSource>(
    extractor: &Extractor<S>,
    workers: usize,
    options: &RunOptions,
    cancel: &CancelToken,
) -> Result<Batch, ExtractError> {
    let cases = extractor.worklist();
    let policy = options.policy();
    info!("Main PID: {}", std::process::id());
    info!("Running {} case(s) on {workers} worker(s)", cases.len());

    let cursor = AtomicUsize::new(0);
    let halt = AtomicBool::new(false);
    let bar = progress_bar(cases.len(), options.progress);
    let deadline = Instant::now() + options.timeout;

    let mut slots: Vec<Option<Result<CaseRecord, CaseError>>> =
        std::iter::repeat_with(|| None).take(cases.len()).collect();

    let outcome = thread::scope(|s| {
        let (tx, rx) = mpsc::channel::<Outcome>();

        for worker in 0..workers {
            let tx = tx.clone();
            let (cursor, halt) = (&cursor, &halt);
            s.spawn(move || {
                debug!("worker {worker} started");
                while !halt.load(Ordering::Acquire) && !cancel.is_cancelled() {
                    let idx = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(case) = cases.get(idx) else {
                        break;
                    };
                    let stop = || halt.load(Ordering::Acquire) || cancel.is_cancelled();
                    if tx.send((idx, extractor.compute_case_until(case, stop))).is_err() {
                        break;
                    }
                }
                debug!("worker {worker} stopped");
            });
        }
        // 所有工作线程退出后通道断开.
        drop(tx);

        let ans = loop {
            if cancel.is_cancelled() {
                warn!("...... Exit ......");
                break Err(ExtractError::Cancelled);
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                error!("batch timed out after {:?}", options.timeout);
                break Err(ExtractError::Timeout(options.timeout));
            };

            match rx.recv_timeout(POLL_INTERVAL.min(remaining)) {
                Ok((idx, Err(source))) if policy == FailurePolicy::Abort => {
                    bar.inc(1);
                    let case_id = cases[idx].case_id();
                    error!("error occurred in case `{case_id}`: {source}");
                    break Err(ExtractError::CaseFailed {
                        case_id: case_id.to_owned(),
                        source,
                    });
                }
                Ok((idx, result)) => {
                    bar.inc(1);
                    if let Err(e) = &result {
                        error!("error occurred in case `{}`: {e}", cases[idx].case_id());
                    }
                    slots[idx] = Some(result);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    // 工作线程可能因取消而提前退出.
                    if cancel.is_cancelled() {
                        warn!("...... Exit ......");
                        break Err(ExtractError::Cancelled);
                    }
                    break Ok(());
                }
            }
        };

        halt.store(true, Ordering::Release);
        ans
    });

    match outcome {
        Ok(()) => bar.finish_and_clear(),
        Err(e) => {
            bar.abandon();
            return Err(e);
        }
    }

    // 正常结束时所有工作线程都已取完游标, 每个位置都有结果.
    let mut batch = Batch::default();
    for (case, slot) in cases.iter().zip(slots) {
        match slot {
            Some(Ok(record)) => batch.records.push(record),
            Some(Err(e)) => batch.failed.push((case.case_id().to_owned(), e)),
            None => warn!("case `{}` produced no result", case.case_id()),
        }
    }
    Ok(batch)
}
