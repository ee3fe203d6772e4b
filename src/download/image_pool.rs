//! 单章图片并发下载工作池。
//!
//! 固定数量的工作线程从通道领取图片任务；取消后不再派发新任务，
//! 已在进行中的任务完成后返回部分结果。

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel as channel;
use tracing::{debug, error, warn};

use super::fetch::{Delivery, ImageSource, deliver_image};
use super::models::{ChapterImages, DownloadError, ImageJob, RetryPolicy};
use super::progress::ProgressSink;

#[derive(Debug, Clone, Copy)]
pub struct ImagePoolOptions {
    pub workers: usize,
    /// 容忍部分图片失败（--skip-broken）
    pub tolerate_failures: bool,
    pub retry: RetryPolicy,
}

#[derive(Default)]
struct PoolState {
    files: Vec<Option<PathBuf>>,
    done_images: usize,
    /// 进度条用的传输量，含失败尝试与声明长度补足
    progress_bytes: u64,
    /// 成功写入文件的字节数
    written: u64,
    failed: usize,
    skipped: usize,
}

/// 下载一章的全部图片（目标路径已在 `jobs` 中分配）。
///
/// 非容忍模式下任意一张失败：删除本章已写入的文件并返回 `ImagesFailed`。
pub fn download_chapter_images(
    source: &dyn ImageSource,
    jobs: &[ImageJob],
    referer: &str,
    options: &ImagePoolOptions,
    progress: &dyn ProgressSink,
    cancel: &AtomicBool,
) -> Result<ChapterImages, DownloadError> {
    let total = jobs.len();
    if total == 0 {
        return Err(DownloadError::NoImages);
    }
    if let Some(folder) = jobs[0].dest.parent() {
        std::fs::create_dir_all(folder).map_err(|source| DownloadError::Io {
            path: folder.to_path_buf(),
            source,
        })?;
    }

    let workers = options.workers.clamp(1, total);
    let state = Mutex::new(PoolState {
        files: vec![None; total],
        ..Default::default()
    });
    progress.update(0, total, 0);

    thread::scope(|s| {
        let (tx, rx) = channel::bounded::<&ImageJob>(0);

        for _ in 0..workers {
            let rx = rx.clone();
            let state = &state;
            s.spawn(move || {
                for job in rx.iter() {
                    if cancel.load(Ordering::Relaxed) {
                        continue;
                    }
                    run_job(source, job, referer, options, progress, cancel, total, state);
                }
            });
        }
        drop(rx);

        for job in jobs {
            if cancel.load(Ordering::Relaxed) {
                debug!(target: "download", "已取消，停止派发图片任务");
                break;
            }
            if tx.send(job).is_err() {
                break;
            }
        }
        drop(tx);
    });

    let st = state.into_inner().unwrap_or_else(|p| p.into_inner());
    let files: Vec<PathBuf> = st.files.into_iter().flatten().collect();

    if cancel.load(Ordering::Relaxed) {
        return Ok(ChapterImages {
            files,
            bytes: st.written,
            failed: st.failed,
            skipped: st.skipped,
            canceled: true,
        });
    }

    if st.failed > 0 && !options.tolerate_failures {
        for f in &files {
            let _ = std::fs::remove_file(f);
        }
        return Err(DownloadError::ImagesFailed {
            failed: st.failed,
            total,
        });
    }
    if st.failed > 0 {
        warn!(target: "download", "{}/{} 张图片失败，已跳过", st.failed, total);
    }

    Ok(ChapterImages {
        files,
        bytes: st.written,
        failed: st.failed,
        skipped: st.skipped,
        canceled: false,
    })
}

#[allow(clippy::too_many_arguments)]
fn run_job(
    source: &dyn ImageSource,
    job: &ImageJob,
    referer: &str,
    options: &ImagePoolOptions,
    progress: &dyn ProgressSink,
    cancel: &AtomicBool,
    total: usize,
    state: &Mutex<PoolState>,
) {
    let mut last = 0u64;
    let mut on_bytes = |n: u64| {
        if n <= last {
            return;
        }
        let delta = n - last;
        last = n;
        if let Ok(mut st) = state.lock() {
            st.progress_bytes += delta;
            progress.update(st.done_images, total, st.progress_bytes);
        }
    };

    let result = deliver_image(source, job, referer, &options.retry, cancel, &mut on_bytes);

    let Ok(mut st) = state.lock() else {
        return;
    };
    match result {
        Ok(Delivery::Written(n)) => {
            st.written += n;
            st.files[job.index] = Some(job.dest.clone());
            st.done_images += 1;
        }
        Ok(Delivery::Skipped) => {
            st.skipped += 1;
            st.done_images += 1;
        }
        Err(DownloadError::Canceled) => return,
        Err(e) => {
            error!(target: "download", "图片 {} 下载失败: {} ({})", job.index + 1, e, job.url);
            st.failed += 1;
        }
    }
    progress.update(st.done_images, total, st.progress_bytes);
}
