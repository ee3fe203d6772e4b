//! 日志：终端 + `logs/latest.log` 双输出，退出或崩溃时把本次日志压缩归档。

use std::fs::{self, File};
use std::io;
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{error, warn};
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use zip::CompressionMethod;
use zip::write::FileOptions;

const LATEST_LOG: &str = "latest.log";
/// 启动时超过该大小的遗留日志先归档
const MAX_LOG_BYTES: u64 = 8 * 1024 * 1024;
/// 守卫释放后等待写入线程落盘
const FLUSH_SETTLE_MS: u64 = 300;
/// 第二次 Ctrl-C 时的退出码（128 + SIGINT）
const INTERRUPT_EXIT_CODE: i32 = 130;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("日志系统已被初始化")]
    AlreadyInitialized,
    #[error("安装日志订阅器失败: {0}")]
    SubscriberInit(tracing_subscriber::util::TryInitError),
    #[error("安装 Ctrl-C 处理失败: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("日志文件读写失败: {0}")]
    Io(#[from] io::Error),
    #[error("日志压缩失败: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("时间戳格式化失败: {0}")]
    Time(#[from] time::error::Format),
}

/// `verbose` 只影响终端；文件始终记录 DEBUG。
#[derive(Debug, Clone, Copy)]
pub struct LogSettings {
    pub verbose: bool,
    pub ansi: bool,
    pub archive_on_exit: bool,
}

impl LogSettings {
    pub fn cli(verbose: bool) -> Self {
        Self {
            verbose,
            ansi: true,
            archive_on_exit: true,
        }
    }
}

pub struct LogSystem {
    runtime: Arc<LogRuntime>,
}

impl LogSystem {
    /// 日志目录为 `<data_dir>/logs`，未指定数据目录时用当前目录下的 `logs`。
    pub fn start(settings: LogSettings, data_dir: Option<&Path>) -> Result<Self, LogError> {
        let logs_dir = data_dir.map_or_else(|| PathBuf::from("logs"), |d| d.join("logs"));
        fs::create_dir_all(&logs_dir)?;
        let latest_log = logs_dir.join(LATEST_LOG);
        archive_if_large(&latest_log, &logs_dir)?;

        let (file_writer, guard) = NonBlockingBuilder::default()
            .lossy(false)
            .finish(tracing_appender::rolling::never(&logs_dir, LATEST_LOG));

        // 进度条占用 stderr，终端日志写 stdout
        let terminal = fmt::layer()
            .with_target(false)
            .with_ansi(settings.ansi)
            .with_writer(io::stdout)
            .with_filter(if settings.verbose {
                LevelFilter::DEBUG
            } else {
                LevelFilter::INFO
            });
        let file = fmt::layer()
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(file_writer)
            .with_filter(LevelFilter::DEBUG);

        tracing_subscriber::registry()
            .with(terminal)
            .with(file)
            .try_init()
            .map_err(|e| {
                if tracing::dispatcher::has_been_set() {
                    LogError::AlreadyInitialized
                } else {
                    LogError::SubscriberInit(e)
                }
            })?;

        let runtime = Arc::new(LogRuntime {
            logs_dir,
            latest_log,
            guard: Mutex::new(Some(guard)),
            finished: AtomicBool::new(false),
            archive_on_exit: settings.archive_on_exit,
        });
        runtime.install_panic_hook();
        Ok(Self { runtime })
    }

    /// 安装 Ctrl-C 处理：
    /// - 第一次：置位取消标志，正在进行的任务收尾后返回部分结果
    /// - 第二次：执行 `on_force_exit`（清理临时目录等），刷新日志并立即退出
    pub fn install_interrupt_handler<F>(
        &self,
        cancel: Arc<AtomicBool>,
        on_force_exit: F,
    ) -> Result<(), LogError>
    where
        F: Fn() + Send + 'static,
    {
        let runtime = Arc::clone(&self.runtime);
        ctrlc::set_handler(move || {
            if !cancel.swap(true, Ordering::SeqCst) {
                warn!(target: "signal", "收到中断信号，停止派发新任务（再次 Ctrl-C 立即退出）");
                return;
            }
            warn!(target: "signal", "再次收到中断信号，清理后退出");
            on_force_exit();
            runtime.finish();
            std::process::exit(INTERRUPT_EXIT_CODE);
        })?;
        Ok(())
    }

    /// 在 `process::exit` 前调用，保证日志落盘并归档。
    pub fn shutdown(&self) {
        self.runtime.finish();
    }
}

impl Drop for LogSystem {
    fn drop(&mut self) {
        self.runtime.finish();
    }
}

struct LogRuntime {
    logs_dir: PathBuf,
    latest_log: PathBuf,
    guard: Mutex<Option<WorkerGuard>>,
    finished: AtomicBool,
    archive_on_exit: bool,
}

impl LogRuntime {
    /// panic 时先记日志并归档，再交给原来的 hook 打印。
    fn install_panic_hook(self: &Arc<Self>) {
        let runtime = Arc::clone(self);
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let at = info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()))
                .unwrap_or_else(|| "<unknown>".to_string());
            error!(target: "panic", "程序崩溃 @ {}: {}", at, info);
            runtime.finish();
            previous(info);
        }));
    }

    /// 只执行一次：释放写入线程守卫（刷新缓冲），随后按需归档。
    fn finish(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut guard) = self.guard.lock() {
            drop(guard.take());
        }
        thread::sleep(Duration::from_millis(FLUSH_SETTLE_MS));

        if !self.archive_on_exit {
            return;
        }
        if let Err(err) = archive_log_file(&self.latest_log, &self.logs_dir) {
            eprintln!("日志归档失败: {err}");
        }
    }
}

/// 上次运行遗留的超大日志先归档，避免 latest.log 无限增长。
fn archive_if_large(latest_log: &Path, logs_dir: &Path) -> Result<(), LogError> {
    if fs::metadata(latest_log).is_ok_and(|m| m.len() >= MAX_LOG_BYTES) {
        archive_log_file(latest_log, logs_dir)?;
    }
    Ok(())
}

/// `latest.log` → `logs/log_<时间戳>.zip`，成功后删除原文件；空日志直接删除。
fn archive_log_file(latest_log: &Path, logs_dir: &Path) -> Result<Option<PathBuf>, LogError> {
    let len = match fs::metadata(latest_log) {
        Ok(m) => m.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len == 0 {
        fs::remove_file(latest_log)?;
        return Ok(None);
    }

    let stamp = OffsetDateTime::now_utc().format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))?;
    let archive_path = logs_dir.join(format!("log_{stamp}.zip"));

    let mut zip = zip::ZipWriter::new(File::create(&archive_path)?);
    zip.start_file(
        format!("mangad_{stamp}.log"),
        FileOptions::default().compression_method(CompressionMethod::Deflated),
    )?;
    io::copy(&mut File::open(latest_log)?, &mut zip)?;
    zip.finish()?;
    fs::remove_file(latest_log)?;

    Ok(Some(archive_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_skips_missing_and_empty_logs() {
        let dir = tempfile::tempdir().unwrap();
        let latest = dir.path().join("latest.log");
        assert!(archive_log_file(&latest, dir.path()).unwrap().is_none());

        fs::write(&latest, b"").unwrap();
        assert!(archive_log_file(&latest, dir.path()).unwrap().is_none());
        assert!(!latest.exists());
    }

    #[test]
    fn finish_archives_once() {
        let dir = tempfile::tempdir().unwrap();
        let latest = dir.path().join(LATEST_LOG);
        fs::write(&latest, b"ERROR fatal\n").unwrap();
        let runtime = LogRuntime {
            logs_dir: dir.path().to_path_buf(),
            latest_log: latest.clone(),
            guard: Mutex::new(None),
            finished: AtomicBool::new(false),
            archive_on_exit: true,
        };
        runtime.finish();
        // 先显式收尾再 Drop：第二次调用不应再归档
        fs::write(&latest, b"late line\n").unwrap();
        runtime.finish();

        let zips = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|x| x == "zip"))
            .count();
        assert_eq!(zips, 1);
        assert!(latest.exists());
    }

    #[test]
    fn archive_zips_and_removes_latest_log() {
        let dir = tempfile::tempdir().unwrap();
        let latest = dir.path().join("latest.log");
        fs::write(&latest, b"INFO hello\n").unwrap();

        let archived = archive_log_file(&latest, dir.path()).unwrap().unwrap();
        assert!(archived.exists());
        assert!(!latest.exists());

        let mut zip = zip::ZipArchive::new(File::open(archived).unwrap()).unwrap();
        assert_eq!(zip.len(), 1);
        assert!(zip.by_index(0).unwrap().name().starts_with("mangad_"));
    }
}
