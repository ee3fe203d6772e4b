//! 下载流程的数据模型与错误类型。

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;

use super::archive::ArchiveError;
use crate::network_parser::network::FetchError;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("写入 {path} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{failed}/{total} 张图片下载失败（使用 --skip-broken 可跳过失败图片）")]
    ImagesFailed { failed: usize, total: usize },
    #[error("没有可下载的图片")]
    NoImages,
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("已取消")]
    Canceled,
}

/// 单张图片的重试参数；测试中可把退避缩到毫秒级。
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// 第 n 次失败后等待 `n * backoff_unit`
    pub backoff_unit: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_unit: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageJob {
    /// 0 起始的阅读顺序
    pub index: usize,
    pub url: String,
    pub dest: PathBuf,
}

/// 按阅读顺序分配文件名：`page_001.jpg`，扩展名取自地址，缺失时用 `.jpg`。
pub fn plan_image_jobs(urls: &[String], folder: &std::path::Path) -> Vec<ImageJob> {
    urls.iter()
        .enumerate()
        .map(|(index, url)| ImageJob {
            index,
            url: url.clone(),
            dest: folder.join(format!("page_{:03}{}", index + 1, image_ext(url))),
        })
        .collect()
}

fn image_ext(url: &str) -> String {
    let path = crate::page_parser::html_utils::strip_query(url);
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(i) if i > 0 && i + 1 < name.len() && name.len() - i <= 6 => {
            name[i..].to_lowercase()
        }
        _ => ".jpg".to_string(),
    }
}

/// 单章图片下载结果。
#[derive(Debug, Default)]
pub struct ChapterImages {
    /// 按阅读顺序排列的已写入文件
    pub files: Vec<PathBuf>,
    pub bytes: u64,
    pub failed: usize,
    pub skipped: usize,
    pub canceled: bool,
}

/// 全局累计统计，跨章节并发更新。
#[derive(Debug, Default)]
pub struct Stats {
    chapters: AtomicU64,
    images: AtomicU64,
    bytes: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub chapters: u64,
    pub images: u64,
    pub bytes: u64,
}

impl Stats {
    pub fn add_images(&self, images: usize, bytes: u64) {
        self.images.fetch_add(images as u64, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_chapter(&self) {
        self.chapters.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            chapters: self.chapters.load(Ordering::Relaxed),
            images: self.images.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
pub enum ChapterOutcome {
    Archived {
        path: PathBuf,
        images: usize,
        bytes: u64,
        /// `--skip-broken` 下被跳过的失败图片数
        failed: usize,
    },
    Failed(String),
    /// 取消时保留的部分结果（未打包）
    Canceled { images: usize, bytes: u64 },
    /// 取消后未开始的章节
    Skipped,
}

#[derive(Debug)]
pub struct ChapterReport {
    pub label: String,
    pub outcome: ChapterOutcome,
}

impl ChapterReport {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ChapterOutcome::Failed(_))
    }
}
