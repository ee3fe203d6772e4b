//! 单张图片的下载：校验状态码与 MIME，流式写盘并上报字节进度，失败按策略重试。

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use super::models::{DownloadError, ImageJob, RetryPolicy};
use crate::network_parser::network::{FetchError, HttpClient};

const COPY_BUF: usize = 32 * 1024;
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// 打开后的图片响应，body 供流式读取。
pub struct ImageResponse {
    pub status: u16,
    /// 服务器未声明时为 `None`
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

pub trait ImageSource: Send + Sync {
    fn open(&self, url: &str, referer: &str, timeout: Duration) -> Result<ImageResponse, FetchError>;
}

impl ImageSource for HttpClient {
    fn open(&self, url: &str, referer: &str, timeout: Duration) -> Result<ImageResponse, FetchError> {
        let resp = self.get_image(url, referer, timeout)?;
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(ImageResponse {
            status: resp.status().as_u16(),
            content_type,
            content_length: resp.content_length(),
            body: Box::new(resp),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Written(u64),
    /// 动图等不收录的格式，不发请求
    Skipped,
}

pub fn is_skipped_format(url: &str) -> bool {
    crate::page_parser::html_utils::strip_query(url)
        .to_lowercase()
        .ends_with(".gif")
}

/// 分片睡眠，期间收到取消返回 `false`。
pub fn sleep_unless_canceled(total: Duration, cancel: &AtomicBool) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(CANCEL_POLL.min(deadline - now));
    }
}

/// 下载一张图片；`on_progress` 收到本次尝试内的累计字节数。
pub fn deliver_image(
    source: &dyn ImageSource,
    job: &ImageJob,
    referer: &str,
    policy: &RetryPolicy,
    cancel: &AtomicBool,
    on_progress: &mut dyn FnMut(u64),
) -> Result<Delivery, DownloadError> {
    if is_skipped_format(&job.url) {
        debug!(target: "download", "跳过 GIF: {}", job.url);
        return Ok(Delivery::Skipped);
    }

    let attempts = policy.attempts.max(1);
    let mut last_err: Option<DownloadError> = None;

    for attempt in 1..=attempts {
        if cancel.load(Ordering::Relaxed) {
            return Err(DownloadError::Canceled);
        }
        match fetch_once(source, job, referer, policy.attempt_timeout, on_progress) {
            Ok(n) => return Ok(Delivery::Written(n)),
            Err(DownloadError::Fetch(e)) if !e.is_retryable() => {
                warn!(target: "download", "图片 {} 下载失败，不再重试: {}", job.index + 1, e);
                return Err(e.into());
            }
            Err(e) => {
                warn!(
                    target: "download",
                    "图片 {} 第 {}/{} 次下载失败: {}",
                    job.index + 1,
                    attempt,
                    attempts,
                    e
                );
                last_err = Some(e);
            }
        }
        if attempt < attempts && !sleep_unless_canceled(policy.backoff_unit * attempt, cancel) {
            return Err(DownloadError::Canceled);
        }
    }

    Err(last_err.unwrap_or(DownloadError::Canceled))
}

fn fetch_once(
    source: &dyn ImageSource,
    job: &ImageJob,
    referer: &str,
    timeout: Duration,
    on_progress: &mut dyn FnMut(u64),
) -> Result<u64, DownloadError> {
    let mut resp = source.open(&job.url, referer, timeout)?;
    if resp.status != 200 {
        return Err(FetchError::Status(resp.status).into());
    }
    if let Some(mime) = resp.content_type
        && !mime.to_ascii_lowercase().starts_with("image/")
    {
        return Err(FetchError::Mime(mime).into());
    }

    let written = match write_stream(&mut resp.body, &job.dest, on_progress) {
        Ok(n) => n,
        Err(err) => {
            let _ = fs::remove_file(&job.dest);
            return Err(DownloadError::Io {
                path: job.dest.clone(),
                source: err,
            });
        }
    };

    // 声明长度大于实际写入时按声明长度计进度
    if let Some(len) = resp.content_length
        && len > written
    {
        on_progress(len);
    }
    Ok(written)
}

fn write_stream(
    body: &mut dyn Read,
    dest: &Path,
    on_progress: &mut dyn FnMut(u64),
) -> io::Result<u64> {
    let mut out = BufWriter::new(File::create(dest)?);
    let mut buf = vec![0u8; COPY_BUF];
    let mut total = 0u64;
    loop {
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        out.write_all(&buf[..n])?;
        total += n as u64;
        on_progress(total);
    }
    out.flush()?;
    Ok(total)
}
