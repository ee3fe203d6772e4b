//! 进度上报：每章一条 CLI 进度条，核心流程只依赖 `ProgressBoard` / `ProgressSink`。

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::base_system::human::human_bytes;

/// 单章进度句柄。
pub trait ProgressSink: Send + Sync {
    fn update(&self, done_images: usize, total_images: usize, bytes: u64);
    fn finish(&self);
}

pub trait ProgressBoard: Send + Sync {
    fn register(&self, prefix: &str, total_images: usize) -> Box<dyn ProgressSink>;
}

pub struct CliProgress {
    mp: MultiProgress,
    style: ProgressStyle,
}

impl CliProgress {
    pub fn new() -> Self {
        let mp = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template(
            "{prefix:>12} [{elapsed_precise}] {wide_bar} {pos}/{len} 页 {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
        Self { mp, style }
    }
}

impl Default for CliProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBoard for CliProgress {
    fn register(&self, prefix: &str, total_images: usize) -> Box<dyn ProgressSink> {
        let bar = self.mp.add(ProgressBar::new(total_images as u64));
        bar.set_style(self.style.clone());
        bar.set_prefix(prefix.to_string());
        Box::new(ChapterBar { bar })
    }
}

struct ChapterBar {
    bar: ProgressBar,
}

impl ProgressSink for ChapterBar {
    fn update(&self, done_images: usize, total_images: usize, bytes: u64) {
        self.bar.set_length(total_images as u64);
        self.bar.set_position(done_images as u64);
        self.bar.set_message(human_bytes(bytes));
    }

    fn finish(&self) {
        self.bar.finish();
    }
}

/// 无界面场景（dry-run、测试）。
pub struct NoProgress;

impl ProgressBoard for NoProgress {
    fn register(&self, _prefix: &str, _total_images: usize) -> Box<dyn ProgressSink> {
        Box::new(NoProgress)
    }
}

impl ProgressSink for NoProgress {
    fn update(&self, _done_images: usize, _total_images: usize, _bytes: u64) {}
    fn finish(&self) {}
}
