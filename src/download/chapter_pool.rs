//! 章节级并发：外层工作池，每章依次解析图片、下载、打包。
//!
//! 单章失败只记录在该章的报告中，不影响其他章节。

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel as channel;
use tracing::{error, info, warn};

use super::archive::ChapterArchiver;
use super::fetch::ImageSource;
use super::image_pool::{ImagePoolOptions, download_chapter_images};
use super::models::{ChapterOutcome, ChapterReport, Stats, plan_image_jobs};
use super::progress::ProgressBoard;
use crate::base_system::file_cleaner::cleanup_folder;
use crate::chapters::Chapter;

/// 章节页 → 有序图片地址。
pub trait ImageResolver: Send + Sync {
    fn resolve_images(&self, chapter: &Chapter) -> anyhow::Result<Vec<String>>;
}

#[derive(Debug, Clone)]
pub struct ChapterPoolOptions {
    pub workers: usize,
    pub image: ImagePoolOptions,
    pub output_dir: PathBuf,
    pub keep_folders: bool,
}

pub struct ChapterPool<'a> {
    pub resolver: &'a dyn ImageResolver,
    pub source: &'a dyn ImageSource,
    pub archiver: &'a dyn ChapterArchiver,
    pub board: &'a dyn ProgressBoard,
    pub stats: &'a Stats,
    pub cancel: &'a AtomicBool,
    pub options: ChapterPoolOptions,
}

impl ChapterPool<'_> {
    /// 处理全部章节，返回与输入顺序一致的报告。
    pub fn run(&self, chapters: &[Chapter]) -> Vec<ChapterReport> {
        if chapters.is_empty() {
            return Vec::new();
        }
        let workers = self.options.workers.clamp(1, chapters.len());
        let mut outcomes: Vec<Option<ChapterOutcome>> = chapters.iter().map(|_| None).collect();

        thread::scope(|s| {
            let (tx, rx) = channel::bounded::<(usize, &Chapter)>(0);
            let (tx_evt, rx_evt) = channel::unbounded::<(usize, ChapterOutcome)>();

            for _ in 0..workers {
                let rx = rx.clone();
                let tx_evt = tx_evt.clone();
                s.spawn(move || {
                    for (idx, chapter) in rx.iter() {
                        let outcome = self.process(chapter);
                        let _ = tx_evt.send((idx, outcome));
                    }
                });
            }
            drop(rx);
            drop(tx_evt);

            for item in chapters.iter().enumerate() {
                if self.cancel.load(Ordering::Relaxed) {
                    break;
                }
                if tx.send(item).is_err() {
                    break;
                }
            }
            drop(tx);

            for (idx, outcome) in rx_evt.iter() {
                outcomes[idx] = Some(outcome);
            }
        });

        chapters
            .iter()
            .zip(outcomes)
            .map(|(ch, o)| ChapterReport {
                label: ch.label().to_string(),
                outcome: o.unwrap_or(ChapterOutcome::Skipped),
            })
            .collect()
    }

    fn process(&self, chapter: &Chapter) -> ChapterOutcome {
        let label = chapter.label();
        if self.cancel.load(Ordering::Relaxed) {
            return ChapterOutcome::Skipped;
        }

        let urls = match self.resolver.resolve_images(chapter) {
            Ok(urls) if !urls.is_empty() => urls,
            Ok(_) => {
                error!(target: "download", "章节 {} 没有找到图片", label);
                return ChapterOutcome::Failed("no images found".to_string());
            }
            Err(e) => {
                error!(target: "download", "章节 {} 解析图片失败: {:#}", label, e);
                return ChapterOutcome::Failed(format!("{e:#}"));
            }
        };
        info!(target: "download", "章节 {}: {} 张图片", label, urls.len());

        let output = &self.options.output_dir;
        let folder = chapter.folder_path(output);
        let jobs = plan_image_jobs(&urls, &folder);
        let bar = self.board.register(&format!("Ch.{label}"), jobs.len());

        let images = match download_chapter_images(
            self.source,
            &jobs,
            &chapter.url,
            &self.options.image,
            bar.as_ref(),
            self.cancel,
        ) {
            Ok(images) => images,
            Err(e) => {
                bar.finish();
                cleanup_folder(&folder);
                error!(target: "download", "章节 {} 下载失败: {}", label, e);
                return ChapterOutcome::Failed(e.to_string());
            }
        };
        self.stats.add_images(images.files.len(), images.bytes);

        if images.canceled {
            bar.finish();
            warn!(
                target: "download",
                "章节 {} 已取消，保留 {} 张已下载图片于 {}",
                label,
                images.files.len(),
                folder.display()
            );
            return ChapterOutcome::Canceled {
                images: images.files.len(),
                bytes: images.bytes,
            };
        }
        if images.files.is_empty() {
            bar.finish();
            cleanup_folder(&folder);
            warn!(target: "download", "章节 {} 没有可打包的图片（跳过 {} 张）", label, images.skipped);
            return ChapterOutcome::Failed("no downloadable images".to_string());
        }

        let archive = chapter.archive_path(output);
        if let Err(e) = self.archiver.build(&images.files, &archive) {
            bar.finish();
            error!(target: "download", "章节 {} 打包失败: {}", label, e);
            return ChapterOutcome::Failed(e.to_string());
        }
        if !self.options.keep_folders {
            cleanup_folder(&folder);
        }
        if images.failed > 0 {
            warn!(target: "download", "章节 {} 已跳过 {} 张失败图片", label, images.failed);
        }
        self.stats.add_chapter();
        bar.finish();
        info!(target: "download", "已保存 {}", archive.display());

        ChapterOutcome::Archived {
            path: archive,
            images: images.files.len(),
            bytes: images.bytes,
            failed: images.failed,
        }
    }
}
