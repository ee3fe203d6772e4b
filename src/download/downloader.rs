use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

use super::archive::CbzArchiver;
use super::chapter_pool::{ChapterPool, ChapterPoolOptions};
use super::image_pool::ImagePoolOptions;
use super::models::{ChapterOutcome, ChapterReport, RetryPolicy, Stats, StatsSnapshot};
use super::progress::CliProgress;
use crate::base_system::context::Config;
use crate::base_system::human::human_bytes;
use crate::chapters::Chapter;
use crate::chapters::selection::ChapterFilter;
use crate::network_parser::network::{HttpClient, HttpOptions};
use crate::network_parser::renderer::renderer_for;
use crate::page_parser::scraper::GenericScraper;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadResult {
    pub success: u32,
    pub failed: u32,
    pub canceled: u32,
}

impl DownloadResult {
    pub fn from_reports(reports: &[ChapterReport]) -> Self {
        let mut r = Self::default();
        for rep in reports {
            match rep.outcome {
                ChapterOutcome::Archived { .. } => r.success += 1,
                ChapterOutcome::Failed(_) => r.failed += 1,
                ChapterOutcome::Canceled { .. } | ChapterOutcome::Skipped => r.canceled += 1,
            }
        }
        r
    }
}

#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    pub url: String,
    pub filter: ChapterFilter,
    pub dry_run: bool,
}

/// 完整流程：列目录 → 选章 → （dry-run 或）并发下载打包 → 汇总。
pub fn download_series(
    config: &Config,
    request: &DownloadRequest,
    cancel: &AtomicBool,
) -> Result<DownloadResult> {
    let url = request.url.trim();
    if url.is_empty() {
        return Err(anyhow!("缺少漫画地址（--url 或配置 default_url）"));
    }

    let http = HttpClient::new(
        &HttpOptions::from_config(config),
        renderer_for(config.with_cf, &config.headless_command),
    )
    .context("初始化 HTTP 客户端失败")?;
    let scraper = GenericScraper::new(&http, &config.allow_ext, config.check_js);

    let all = scraper.list_chapters(url)?;
    if all.is_empty() {
        return Err(anyhow!("未在页面中找到任何章节: {url}"));
    }
    println!("找到 {} 个章节", all.len());

    let selected = request.filter.apply(&all)?;
    if selected.is_empty() {
        return Err(anyhow!("没有选中任何章节"));
    }
    info!(target: "download", "选中 {} / {} 个章节", selected.len(), all.len());

    if request.dry_run {
        println!("Dry run：将下载以下 {} 个章节", selected.len());
        for line in plan_lines(&selected) {
            println!("{line}");
        }
        if let [only] = selected.as_slice() {
            let images = scraper.image_urls(&only.url)?;
            println!("章节 {} 共 {} 张图片：", only.label(), images.len());
            for (i, u) in images.iter().enumerate() {
                println!("{:>4}. {}", i + 1, u);
            }
        }
        return Ok(DownloadResult::default());
    }

    let output_dir = config.output_dir();
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("创建输出目录失败: {}", output_dir.display()))?;
    debug!(target: "download", "输出目录 {}", output_dir.display());

    let stats = Stats::default();
    let board = CliProgress::new();
    let pool = ChapterPool {
        resolver: &scraper,
        source: &http,
        archiver: &CbzArchiver,
        board: &board,
        stats: &stats,
        cancel,
        options: ChapterPoolOptions {
            workers: config.chapter_workers,
            image: ImagePoolOptions {
                workers: config.image_workers,
                tolerate_failures: config.skip_broken,
                retry: RetryPolicy {
                    attempt_timeout: config.request_timeout(),
                    ..RetryPolicy::default()
                },
            },
            output_dir,
            keep_folders: config.keep_folders,
        },
    };

    let started = Instant::now();
    let reports = pool.run(&selected);
    let elapsed = started.elapsed();

    for line in summary_lines(&reports, stats.snapshot(), elapsed) {
        println!("{line}");
    }
    if cancel.load(Ordering::Relaxed) {
        info!(target: "download", "下载被中断，已完成的章节已保存");
    }
    Ok(DownloadResult::from_reports(&reports))
}

pub fn plan_lines(chapters: &[Chapter]) -> Vec<String> {
    chapters
        .iter()
        .enumerate()
        .map(|(i, ch)| format!("{:>4}. Ch.{:<8} {}  {}", i + 1, ch.label(), ch.title, ch.url))
        .collect()
}

pub fn summary_lines(
    reports: &[ChapterReport],
    stats: StatsSnapshot,
    elapsed: Duration,
) -> Vec<String> {
    let mut lines = Vec::new();
    for rep in reports {
        match &rep.outcome {
            ChapterOutcome::Archived { images, failed, .. } if *failed > 0 => lines.push(format!(
                "章节 {} 已打包 {} 张，{} 张图片下载失败已跳过",
                rep.label, images, failed
            )),
            ChapterOutcome::Failed(reason) => {
                lines.push(format!("章节 {} 失败: {}", rep.label, reason));
            }
            ChapterOutcome::Canceled { images, bytes } => lines.push(format!(
                "章节 {} 已中断（保留 {} 张，{}）",
                rep.label,
                images,
                human_bytes(*bytes)
            )),
            _ => {}
        }
    }
    let result = DownloadResult::from_reports(reports);
    lines.push(format!(
        "完成 {} 章，失败 {} 章，未完成 {} 章；共 {} 张图片，{}，用时 {:.1}s",
        stats.chapters,
        result.failed,
        result.canceled,
        stats.images,
        human_bytes(stats.bytes),
        elapsed.as_secs_f64()
    ));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapters::{ChapterIdentity, SubType};
    use std::path::PathBuf;

    fn report(label: &str, outcome: ChapterOutcome) -> ChapterReport {
        ChapterReport {
            label: label.to_string(),
            outcome,
        }
    }

    #[test]
    fn result_counts_outcomes() {
        let reports = vec![
            report(
                "1",
                ChapterOutcome::Archived {
                    path: PathBuf::from("1.cbz"),
                    images: 3,
                    bytes: 10,
                    failed: 0,
                },
            ),
            report("2", ChapterOutcome::Failed("boom".into())),
            report("3", ChapterOutcome::Canceled { images: 1, bytes: 2 }),
            report("4", ChapterOutcome::Skipped),
        ];
        assert_eq!(
            DownloadResult::from_reports(&reports),
            DownloadResult {
                success: 1,
                failed: 1,
                canceled: 2
            }
        );

        let lines = summary_lines(
            &reports,
            StatsSnapshot {
                chapters: 1,
                images: 4,
                bytes: 2048,
            },
            Duration::from_millis(1500),
        );
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("boom"));
        assert!(lines[2].contains("2.00 KB"));
        assert!(lines[2].contains("1.5s"));
    }

    #[test]
    fn summary_mentions_skipped_images() {
        let reports = vec![report(
            "7",
            ChapterOutcome::Archived {
                path: PathBuf::from("7.cbz"),
                images: 9,
                bytes: 900,
                failed: 2,
            },
        )];
        let lines = summary_lines(&reports, StatsSnapshot::default(), Duration::ZERO);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("章节 7"));
        assert!(lines[0].contains("2 张图片下载失败"));
    }

    #[test]
    fn plan_lists_label_title_and_url() {
        let ch = Chapter {
            identity: ChapterIdentity::new(12, SubType::Decimal, 5),
            title: "Chapter 12.5".into(),
            url: "https://example.com/chapter-12-5".into(),
        };
        let lines = plan_lines(&[ch]);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("Ch.12.5"));
        assert!(lines[0].contains("https://example.com/chapter-12-5"));
    }
}
