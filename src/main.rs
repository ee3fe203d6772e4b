//! mangad：通用漫画章节下载器。
//!
//! 给定作品目录页地址，识别章节链接，按需筛选，逐章收集图片并发下载，打包为 CBZ。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/中断清理等基础设施
//! - `chapters`：章节标签解析、目录提取与筛选
//! - `page_parser`：章节页图片收集与归并
//! - `network_parser`：HTTP 客户端与挑战页回退
//! - `download`：图片/章节两级并发下载与打包

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::{error, info};

mod base_system;
mod chapters;
mod download;
mod network_parser;
mod page_parser;

use base_system::config::load_or_create;
use base_system::context::{Config, Overrides};
use base_system::file_cleaner::{cleanup_unfinished_temp_folders, remove_if_empty};
use base_system::logging::{LogSettings, LogSystem};
use chapters::selection::ChapterFilter;
use download::downloader::{DownloadRequest, download_series};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "mangad")]
#[command(about = "Generic manga chapter downloader (CBZ output)")]
struct Cli {
    /// 作品目录页地址
    #[arg(long)]
    url: Option<String>,

    /// 只下载单章：先按章节标签匹配，其次按 1 起始序号
    #[arg(long)]
    chapter: Option<String>,

    /// 序号范围，如 1-10
    #[arg(long)]
    range: Option<String>,

    /// 排除的序号范围
    #[arg(long)]
    exclude_range: Option<String>,

    /// 序号列表，如 1,3,5
    #[arg(long)]
    list: Option<String>,

    /// 排除的序号列表
    #[arg(long)]
    exclude_list: Option<String>,

    /// 允许的图片扩展名，`|`、`,` 或空格分隔
    #[arg(long)]
    allow_ext: Option<String>,

    /// 输出目录
    #[arg(long, short = 'o')]
    output: Option<String>,

    /// 每章并发下载图片数
    #[arg(long)]
    image_workers: Option<usize>,

    /// 并发处理章节数
    #[arg(long)]
    chapter_workers: Option<usize>,

    /// 打包后保留图片目录
    #[arg(long, default_value_t = false)]
    keep_folders: bool,

    /// 只列出将要下载的章节
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// 部分图片失败时仍打包其余图片
    #[arg(long, default_value_t = false)]
    skip_broken: bool,

    /// 分析内联脚本并探测图片接口
    #[arg(long, default_value_t = false)]
    check_js: bool,

    /// 遇到反爬挑战页时调用无头浏览器
    #[arg(long, default_value_t = false)]
    with_cf: bool,

    /// 请求附带的 Cookie
    #[arg(long)]
    cookie: Option<String>,

    /// 从文件首行读取 Cookie
    #[arg(long)]
    cookie_file: Option<String>,

    /// 自定义 User-Agent
    #[arg(long)]
    user_agent: Option<String>,

    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 忽略 config.yml，仅使用默认值与命令行参数
    #[arg(long, default_value_t = false)]
    ignore_config: bool,

    /// 数据目录路径（存放 config.yml 与 logs）
    #[arg(long)]
    data_dir: Option<String>,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            output: self.output.clone(),
            image_workers: self.image_workers,
            chapter_workers: self.chapter_workers,
            keep_folders: self.keep_folders,
            debug: self.debug,
            url: self.url.clone(),
            range: self.range.clone(),
            exclude_range: self.exclude_range.clone(),
            list: self.list.clone(),
            exclude_list: self.exclude_list.clone(),
            allow_ext: self.allow_ext.clone(),
            check_js: self.check_js,
            with_cf: self.with_cf,
            skip_broken: self.skip_broken,
            cookie: self.cookie.clone(),
            cookie_file: self.cookie_file.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("mangad v{VERSION}");
        return Ok(());
    }

    let data_dir = cli.data_dir.as_deref().map(Path::new);

    let mut config = if cli.ignore_config {
        Config::default()
    } else {
        let (config, path) = load_or_create::<Config>(data_dir).map_err(|e| anyhow!(e))?;
        println!("已加载配置: {}", path.display());
        config
    };
    config.apply_overrides(&cli.overrides());

    let log = LogSystem::start(LogSettings::cli(config.debug), data_dir).map_err(|e| anyhow!(e))?;
    info!(target: "startup", "mangad v{}", VERSION);
    println!("生效配置:");
    for line in config.summary_lines() {
        println!("{line}");
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let output_dir = config.output_dir();
    log.install_interrupt_handler(cancel.clone(), move || {
        let removed = cleanup_unfinished_temp_folders(&output_dir);
        if removed > 0 {
            info!(target: "cleanup", "已清理 {} 个未完成的章节目录", removed);
        }
        remove_if_empty(&output_dir);
    })
    .map_err(|e| anyhow!(e))?;

    let request = DownloadRequest {
        url: config.default_url.clone(),
        filter: ChapterFilter {
            chapter: cli.chapter.clone(),
            range: Some(config.default_range.clone()),
            exclude_range: Some(config.default_exclude_range.clone()),
            list: Some(config.default_list.clone()),
            exclude_list: Some(config.default_exclude_list.clone()),
        },
        dry_run: cli.dry_run,
    };

    match download_series(&config, &request, &cancel) {
        Ok(result) => {
            if cancel.load(Ordering::Relaxed) {
                error!(target: "download", "下载被中断（完成 {} 章）", result.success);
                log.shutdown();
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => {
            error!(target: "download", "{:#}", e);
            log.shutdown();
            Err(e)
        }
    }
}
