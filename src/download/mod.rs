//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`：任务、统计、章节报告与错误类型
//! - `fetch`：单张图片下载与重试
//! - `image_pool`：单章图片并发工作池
//! - `chapter_pool`：章节级并发与打包
//! - `archive`：CBZ 打包
//! - `progress`：进度上报与 CLI 进度条
//! - `downloader`：下载主流程编排

pub mod archive;
pub mod chapter_pool;
pub mod downloader;
pub mod fetch;
pub mod image_pool;
pub mod models;
pub mod progress;
