//! 章节页解析。
//!
//! 子模块：
//! - `html_utils`：扩展名过滤、srcset/背景图解析
//! - `collector`：多策略图片候选收集
//! - `selector`：尺寸变体归并与排序
//! - `js_probe`：内联脚本接口探测
//! - `scraper`：组合以上步骤的站点抓取入口

pub mod collector;
pub mod html_utils;
pub mod js_probe;
pub mod scraper;
pub mod selector;
