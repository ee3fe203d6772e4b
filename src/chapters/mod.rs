//! 章节识别与选择。
//!
//! 子模块：
//! - `models`：章节身份 / 章节 / 文件命名
//! - `label`：链接 → 章节身份的启发式解析
//! - `lister`：目录页链接扫描、去重、排序
//! - `selection`：按标签/序号/范围/列表过滤

pub mod label;
pub mod lister;
pub mod models;
pub mod selection;

pub use models::{Chapter, ChapterIdentity, SubType};
