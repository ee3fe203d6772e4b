//! 章节数据模型与文件命名。

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::base_system::file_cleaner::TEMP_SUFFIX;

/// 章节子序号的类型，排序优先级 `None < Decimal < Dash`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SubType {
    None,
    Decimal,
    Dash,
}

impl SubType {
    pub fn rank(self) -> u8 {
        match self {
            SubType::None => 0,
            SubType::Decimal => 1,
            SubType::Dash => 2,
        }
    }
}

/// 一个链接解析出的章节身份；label 相同即视为同一章。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterIdentity {
    pub main_number: u32,
    pub sub_type: SubType,
    pub sub_number: u32,
    pub label: String,
}

impl ChapterIdentity {
    pub fn new(main_number: u32, sub_type: SubType, sub_number: u32) -> Self {
        let label = match sub_type {
            SubType::None => format!("{main_number}"),
            SubType::Decimal => format!("{main_number}.{sub_number}"),
            SubType::Dash => format!("{main_number}-{sub_number}"),
        };
        Self::with_label(main_number, sub_type, sub_number, label)
    }

    pub fn with_label(main_number: u32, sub_type: SubType, sub_number: u32, label: String) -> Self {
        let sub_number = if sub_type == SubType::None {
            0
        } else {
            sub_number
        };
        Self {
            main_number,
            sub_type,
            sub_number,
            label,
        }
    }

    /// 列表排序键：`(main, rank, sub)`。
    pub fn sort_cmp(&self, other: &ChapterIdentity) -> Ordering {
        (self.main_number, self.sub_type.rank(), self.sub_number).cmp(&(
            other.main_number,
            other.sub_type.rank(),
            other.sub_number,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chapter {
    pub identity: ChapterIdentity,
    pub title: String,
    pub url: String,
}

impl Chapter {
    pub fn label(&self) -> &str {
        &self.identity.label
    }

    fn base_name(&self) -> String {
        let label = sanitize(&self.identity.label);
        let title = sanitize(&self.title);
        if !title.is_empty() && title != label {
            format!("{label}_{title}")
        } else {
            label
        }
    }

    pub fn folder_name(&self) -> String {
        format!("{}{}", self.base_name(), TEMP_SUFFIX)
    }

    pub fn archive_name(&self) -> String {
        format!("{}.cbz", self.base_name())
    }

    pub fn folder_path(&self, output: &Path) -> PathBuf {
        output.join(self.folder_name())
    }

    pub fn archive_path(&self, output: &Path) -> PathBuf {
        output.join(self.archive_name())
    }
}

/// 文件名清洗：小写，分隔符统一为 `_`，只保留字母/数字/下划线。
pub fn sanitize(s: &str) -> String {
    let lowered = s.to_lowercase();
    let mut mapped = String::with_capacity(lowered.len());
    for ch in lowered.chars() {
        match ch {
            '•' | '-' | '—' | '–' | '/' | '\\' | '.' | ' ' => mapped.push('_'),
            '(' | ')' => {}
            c if c.is_alphanumeric() || c == '_' => mapped.push(c),
            _ => {}
        }
    }

    let mut collapsed = String::with_capacity(mapped.len());
    for ch in mapped.chars() {
        if ch == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(ch);
    }
    collapsed.trim_matches('_').to_string()
}
