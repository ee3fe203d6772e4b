//! 章节选择：按标签/序号/范围/列表过滤目录结果。
//!
//! 序号与范围均为 1 起始、闭区间，作用于排好序的章节列表。

use thiserror::Error;

use super::models::Chapter;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("invalid chapter range: {0}")]
    InvalidRange(String),
    #[error("invalid chapter list entry: {0}")]
    InvalidList(String),
    #[error("chapter not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Default)]
pub struct ChapterFilter {
    /// 单章：优先按 label 匹配，其次按序号
    pub chapter: Option<String>,
    pub range: Option<String>,
    pub exclude_range: Option<String>,
    pub list: Option<String>,
    pub exclude_list: Option<String>,
}

impl ChapterFilter {
    pub fn is_empty(&self) -> bool {
        [
            &self.chapter,
            &self.range,
            &self.exclude_range,
            &self.list,
            &self.exclude_list,
        ]
        .iter()
        .all(|v| v.as_deref().map(str::trim).unwrap_or("").is_empty())
    }

    pub fn apply(&self, all: &[Chapter]) -> Result<Vec<Chapter>, SelectionError> {
        if let Some(chapter) = non_empty(&self.chapter) {
            return filter_single(all, chapter);
        }

        let n = all.len();
        let mut keep = vec![true; n];

        if let Some(rng) = non_empty(&self.range) {
            let (start, end) = parse_range(rng, n)?;
            for (i, k) in keep.iter_mut().enumerate() {
                *k = i >= start && i <= end;
            }
        }
        if let Some(rng) = non_empty(&self.exclude_range) {
            let (start, end) = parse_range(rng, n)?;
            for k in &mut keep[start..=end] {
                *k = false;
            }
        }
        if let Some(list) = non_empty(&self.list) {
            let mut allowed = vec![false; n];
            for i in parse_list(list, n)? {
                allowed[i] = true;
            }
            for (k, a) in keep.iter_mut().zip(allowed) {
                *k = *k && a;
            }
        }
        if let Some(list) = non_empty(&self.exclude_list) {
            for i in parse_list(list, n)? {
                keep[i] = false;
            }
        }

        Ok(all
            .iter()
            .zip(keep)
            .filter_map(|(ch, k)| k.then(|| ch.clone()))
            .collect())
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

pub fn filter_by_label(all: &[Chapter], label: &str) -> Vec<Chapter> {
    all.iter().filter(|c| c.label() == label).cloned().collect()
}

fn filter_single(all: &[Chapter], chapter: &str) -> Result<Vec<Chapter>, SelectionError> {
    let by_label = filter_by_label(all, chapter);
    if !by_label.is_empty() {
        return Ok(by_label);
    }
    match chapter.parse::<usize>() {
        Ok(idx) if idx >= 1 && idx <= all.len() => Ok(vec![all[idx - 1].clone()]),
        Ok(idx) => Err(SelectionError::NotFound(format!(
            "index {idx} out of range (1-{})",
            all.len()
        ))),
        Err(_) => Err(SelectionError::NotFound(format!("{chapter:?}"))),
    }
}

/// `"a-b"` → 0 起始的闭区间 `(a-1, b-1)`。
fn parse_range(s: &str, max: usize) -> Result<(usize, usize), SelectionError> {
    let Some((a, b)) = s.split_once('-') else {
        return Err(SelectionError::InvalidRange(s.to_string()));
    };
    let start: usize = a
        .trim()
        .parse()
        .map_err(|_| SelectionError::InvalidRange(format!("non-integer values in {s:?}")))?;
    let end: usize = b
        .trim()
        .parse()
        .map_err(|_| SelectionError::InvalidRange(format!("non-integer values in {s:?}")))?;
    if start == 0 || end == 0 || start > end || end > max {
        return Err(SelectionError::InvalidRange(format!("out of bounds {s:?}")));
    }
    Ok((start - 1, end - 1))
}

fn parse_list(s: &str, max: usize) -> Result<Vec<usize>, SelectionError> {
    let mut out = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.parse::<usize>() {
            Ok(n) if n >= 1 && n <= max => out.push(n - 1),
            _ => return Err(SelectionError::InvalidList(part.to_string())),
        }
    }
    Ok(out)
}
