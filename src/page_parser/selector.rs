//! 图片候选归并：同一张图的多种尺寸合为一组，选出代表并排定阅读顺序。

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use super::collector::ImageCandidate;

fn re_resize_suffix() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"[-_](\d{2,5})x(\d{2,5})$").unwrap())
}

fn url_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(u) => u.path().to_string(),
        Err(_) => super::html_utils::strip_query(url).to_string(),
    }
}

fn split_stem(path: &str) -> (&str, &str, &str) {
    let (dir, name) = match path.rfind('/') {
        Some(i) => path.split_at(i + 1),
        None => ("", path),
    };
    match name.rfind('.') {
        Some(i) if i > 0 => (dir, &name[..i], &name[i..]),
        _ => (dir, name, ""),
    }
}

/// 文件名末尾 `-WxH` / `_WxH` 尺寸后缀。
pub fn resize_suffix(url: &str) -> Option<(u32, u32)> {
    let path = url_path(url);
    let (_, stem, _) = split_stem(&path);
    let caps = re_resize_suffix().captures(stem)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// 分组键：地址路径去掉尺寸后缀（保留扩展名）；主机与查询串不参与。
pub fn normalized_identity(url: &str) -> String {
    let path = url_path(url);
    let (dir, stem, ext) = split_stem(&path);
    let stem = re_resize_suffix().replace(stem, "");
    format!("{dir}{stem}{ext}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    pub url: String,
    pub position: Option<u32>,
    pub first_seen: u64,
}

struct Group<'a> {
    members: Vec<&'a ImageCandidate>,
}

impl Group<'_> {
    /// 无尺寸后缀的最早发现者优先；否则取面积最大者，相同时取先出现者。
    fn representative(&self) -> &ImageCandidate {
        let plain = self
            .members
            .iter()
            .filter(|m| resize_suffix(&m.url).is_none())
            .min_by_key(|m| m.discovery_order);
        if let Some(m) = plain {
            return *m;
        }
        let mut best = self.members[0];
        let mut best_area = area(best);
        for &m in &self.members[1..] {
            let a = area(m);
            if a > best_area {
                best = m;
                best_area = a;
            }
        }
        best
    }

    fn position(&self) -> Option<u32> {
        self.members.iter().filter_map(|m| m.position_hint).min()
    }

    fn first_seen(&self) -> u64 {
        self.members
            .iter()
            .map(|m| m.discovery_order)
            .min()
            .unwrap_or(u64::MAX)
    }
}

fn area(c: &ImageCandidate) -> u64 {
    resize_suffix(&c.url)
        .map(|(w, h)| u64::from(w) * u64::from(h))
        .unwrap_or(0)
}

/// 归并并排序：有位置提示的组按提示升序在前，其余按最早发现序号。
pub fn select_ranked(candidates: &[ImageCandidate]) -> Vec<SelectedImage> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Group<'_>> = Vec::new();
    for c in candidates {
        let key = normalized_identity(&c.url);
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Group {
                members: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].members.push(c);
    }

    let mut out: Vec<SelectedImage> = groups
        .iter()
        .map(|g| SelectedImage {
            url: g.representative().url.clone(),
            position: g.position(),
            first_seen: g.first_seen(),
        })
        .collect();
    out.sort_by_key(|s| (s.position.is_none(), s.position.unwrap_or(0), s.first_seen));
    out
}

pub fn select_images(candidates: &[ImageCandidate]) -> Vec<String> {
    select_ranked(candidates).into_iter().map(|s| s.url).collect()
}
