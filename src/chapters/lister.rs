//! 章节目录页解析：扫描所有链接，过滤、去重并排序。

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use super::label::{parse_chapter_label, re_short_chapter, re_volume_chapter};
use super::models::Chapter;

fn re_likely_chapter() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?i)(?:^|[-_/])(?:ch|chapter)[-_]?\d+").unwrap())
}

fn anchor_selector() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("a[href]").unwrap())
}

/// 比完整解析更便宜的预过滤：href 形态或文字前缀像章节链接。
pub fn looks_like_chapter_link(href: &str, title: &str) -> bool {
    let h = href.to_lowercase();
    let t = title.to_lowercase();

    re_likely_chapter().is_match(&h)
        || re_volume_chapter().is_match(&h)
        || re_short_chapter().is_match(&h)
        || t.starts_with("ch ")
        || t.starts_with("chapter ")
}

pub fn resolve_url(base: &Url, href: &str) -> String {
    if href.is_empty() {
        return base.to_string();
    }
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// 从目录页 HTML 中提取章节列表。
///
/// 按解析后的绝对地址去重（先出现者保留），按 `(main, rank, sub)` 稳定排序。
/// 没有符合条件的链接时返回空列表。
pub fn extract_chapters(page_url: &Url, html: &str) -> Vec<Chapter> {
    let doc = Html::parse_document(html);
    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<Chapter> = Vec::new();

    for a in doc.select(anchor_selector()) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        let text = a.text().collect::<String>();
        let text = text.trim();

        if !looks_like_chapter_link(href, text) {
            continue;
        }
        let Some(identity) = parse_chapter_label(href, text) else {
            continue;
        };

        let url = resolve_url(page_url, href);
        if !seen.insert(url.clone()) {
            continue;
        }

        let title = if text.is_empty() {
            format!("Chapter {}", identity.label)
        } else {
            text.split_whitespace().collect::<Vec<_>>().join(" ")
        };

        out.push(Chapter {
            identity,
            title,
            url,
        });
    }

    out.sort_by(|a, b| a.identity.sort_cmp(&b.identity));
    out
}
