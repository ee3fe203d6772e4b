//! 章节标签解析：从链接 href 与可见文字推断章节身份。
//!
//! 匹配器按固定优先级排列在 `MATCHERS` 中，第一个命中的生效；
//! 新的站点 URL 形态只需追加一个匹配器。

use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::models::{ChapterIdentity, SubType};

fn re_chapter_dash() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"chapter[_\-]?0*([0-9]+)[_\-]?([0-9]+)?").unwrap())
}

pub(crate) fn re_volume_chapter() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"vol[_\-]?(\d+)[/_\-]ch[_\-]?(\d+(?:\.\d+)?)").unwrap())
}

pub(crate) fn re_short_chapter() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?:^|[/\-_])ch[_\-]?(\d+(?:\.\d+)?)").unwrap())
}

fn re_plain_segment() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"[/\-](\d+(?:\.\d+)?)(?:$|[/\-_])").unwrap())
}

fn re_title_prefix() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*[.\- ]").unwrap())
}

fn re_title_phrase() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| {
        Regex::new(
            r"(?i)(?:vol(?:ume)?[_\-\s]*\d+[_\-\s]*)?(?:chapter|ch)[_\-\s]*0*([0-9]+)(?:[_\-\s]*([.\-])[_\-\s]*([0-9]+))?",
        )
        .unwrap()
    })
}

/// 单个链接的输入视图，`href_lower`/`title_lower` 预先计算一次。
pub(crate) struct LinkText<'a> {
    href: &'a str,
    title: &'a str,
    href_lower: String,
    title_lower: String,
}

impl<'a> LinkText<'a> {
    pub(crate) fn new(href: &'a str, title: &'a str) -> Self {
        Self {
            href,
            title,
            href_lower: href.to_lowercase(),
            title_lower: title.to_lowercase(),
        }
    }
}

type Matcher = fn(&LinkText<'_>) -> Option<ChapterIdentity>;

/// 按优先级排列：前四个看 href，后两个看标题。
const MATCHERS: &[(&str, Matcher)] = &[
    ("chapter-dash", match_chapter_dash),
    ("volume-chapter", match_volume_chapter),
    ("short-chapter", match_short_chapter),
    ("plain-segment", match_plain_segment),
    ("title-prefix", match_title_prefix),
    ("title-phrase", match_title_phrase),
];

/// 解析章节身份；`None` 表示该链接不是章节链接（拒绝，而非错误）。
pub fn parse_chapter_label(href: &str, title: &str) -> Option<ChapterIdentity> {
    let link = LinkText::new(href, title);
    if !has_chapter_keyword(&link) || is_excluded_path(&link) {
        return None;
    }
    MATCHERS.iter().find_map(|(_, matcher)| matcher(&link))
}

/// 章节/卷关键字；以 `"12. 标题"` 这种编号开头的标题同样算作章节标记。
fn has_chapter_keyword(link: &LinkText<'_>) -> bool {
    let keyword = |s: &str| s.contains("ch") || s.contains("chapter") || s.contains("vol");
    keyword(&link.href_lower)
        || keyword(&link.title_lower)
        || re_title_prefix().is_match(link.title)
}

/// 已知的非章节路径：用户主页、聚合列表页、不含章节信息的作品页。
fn is_excluded_path(link: &LinkText<'_>) -> bool {
    let h = link.href_lower.as_str();
    h.contains("/u/")
        || h.contains("batolists")
        || (h.contains("/title/") && !h.contains("ch") && !h.contains("vol"))
}

fn num(caps: &Captures<'_>, idx: usize) -> Option<u32> {
    caps.get(idx)?.as_str().parse().ok()
}

/// `"12"` → (12, None)；`"12.5"` → (12, Some(5))
fn split_decimal(s: &str) -> Option<(u32, Option<u32>)> {
    match s.split_once('.') {
        Some((main, frac)) => Some((main.parse().ok()?, Some(frac.parse().ok()?))),
        None => Some((s.parse().ok()?, None)),
    }
}

fn decimal_identity(s: &str) -> Option<ChapterIdentity> {
    match split_decimal(s)? {
        (main, Some(sub)) => Some(ChapterIdentity::new(main, SubType::Decimal, sub)),
        (main, None) => Some(ChapterIdentity::new(main, SubType::None, 0)),
    }
}

fn match_chapter_dash(link: &LinkText<'_>) -> Option<ChapterIdentity> {
    let caps = re_chapter_dash().captures(link.href)?;
    let main = num(&caps, 1)?;
    match caps.get(2) {
        Some(_) => Some(ChapterIdentity::new(main, SubType::Dash, num(&caps, 2)?)),
        None => Some(ChapterIdentity::new(main, SubType::None, 0)),
    }
}

/// `vol-<v>/ch-<n>`：章节号作主序号，卷号作子序号，label 渲染为 `"v.n"`。
fn match_volume_chapter(link: &LinkText<'_>) -> Option<ChapterIdentity> {
    let caps = re_volume_chapter().captures(&link.href_lower)?;
    let volume = num(&caps, 1)?;
    let (chapter, _) = split_decimal(caps.get(2)?.as_str())?;
    Some(ChapterIdentity::with_label(
        chapter,
        SubType::Decimal,
        volume,
        format!("{volume}.{chapter}"),
    ))
}

fn match_short_chapter(link: &LinkText<'_>) -> Option<ChapterIdentity> {
    let caps = re_short_chapter().captures(link.href)?;
    decimal_identity(caps.get(1)?.as_str())
}

fn match_plain_segment(link: &LinkText<'_>) -> Option<ChapterIdentity> {
    if link.href_lower.contains("vol") {
        return None;
    }
    let caps = re_plain_segment().captures(&link.href_lower)?;
    let main = num(&caps, 1)?;
    Some(ChapterIdentity::new(main, SubType::None, 0))
}

fn match_title_prefix(link: &LinkText<'_>) -> Option<ChapterIdentity> {
    let caps = re_title_prefix().captures(link.title)?;
    decimal_identity(caps.get(1)?.as_str())
}

fn match_title_phrase(link: &LinkText<'_>) -> Option<ChapterIdentity> {
    let caps = re_title_phrase().captures(link.title)?;
    let main = num(&caps, 1)?;
    let sub = num(&caps, 3).unwrap_or(0);
    let sub_type = match caps.get(2).map(|m| m.as_str()) {
        Some(".") => SubType::Decimal,
        Some("-") => SubType::Dash,
        _ => SubType::None,
    };
    Some(ChapterIdentity::new(main, sub_type, sub))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(href: &str, title: &str) -> Option<ChapterIdentity> {
        parse_chapter_label(href, title)
    }

    #[test]
    fn rejects_links_without_chapter_keywords() {
        for (href, title) in [
            ("/about", "About us"),
            ("https://example.com/news/2024", "Latest news"),
            ("", ""),
            ("/genre/12", "Fantasy"),
        ] {
            assert!(parse(href, title).is_none(), "{href} / {title}");
        }
    }

    #[test]
    fn rejects_known_non_chapter_paths() {
        assert!(parse("/u/12345-reader", "Chapter 3 fan").is_none());
        assert!(parse("/batolists/77", "ch list").is_none());
        assert!(parse("/title/123-some-series", "chapter listing").is_none());
    }

    #[test]
    fn chapter_dash_with_sub_number() {
        let id = parse("https://example.com/manga/chapter-12-3", "").unwrap();
        assert_eq!(id.main_number, 12);
        assert_eq!(id.sub_type, SubType::Dash);
        assert_eq!(id.sub_number, 3);
        assert_eq!(id.label, "12-3");
    }

    #[test]
    fn chapter_dash_without_sub_number() {
        let id = parse("/series/chapter_007/", "").unwrap();
        assert_eq!(id.main_number, 7);
        assert_eq!(id.sub_type, SubType::None);
        assert_eq!(id.label, "7");
    }

    #[test]
    fn volume_becomes_sub_order_key() {
        let id = parse("https://example.com/title/9/vol-2/ch-5", "").unwrap();
        assert_eq!(id.main_number, 5);
        assert_eq!(id.sub_type, SubType::Decimal);
        assert_eq!(id.sub_number, 2);
        assert_eq!(id.label, "2.5");
    }

    #[test]
    fn short_chapter_with_fraction() {
        let id = parse("/read/ch_10.5", "").unwrap();
        assert_eq!(id.main_number, 10);
        assert_eq!(id.sub_type, SubType::Decimal);
        assert_eq!(id.sub_number, 5);
        assert_eq!(id.label, "10.5");
    }

    #[test]
    fn plain_segment_requires_no_volume_keyword() {
        let id = parse("/chronicle/42/", "").unwrap();
        assert_eq!(id.label, "42");
        // 含 vol 时跳过纯数字段，交给标题匹配
        let id = parse("/volumes/3/", "Chapter 8").unwrap();
        assert_eq!(id.label, "8");
    }

    #[test]
    fn numbered_title_prefix() {
        let id = parse("", "5. Title").unwrap();
        assert_eq!(id.main_number, 5);
        assert_eq!(id.sub_type, SubType::None);
        assert_eq!(id.label, "5");
    }

    #[test]
    fn title_phrase_with_separator() {
        let id = parse("#", "Vol.1 Chapter 14.2: Return").unwrap();
        assert_eq!(id.label, "14.2");
        let id = parse("#", "ch 3 - 1").unwrap();
        assert_eq!(id.sub_type, SubType::Dash);
        assert_eq!(id.label, "3-1");
    }

    #[test]
    fn href_matchers_take_priority_over_title() {
        let id = parse("/manga/chapter-20", "Chapter 99").unwrap();
        assert_eq!(id.label, "20");
    }

    #[test]
    fn keyword_without_number_is_rejected() {
        assert!(parse("/characters", "Characters").is_none());
    }
}
