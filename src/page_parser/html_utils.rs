//! 图片地址的过滤与零散 HTML 工具。

use std::sync::OnceLock;

use regex::Regex;

fn re_background_url() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r#"url\((?:["']?)([^"')]+)(?:["']?)\)"#).unwrap())
}

/// 文件名含这些词的图片视为站点装饰，而非漫画页。
const NON_CONTENT_MARKERS: &[&str] = &["logo", "cover", "profile", "avatar", "banner"];

/// 允许的扩展名集合，编译成一个大小写不敏感的尾部匹配。
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    re: Option<Regex>,
}

impl ExtensionFilter {
    pub fn new(exts: &[String]) -> Self {
        let alts: Vec<String> = exts
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .map(|e| regex::escape(&e))
            .collect();
        if alts.is_empty() {
            return Self { re: None };
        }
        let re = Regex::new(&format!(r"(?i)\.({})$", alts.join("|"))).ok();
        Self { re }
    }

    /// 查询串与片段不参与判断。
    pub fn matches(&self, url: &str) -> bool {
        let Some(re) = &self.re else {
            return false;
        };
        re.is_match(strip_query(url))
    }
}

pub fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

fn file_name(url: &str) -> &str {
    let path = strip_query(url);
    path.rsplit('/').next().unwrap_or(path)
}

pub fn is_non_content(url: &str) -> bool {
    let name = file_name(url).to_lowercase();
    NON_CONTENT_MARKERS.iter().any(|m| name.contains(m))
}

/// `srcset` 中每个候选的地址部分（去掉宽度/密度描述符）。
pub fn srcset_urls(srcset: &str) -> Vec<&str> {
    srcset
        .split(',')
        .filter_map(|part| part.split_whitespace().next())
        .filter(|u| !u.is_empty())
        .collect()
}

/// 内联样式里 `background-image` / `background` 声明引用的地址；`mask`、`border-image` 等不算。
pub fn background_urls(style: &str) -> Vec<&str> {
    style
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .filter(|(prop, _)| {
            let prop = prop.trim().to_ascii_lowercase();
            prop == "background-image" || prop == "background"
        })
        .flat_map(|(_, value)| re_background_url().captures_iter(value))
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim()))
        .filter(|u| !u.is_empty())
        .collect()
}

/// 嵌入数据里的字符串是否像一段 HTML 片段。
pub fn looks_like_html(s: &str) -> bool {
    ["<img", "<a", "<div", "<picture", "<source"]
        .iter()
        .any(|tag| s.contains(tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> ExtensionFilter {
        ExtensionFilter::new(&["jpg".into(), ".PNG".into(), "webp".into()])
    }

    #[test]
    fn extension_filter_ignores_case_and_query() {
        let f = filter();
        assert!(f.matches("https://cdn.example.com/a/001.JPG"));
        assert!(f.matches("https://cdn.example.com/a/002.png?token=1"));
        assert!(!f.matches("https://cdn.example.com/a/003.gif"));
        assert!(!f.matches("https://cdn.example.com/a/jpg"));
        assert!(!ExtensionFilter::new(&[]).matches("a.jpg"));
    }

    #[test]
    fn non_content_checks_file_name_only() {
        assert!(is_non_content("https://x.com/img/site-logo.png"));
        assert!(is_non_content("https://x.com/u/AVATAR_12.jpg"));
        assert!(!is_non_content("https://x.com/covers-cdn/ch1/001.jpg"));
    }

    #[test]
    fn srcset_and_background_extraction() {
        assert_eq!(
            srcset_urls("a-300.jpg 300w, b-600.jpg 600w,  c.jpg"),
            vec!["a-300.jpg", "b-600.jpg", "c.jpg"]
        );
        assert_eq!(
            background_urls(r#"background-image: url("p/1.webp"); mask: url(m.png)"#),
            vec!["p/1.webp"]
        );
        assert_eq!(
            background_urls("color:red; BACKGROUND: #000 url('p/2.jpg') no-repeat"),
            vec!["p/2.jpg"]
        );
    }

    #[test]
    fn decorative_style_urls_are_ignored() {
        let style = "mask-image:url('m/mask.png'); border-image: url(b/frame.jpg)";
        assert!(background_urls(style).is_empty());
    }

    #[test]
    fn html_fragment_detection() {
        assert!(looks_like_html(r#"<div><img src="x.jpg"></div>"#));
        assert!(!looks_like_html("plain text"));
    }
}
