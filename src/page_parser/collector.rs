//! 章节页图片候选收集。
//!
//! 依次运行多种发现策略，每次发现都记录下来（不做精确去重），
//! 以便后出现的重复项仍能贡献位置提示；归并交给 `selector`。

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::html_utils::{
    ExtensionFilter, background_urls, is_non_content, looks_like_html, srcset_urls,
};
use super::js_probe::{EndpointProbe, ScriptHints};

const MAX_JSON_DEPTH: usize = 64;
const IMG_SRC_ATTRS: &[&str] = &["src", "data-src", "data-lazy-src", "data-original"];

fn re_nuxt_state() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?s)window\.__NUXT__\s*=\s*(\{.*?\});").unwrap())
}

fn re_loose_url() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r#"https?://[^\s"'<>]+"#).unwrap())
}

fn selector(css: &'static str, slot: &'static OnceLock<Selector>) -> &'static Selector {
    slot.get_or_init(|| Selector::parse(css).unwrap())
}

fn sel_img() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    selector("img", &S)
}

fn sel_source() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    selector("source[srcset]", &S)
}

fn sel_anchor() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    selector("a[href]", &S)
}

fn sel_styled() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    selector("[style]", &S)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    pub url: String,
    /// 页面给出的显式位置（`data-index`）
    pub position_hint: Option<u32>,
    /// 全局发现序号，严格递增
    pub discovery_order: u64,
}

pub struct ImageCollector<'a> {
    base: &'a Url,
    filter: &'a ExtensionFilter,
    items: Vec<ImageCandidate>,
    next_order: u64,
}

impl<'a> ImageCollector<'a> {
    pub fn new(base: &'a Url, filter: &'a ExtensionFilter) -> Self {
        Self {
            base,
            filter,
            items: Vec::new(),
            next_order: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_candidates(self) -> Vec<ImageCandidate> {
        self.items
    }

    /// 解析为绝对地址并过滤；被接受时记录一条候选。
    fn add(&mut self, raw: &str, hint: Option<u32>) -> bool {
        let raw = raw.trim();
        let lower = raw.to_lowercase();
        if raw.is_empty() || lower.starts_with("data:") || lower.starts_with("javascript:") {
            return false;
        }
        let Ok(abs) = self.base.join(raw) else {
            return false;
        };
        if !matches!(abs.scheme(), "http" | "https") {
            return false;
        }
        let url = abs.to_string();
        if !self.filter.matches(&url) || is_non_content(&url) {
            return false;
        }
        self.next_order += 1;
        self.items.push(ImageCandidate {
            url,
            position_hint: hint,
            discovery_order: self.next_order,
        });
        true
    }

    /// `<img>`：srcset 各项与常见懒加载属性，`data-index` 取自元素或最近的祖先。
    pub fn scan_img_tags(&mut self, doc: &Html) {
        for img in doc.select(sel_img()) {
            let hint = position_hint(&img);
            let el = img.value();
            if let Some(srcset) = el.attr("srcset") {
                for u in srcset_urls(srcset) {
                    self.add(u, hint);
                }
            }
            for attr in IMG_SRC_ATTRS {
                if let Some(v) = el.attr(attr) {
                    self.add(v, hint);
                }
            }
        }
    }

    pub fn scan_picture_sources(&mut self, doc: &Html) {
        for source in doc.select(sel_source()) {
            let hint = position_hint(&source);
            if let Some(srcset) = source.value().attr("srcset") {
                for u in srcset_urls(srcset) {
                    self.add(u, hint);
                }
            }
        }
    }

    /// 直接指向图片文件的链接。
    pub fn scan_anchors(&mut self, doc: &Html) {
        for a in doc.select(sel_anchor()) {
            let Some(href) = a.value().attr("href") else {
                continue;
            };
            let h = href.trim();
            if h.starts_with('#') || h.contains("://") && !h.starts_with("http") {
                continue;
            }
            self.add(h, position_hint(&a));
        }
    }

    pub fn scan_backgrounds(&mut self, doc: &Html) {
        for el in doc.select(sel_styled()) {
            let Some(style) = el.value().attr("style") else {
                continue;
            };
            let hint = position_hint(&el);
            for u in background_urls(style) {
                self.add(u, hint);
            }
        }
    }

    pub fn scan_dom(&mut self, doc: &Html) {
        self.scan_img_tags(doc);
        self.scan_picture_sources(doc);
        self.scan_anchors(doc);
        self.scan_backgrounds(doc);
    }

    /// 嵌入的 HTML 片段按完整 DOM 策略扫描。
    pub fn scan_fragment(&mut self, markup: &str) {
        let frag = Html::parse_fragment(markup);
        self.scan_dom(&frag);
    }

    /// 遍历 JSON：绝对图片地址直接收录，HTML 片段递归扫描。
    pub fn scan_json(&mut self, value: &Value) {
        self.walk_json(value, 0);
    }

    fn walk_json(&mut self, value: &Value, depth: usize) {
        if depth > MAX_JSON_DEPTH {
            return;
        }
        match value {
            Value::String(s) => {
                let t = s.trim();
                let lower = t.to_lowercase();
                if lower.starts_with("http://") || lower.starts_with("https://") {
                    self.add(t, None);
                } else if looks_like_html(t) {
                    self.scan_fragment(t);
                }
            }
            Value::Array(items) => {
                for v in items {
                    self.walk_json(v, depth + 1);
                }
            }
            Value::Object(map) => {
                for v in map.values() {
                    self.walk_json(v, depth + 1);
                }
            }
            _ => {}
        }
    }

    /// `window.__NUXT__ = {...};` 形式的前端状态。
    pub fn scan_embedded_state(&mut self, raw_body: &str) -> bool {
        let Some(caps) = re_nuxt_state().captures(raw_body) else {
            return false;
        };
        match serde_json::from_str::<Value>(&caps[1]) {
            Ok(state) => {
                self.scan_json(&state);
                true
            }
            Err(e) => {
                debug!(target: "collector", "嵌入状态不是合法 JSON: {}", e);
                false
            }
        }
    }

    pub fn scan_script_endpoints(&mut self, doc: &Html, probe: &dyn EndpointProbe) {
        let endpoints = ScriptHints::from_document(doc).endpoints();
        for ep in endpoints {
            let Ok(full) = self.base.join(&ep) else {
                continue;
            };
            debug!(target: "collector", "探测脚本接口 {}", full);
            if let Some(v) = probe.probe_json(full.as_str()) {
                self.scan_json(&v);
            }
        }
    }

    /// 兜底：原始响应中任意绝对地址。
    pub fn scan_loose_urls(&mut self, raw_body: &str) {
        let found: Vec<&str> = re_loose_url()
            .find_iter(raw_body)
            .map(|m| m.as_str())
            .collect();
        for u in found {
            self.add(u, None);
        }
    }
}

/// 元素或其最近祖先上的 `data-index`，非数字视为无提示。
fn position_hint(el: &ElementRef<'_>) -> Option<u32> {
    if let Some(v) = el.value().attr("data-index") {
        return v.trim().parse().ok();
    }
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find_map(|a| a.value().attr("data-index"))
        .and_then(|v| v.trim().parse().ok())
}

/// 对一个章节页运行全部发现策略。
pub fn collect_candidates(
    chapter_url: &Url,
    raw_body: &str,
    filter: &ExtensionFilter,
    probe: Option<&dyn EndpointProbe>,
) -> Vec<ImageCandidate> {
    let doc = Html::parse_document(raw_body);
    let mut c = ImageCollector::new(chapter_url, filter);

    c.scan_dom(&doc);
    let dom_count = c.len();
    c.scan_embedded_state(raw_body);
    if let Some(probe) = probe {
        c.scan_script_endpoints(&doc, probe);
    }
    c.scan_loose_urls(raw_body);

    debug!(
        target: "collector",
        dom = dom_count,
        total = c.len(),
        "收集到图片候选 {}",
        chapter_url
    );
    c.into_candidates()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn base() -> Url {
        Url::parse("https://example.com/manga/hero/chapter-1/").unwrap()
    }

    fn filter() -> ExtensionFilter {
        ExtensionFilter::new(&["jpg".into(), "jpeg".into(), "png".into(), "webp".into()])
    }

    fn urls(c: &[ImageCandidate]) -> Vec<&str> {
        c.iter().map(|c| c.url.as_str()).collect()
    }

    #[test]
    fn img_attributes_and_ancestor_index() {
        let html = r#"
            <div data-index="2"><span><img data-src="p/003.jpg"></span></div>
            <img src="p/001.jpg" data-index="0">
            <img src="data:image/png;base64,AAA=" data-lazy-src="/abs/002.png">
            <img src="/static/site-logo.png">
            <img src="p/anim.gif">
        "#;
        let doc = Html::parse_document(html);
        let f = filter();
        let b = base();
        let mut c = ImageCollector::new(&b, &f);
        c.scan_img_tags(&doc);
        let items = c.into_candidates();
        assert_eq!(
            urls(&items),
            vec![
                "https://example.com/manga/hero/chapter-1/p/003.jpg",
                "https://example.com/manga/hero/chapter-1/p/001.jpg",
                "https://example.com/abs/002.png",
            ]
        );
        assert_eq!(items[0].position_hint, Some(2));
        assert_eq!(items[1].position_hint, Some(0));
        assert_eq!(items[2].position_hint, None);
        assert!(items.windows(2).all(|w| w[0].discovery_order < w[1].discovery_order));
    }

    #[test]
    fn srcset_sources_anchors_and_backgrounds() {
        let html = r#"
            <picture><source srcset="a-300x400.webp 1x, a.webp 2x"></picture>
            <a href="./full/010.jpg">open</a>
            <a href="/chapter-2">next</a>
            <div style="background-image:url('bg/020.jpg')"></div>
            <span style="mask-image:url('m/mask.png'); border-image: url(b/frame.jpg)"></span>
        "#;
        let doc = Html::parse_document(html);
        let f = filter();
        let b = base();
        let mut c = ImageCollector::new(&b, &f);
        c.scan_dom(&doc);
        let items = c.into_candidates();
        assert_eq!(
            urls(&items),
            vec![
                "https://example.com/manga/hero/chapter-1/a-300x400.webp",
                "https://example.com/manga/hero/chapter-1/a.webp",
                "https://example.com/manga/hero/chapter-1/full/010.jpg",
                "https://example.com/manga/hero/chapter-1/bg/020.jpg",
            ]
        );
    }

    #[test]
    fn duplicates_are_kept_for_later_hints() {
        let html = r#"<img src="p/1.jpg"><div data-index="4"><img src="p/1.jpg"></div>"#;
        let items = collect_candidates(&base(), html, &filter(), None);
        let hits: Vec<_> = items
            .iter()
            .filter(|c| c.url.ends_with("/p/1.jpg"))
            .collect();
        assert!(hits.len() >= 2);
        assert!(hits.iter().any(|c| c.position_hint == Some(4)));
    }

    #[test]
    fn nuxt_state_urls_and_fragments() {
        let body = r#"<html><body><script>
            window.__NUXT__ = {"data":[{"pages":["https://cdn.example.com/c1/01.jpg",
              "not a url", 7, {"html":"<div><img src=\"https://cdn.example.com/c1/02.png\"></div>"}]}]};
        </script></body></html>"#;
        let f = filter();
        let b = base();
        let mut c = ImageCollector::new(&b, &f);
        assert!(c.scan_embedded_state(body));
        assert_eq!(
            urls(&c.into_candidates()),
            vec!["https://cdn.example.com/c1/01.jpg", "https://cdn.example.com/c1/02.png"]
        );
    }

    #[test]
    fn json_walk_stops_at_depth_limit() {
        let mut v = Value::String("https://cdn.example.com/deep/1.jpg".into());
        for _ in 0..(MAX_JSON_DEPTH + 5) {
            v = Value::Array(vec![v]);
        }
        let f = filter();
        let b = base();
        let mut c = ImageCollector::new(&b, &f);
        c.scan_json(&v);
        assert!(c.is_empty());
    }

    struct FakeProbe {
        seen: Mutex<Vec<String>>,
    }

    impl EndpointProbe for FakeProbe {
        fn probe_json(&self, url: &str) -> Option<Value> {
            self.seen.lock().unwrap().push(url.to_string());
            if url.ends_with("/api/chapter/77") {
                Some(serde_json::json!({"images": ["https://img.example.com/77/01.webp"]}))
            } else {
                None
            }
        }
    }

    #[test]
    fn script_endpoints_are_probed_when_enabled() {
        let body = r#"<html><head><script>
            var chapterId = "77";
            var base = "/api/chapter/";
        </script></head><body></body></html>"#;
        let probe = FakeProbe {
            seen: Mutex::new(Vec::new()),
        };
        let items = collect_candidates(&base(), body, &filter(), Some(&probe));
        assert_eq!(urls(&items), vec!["https://img.example.com/77/01.webp"]);
        assert_eq!(
            probe.seen.lock().unwrap().as_slice(),
            ["https://example.com/api/chapter/77".to_string()]
        );

        let without = collect_candidates(&base(), body, &filter(), None);
        assert!(without.is_empty());
    }

    #[test]
    fn loose_urls_fall_through_filters() {
        let body = r#"var pages = 'https://cdn.example.com/x/5.jpeg https://cdn.example.com/x/avatar.jpg https://cdn.example.com/x/readme.txt';"#;
        let f = filter();
        let b = base();
        let mut c = ImageCollector::new(&b, &f);
        c.scan_loose_urls(body);
        assert_eq!(urls(&c.into_candidates()), vec!["https://cdn.example.com/x/5.jpeg"]);
    }
}
