//! 内联脚本分析：推测可能返回图片列表的接口地址。

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use crate::network_parser::network::HttpClient;

fn re_var_assign() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| {
        Regex::new(r#"(?m)(?:var|let|const)\s+([A-Za-z0-9_]+)\s*=\s*["']?([\w\-/\.]+)["']?;"#)
            .unwrap()
    })
}

fn re_path_literal() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r#"["'](/[A-Za-z0-9/\-\._]+)["']"#).unwrap())
}

fn re_call_literal() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r#"(?:fetch|axios|post|get)\s*\(\s*["']([^"']+)["']"#).unwrap())
}

fn inline_script_selector() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("script:not([src])").unwrap())
}

/// 按 XHR 方式请求一个接口，能解析为 JSON 时返回。
pub trait EndpointProbe: Send + Sync {
    fn probe_json(&self, url: &str) -> Option<Value>;
}

impl EndpointProbe for HttpClient {
    fn probe_json(&self, url: &str) -> Option<Value> {
        HttpClient::probe_json(self, url)
    }
}

/// 从脚本中收集到的线索，保持出现顺序。
#[derive(Debug, Default, Clone)]
pub struct ScriptHints {
    pub vars: Vec<(String, String)>,
    pub paths: Vec<String>,
    pub calls: Vec<String>,
}

impl ScriptHints {
    pub fn scan(&mut self, js: &str) {
        for c in re_var_assign().captures_iter(js) {
            self.vars.push((c[1].to_string(), c[2].to_string()));
        }
        for c in re_path_literal().captures_iter(js) {
            self.paths.push(c[1].to_string());
        }
        for c in re_call_literal().captures_iter(js) {
            self.calls.push(c[1].to_string());
        }
    }

    pub fn from_document(doc: &Html) -> Self {
        let mut hints = Self::default();
        for script in doc.select(inline_script_selector()) {
            let js: String = script.text().collect();
            hints.scan(&js);
        }
        hints
    }

    /// 候选接口：`/…chap…/` 形式的基础路径拼接名字含 `id` 的变量值，
    /// 再加上直接出现在 fetch/axios/post/get 调用里的地址；去重保序。
    pub fn endpoints(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut push = |s: String| {
            if seen.insert(s.clone()) {
                out.push(s);
            }
        };

        for base in &self.paths {
            if !(base.contains("chap") && base.ends_with('/')) {
                continue;
            }
            for (name, value) in &self.vars {
                if name.to_lowercase().contains("id") {
                    push(format!("{base}{value}"));
                }
            }
        }
        for call in &self.calls {
            push(call.clone());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"
        var chapterId = "8812";
        const mangaSlug = 'hero-story';
        let apiBase = "/api/chapter/";
        fetch("/ajax/images?c=8812").then(r => r.json());
    "#;

    #[test]
    fn endpoints_combine_bases_with_id_vars() {
        let mut hints = ScriptHints::default();
        hints.scan(SCRIPT);
        assert!(hints.vars.iter().any(|(k, v)| k == "chapterId" && v == "8812"));
        assert_eq!(
            hints.endpoints(),
            vec!["/api/chapter/8812".to_string(), "/ajax/images?c=8812".to_string()]
        );
    }

    #[test]
    fn reads_only_inline_scripts() {
        let doc = Html::parse_document(&format!(
            r#"<html><head><script src="/app.js">var ignoredId = "1";</script><script>{SCRIPT}</script></head></html>"#
        ));
        let hints = ScriptHints::from_document(&doc);
        assert!(!hints.vars.iter().any(|(k, _)| k == "ignoredId"));
        assert_eq!(hints.endpoints().len(), 2);
    }

    #[test]
    fn duplicate_endpoints_collapse() {
        let mut hints = ScriptHints::default();
        hints.scan(r#"fetch("/x/1"); axios("/x/1");"#);
        assert_eq!(hints.endpoints(), vec!["/x/1".to_string()]);
    }
}
