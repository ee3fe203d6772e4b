//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息，以及命令行覆盖合并。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::YamlConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    // 输出配置
    #[serde(default = "default_output")]
    pub output: String,
    #[serde(default = "default_false")]
    pub keep_folders: bool,
    #[serde(default = "default_false")]
    pub debug: bool,

    // 并发配置
    #[serde(default = "default_image_workers")]
    pub image_workers: usize,
    #[serde(default = "default_chapter_workers")]
    pub chapter_workers: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    // 解析配置
    #[serde(default = "default_allow_ext")]
    pub allow_ext: Vec<String>,
    #[serde(default = "default_false")]
    pub check_js: bool,
    #[serde(default = "default_false")]
    pub skip_broken: bool,

    // 章节选择默认值
    #[serde(default)]
    pub default_url: String,
    #[serde(default)]
    pub default_range: String,
    #[serde(default)]
    pub default_exclude_range: String,
    #[serde(default)]
    pub default_list: String,
    #[serde(default)]
    pub default_exclude_list: String,

    // 请求头 / 身份
    #[serde(default)]
    pub cookie: String,
    #[serde(default)]
    pub cookie_file: String,
    #[serde(default)]
    pub user_agent: String,

    // 反爬挑战页回退
    #[serde(default = "default_false")]
    pub with_cf: bool,
    #[serde(default = "default_headless_command")]
    pub headless_command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: default_output(),
            keep_folders: default_false(),
            debug: default_false(),
            image_workers: default_image_workers(),
            chapter_workers: default_chapter_workers(),
            request_timeout: default_request_timeout(),
            allow_ext: default_allow_ext(),
            check_js: default_false(),
            skip_broken: default_false(),
            default_url: String::new(),
            default_range: String::new(),
            default_exclude_range: String::new(),
            default_list: String::new(),
            default_exclude_list: String::new(),
            cookie: String::new(),
            cookie_file: String::new(),
            user_agent: String::new(),
            with_cf: default_false(),
            headless_command: default_headless_command(),
        }
    }
}

impl YamlConfig for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn field_docs() -> &'static [(&'static str, &'static str)] {
        &[
            ("output", "CBZ 输出目录"),
            ("keep_folders", "打包后是否保留章节临时目录"),
            ("debug", "是否输出调试日志"),
            ("image_workers", "每章并行下载的图片数"),
            ("chapter_workers", "并行下载的章节数"),
            ("request_timeout", "页面请求超时时间（秒）"),
            ("allow_ext", "允许的图片扩展名"),
            ("check_js", "是否分析内联脚本并探测动态接口"),
            ("skip_broken", "图片下载失败时跳过该图片而不是放弃整章"),
            ("default_url", "默认漫画目录页地址"),
            ("default_range", "默认章节范围（按序号，例如 5-12）"),
            ("default_exclude_range", "默认排除的章节范围"),
            ("default_list", "默认章节序号列表（例如 1,3,5）"),
            ("default_exclude_list", "默认排除的章节序号列表"),
            ("cookie", "Cookie 字符串，例如 key=value; other=123"),
            ("cookie_file", "Cookie 文件路径（取第一行非空内容）"),
            ("user_agent", "自定义 User-Agent（留空使用内置值）"),
            ("with_cf", "遇到反爬挑战页时是否调用外部无头浏览器抓取"),
            ("headless_command", "无头浏览器抓取命令，目标地址会作为最后一个参数追加"),
        ]
    }
}

/// 命令行传入的覆盖项；`None`/`false` 表示沿用配置文件。
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub output: Option<String>,
    pub image_workers: Option<usize>,
    pub chapter_workers: Option<usize>,
    pub keep_folders: bool,
    pub debug: bool,
    pub url: Option<String>,
    pub range: Option<String>,
    pub exclude_range: Option<String>,
    pub list: Option<String>,
    pub exclude_list: Option<String>,
    pub allow_ext: Option<String>,
    pub check_js: bool,
    pub with_cf: bool,
    pub skip_broken: bool,
    pub cookie: Option<String>,
    pub cookie_file: Option<String>,
    pub user_agent: Option<String>,
}

impl Config {
    pub fn apply_overrides(&mut self, o: &Overrides) {
        fn set(dest: &mut String, src: &Option<String>) {
            if let Some(v) = src.as_deref().filter(|v| !v.is_empty()) {
                *dest = v.to_string();
            }
        }

        set(&mut self.output, &o.output);
        set(&mut self.default_url, &o.url);
        set(&mut self.default_range, &o.range);
        set(&mut self.default_exclude_range, &o.exclude_range);
        set(&mut self.default_list, &o.list);
        set(&mut self.default_exclude_list, &o.exclude_list);
        set(&mut self.cookie, &o.cookie);
        set(&mut self.cookie_file, &o.cookie_file);
        set(&mut self.user_agent, &o.user_agent);

        if let Some(n) = o.image_workers {
            self.image_workers = n;
        }
        if let Some(n) = o.chapter_workers {
            self.chapter_workers = n;
        }
        if let Some(exts) = o.allow_ext.as_deref().filter(|s| !s.trim().is_empty()) {
            self.allow_ext = split_ext_list(exts);
        }

        self.keep_folders |= o.keep_folders;
        self.debug |= o.debug;
        self.check_js |= o.check_js;
        self.with_cf |= o.with_cf;
        self.skip_broken |= o.skip_broken;

        self.normalize();
    }

    /// 0 值回落到默认值，扩展名统一为小写且不带点。
    pub fn normalize(&mut self) {
        if self.output.trim().is_empty() {
            self.output = default_output();
        }
        if self.image_workers == 0 {
            self.image_workers = default_image_workers();
        }
        if self.chapter_workers == 0 {
            self.chapter_workers = default_chapter_workers();
        }
        if self.request_timeout == 0 {
            self.request_timeout = default_request_timeout();
        }
        self.allow_ext = normalize_ext_list(&self.allow_ext);
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }

    /// 打印生效配置（仅输出非默认/有意义的字段）。
    pub fn summary_lines(&self) -> Vec<String> {
        let mut out = vec![
            format!(" -output: {}", self.output),
            format!(" -image_workers: {}", self.image_workers),
            format!(" -chapter_workers: {}", self.chapter_workers),
        ];
        let optional = [
            ("url", self.default_url.as_str()),
            ("range", self.default_range.as_str()),
            ("exclude_range", self.default_exclude_range.as_str()),
            ("list", self.default_list.as_str()),
            ("exclude_list", self.default_exclude_list.as_str()),
            ("cookie_file", self.cookie_file.as_str()),
        ];
        for (name, val) in optional {
            if !val.is_empty() {
                out.push(format!(" -{name}: {val}"));
            }
        }
        for (name, on) in [
            ("keep_folders", self.keep_folders),
            ("debug", self.debug),
            ("skip_broken", self.skip_broken),
            ("check_js", self.check_js),
            ("with_cf", self.with_cf),
        ] {
            if on {
                out.push(format!(" -{name}: true"));
            }
        }
        if !self.allow_ext.is_empty() {
            out.push(format!(" -allow_ext: {}", self.allow_ext.join(", ")));
        }
        out
    }
}

pub fn split_ext_list(s: &str) -> Vec<String> {
    let parts: Vec<String> = s
        .split(['|', ',', ' '])
        .map(|p| p.to_string())
        .collect();
    normalize_ext_list(&parts)
}

pub fn normalize_ext_list(list: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for ext in list {
        let ext = ext.trim().to_ascii_lowercase();
        let ext = ext.trim_start_matches('.');
        if !ext.is_empty() && !out.iter().any(|e| e == ext) {
            out.push(ext.to_string());
        }
    }
    out
}

fn default_false() -> bool {
    false
}

fn default_output() -> String {
    ".".to_string()
}

fn default_image_workers() -> usize {
    5
}

fn default_chapter_workers() -> usize {
    2
}

fn default_request_timeout() -> u64 {
    30
}

fn default_allow_ext() -> Vec<String> {
    ["jpg", "jpeg", "png", "webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_headless_command() -> Vec<String> {
    vec!["python3".to_string(), "selenium_fetch.py".to_string()]
}
