use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::Method;
use reqwest::blocking::{Client, Response};
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, COOKIE, HeaderMap, HeaderValue, REFERER, USER_AGENT,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::renderer::PageRenderer;
use crate::base_system::context::Config;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

const PAGE_ATTEMPTS: u32 = 3;
const PAGE_BACKOFF: Duration = Duration::from_millis(500);

const CHALLENGE_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "challenge-platform",
    "cf_chl_opt",
    "<title>Just a moment...</title>",
    "Attention Required!",
];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("unexpected MIME type {0:?}")]
    Mime(String),
    #[error("blocked by anti-bot challenge: {0}")]
    ChallengeBlocked(String),
    #[error("headless render failed: {0}")]
    Render(String),
    #[error("invalid header value: {0}")]
    Header(String),
}

impl FetchError {
    /// 挑战页、渲染失败与非法请求头重试也不会变化。
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            FetchError::ChallengeBlocked(_) | FetchError::Render(_) | FetchError::Header(_)
        )
    }
}

/// 按状态码与页面特征识别反爬挑战页。
pub fn is_challenge(status: u16, body: &str) -> bool {
    status == 403 || CHALLENGE_MARKERS.iter().any(|m| body.contains(m))
}

#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout: Duration,
    pub user_agent: String,
    pub cookie: String,
    pub cookie_file: String,
}

impl HttpOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            timeout: cfg.request_timeout(),
            user_agent: cfg.user_agent.clone(),
            cookie: cfg.cookie.clone(),
            cookie_file: cfg.cookie_file.clone(),
        }
    }
}

/// 合并内联 Cookie 与 cookie 文件首行，以 `"; "` 连接。
pub fn merge_cookie(inline: &str, cookie_file: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    let inline = inline.trim();
    if !inline.is_empty() {
        parts.push(inline.to_string());
    }
    let file = cookie_file.trim();
    if !file.is_empty() {
        match fs::read_to_string(Path::new(file)) {
            Ok(raw) => {
                if let Some(line) = raw.lines().next().map(str::trim)
                    && !line.is_empty()
                {
                    parts.push(line.to_string());
                }
            }
            Err(e) => warn!(target: "network", "读取 cookie 文件 {} 失败: {}", file, e),
        }
    }
    parts.join("; ")
}

pub struct Page {
    pub url: String,
    pub status: u16,
    pub body: String,
}

pub struct HttpClient {
    client: Client,
    renderer: Box<dyn PageRenderer>,
}

impl HttpClient {
    pub fn new(options: &HttpOptions, renderer: Box<dyn PageRenderer>) -> Result<Self, FetchError> {
        let user_agent = if options.user_agent.trim().is_empty() {
            DEFAULT_USER_AGENT
        } else {
            options.user_agent.trim()
        };

        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent).map_err(|e| FetchError::Header(e.to_string()))?,
        );
        let cookie = merge_cookie(&options.cookie, &options.cookie_file);
        if !cookie.is_empty() {
            default_headers.insert(
                COOKIE,
                HeaderValue::from_str(&cookie).map_err(|e| FetchError::Header(e.to_string()))?,
            );
            debug!(target: "network", "已配置 Cookie（{} 字节）", cookie.len());
        }

        let client = Client::builder()
            .default_headers(default_headers)
            .cookie_store(true)
            .timeout(options.timeout)
            .build()?;

        Ok(Self { client, renderer })
    }

    /// 获取页面 HTML：最多 3 次尝试，5xx 与传输错误重试；挑战页（任意状态码）交给渲染器。
    pub fn fetch_page(&self, url: &str) -> Result<Page, FetchError> {
        let mut last_err: Option<FetchError> = None;

        for attempt in 1..=PAGE_ATTEMPTS {
            debug!(target: "network", attempt, "GET {}", url);
            match self.page_once(url) {
                Ok(page) => return Ok(page),
                Err(e @ FetchError::Status(status)) if status < 500 => return Err(e),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(target: "network", "第 {} 次请求 {} 失败: {}", attempt, url, e);
                    last_err = Some(e);
                }
            }
            if attempt < PAGE_ATTEMPTS {
                thread::sleep(PAGE_BACKOFF * attempt);
            }
        }

        Err(last_err.unwrap_or(FetchError::Status(0)))
    }

    fn page_once(&self, url: &str) -> Result<Page, FetchError> {
        let resp = self
            .client
            .get(url)
            .header(ACCEPT, "text/html,*/*;q=0.8")
            .send()?;
        let status = resp.status().as_u16();
        let body = resp.text()?;

        if is_challenge(status, &body) {
            debug!(target: "network", "{} 返回挑战页（{}）", url, status);
            let html = self.renderer.render(url)?;
            return Ok(Page {
                url: url.to_string(),
                status: 200,
                body: html,
            });
        }
        if !(200..300).contains(&status) {
            return Err(FetchError::Status(status));
        }
        Ok(Page {
            url: url.to_string(),
            status,
            body,
        })
    }

    /// 单次图片请求（不重试，调用方负责）。
    pub fn get_image(
        &self,
        url: &str,
        referer: &str,
        timeout: Duration,
    ) -> Result<Response, FetchError> {
        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .header(REFERER, referer)
            .header(ACCEPT, "image/avif,image/webp,image/apng,image/*,*/*;q=0.8")
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(CACHE_CONTROL, "no-cache")
            .send()?;
        Ok(resp)
    }

    /// 以 XHR 方式请求接口，返回可解析的 JSON；先 POST 后 GET。
    pub fn probe_json(&self, url: &str) -> Option<Value> {
        for method in [Method::POST, Method::GET] {
            let resp = self
                .client
                .request(method.clone(), url)
                .header("X-Requested-With", "XMLHttpRequest")
                .header(ACCEPT, "application/json, text/plain, */*")
                .send();
            let body = match resp.and_then(|r| r.error_for_status()).and_then(|r| r.text()) {
                Ok(b) => b,
                Err(e) => {
                    debug!(target: "network", "{} {} 失败: {}", method, url, e);
                    continue;
                }
            };
            match serde_json::from_str::<Value>(&body) {
                Ok(v) => return Some(v),
                Err(_) => debug!(target: "network", "{} {} 返回非 JSON", method, url),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network_parser::renderer::DisabledRenderer;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn challenge_detection() {
        assert!(is_challenge(403, ""));
        assert!(is_challenge(200, "<html><title>Just a moment...</title></html>"));
        assert!(is_challenge(503, "window._cf_chl_opt={}"));
        assert!(!is_challenge(200, "<html><img src=a.jpg></html>"));
        assert!(!is_challenge(404, "not found"));
    }

    #[test]
    fn cookie_merges_inline_and_file_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookie.txt");
        fs::write(&path, "  session=abc  \nignored=1\n").unwrap();
        let merged = merge_cookie("a=1", path.to_str().unwrap());
        assert_eq!(merged, "a=1; session=abc");
        assert_eq!(merge_cookie("", path.to_str().unwrap()), "session=abc");
        assert_eq!(merge_cookie(" b=2 ", ""), "b=2");
        assert_eq!(merge_cookie("", dir.path().join("missing").to_str().unwrap()), "");
    }

    #[test]
    fn challenge_is_not_retried() {
        assert!(!FetchError::ChallengeBlocked("u".into()).is_retryable());
        assert!(!FetchError::Render("exit 1".into()).is_retryable());
        assert!(FetchError::Status(502).is_retryable());
        assert!(FetchError::Mime("text/html".into()).is_retryable());
    }

    /// 本地 HTTP 服务：按顺序对每个连接回一条响应，返回地址与已处理请求数。
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let mut req = Vec::new();
                let mut buf = [0u8; 1024];
                while !req.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => req.extend_from_slice(&buf[..n]),
                    }
                }
                counter.fetch_add(1, Ordering::SeqCst);
                let reply = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(reply.as_bytes());
            }
        });
        (format!("http://{addr}/series/1"), hits)
    }

    struct CountingRenderer(Arc<AtomicUsize>);

    impl PageRenderer for CountingRenderer {
        fn render(&self, _url: &str) -> Result<String, FetchError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok("<html>rendered</html>".to_string())
        }
    }

    fn options() -> HttpOptions {
        HttpOptions {
            timeout: Duration::from_secs(5),
            user_agent: String::new(),
            cookie: String::new(),
            cookie_file: String::new(),
        }
    }

    const CF_PAGE: &str = "<html><title>Just a moment...</title></html>";

    #[test]
    fn challenge_behind_503_goes_to_renderer() {
        let (url, hits) = serve(vec![(503, CF_PAGE)]);
        let renders = Arc::new(AtomicUsize::new(0));
        let client =
            HttpClient::new(&options(), Box::new(CountingRenderer(Arc::clone(&renders)))).unwrap();
        let page = client.fetch_page(&url).unwrap();
        assert_eq!(page.body, "<html>rendered</html>");
        assert_eq!(renders.load(Ordering::SeqCst), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn challenge_without_renderer_fails_immediately() {
        let (url, hits) = serve(vec![(503, CF_PAGE), (503, CF_PAGE), (503, CF_PAGE)]);
        let client = HttpClient::new(&options(), Box::new(DisabledRenderer)).unwrap();
        let err = client.fetch_page(&url).err().unwrap();
        assert!(matches!(err, FetchError::ChallengeBlocked(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn client_errors_end_without_retry() {
        let (url, hits) = serve(vec![(404, "gone"), (200, "late")]);
        let client = HttpClient::new(&options(), Box::new(DisabledRenderer)).unwrap();
        let err = client.fetch_page(&url).err().unwrap();
        assert!(matches!(err, FetchError::Status(404)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn server_errors_are_retried() {
        let (url, hits) = serve(vec![(502, "bad gateway"), (200, "<html>ok</html>")]);
        let client = HttpClient::new(&options(), Box::new(DisabledRenderer)).unwrap();
        let page = client.fetch_page(&url).unwrap();
        assert_eq!(page.body, "<html>ok</html>");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
