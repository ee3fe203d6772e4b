//! 通用站点抓取：目录页 → 章节列表，章节页 → 有序图片地址。

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};
use url::Url;

use super::collector::collect_candidates;
use super::html_utils::ExtensionFilter;
use super::js_probe::EndpointProbe;
use super::selector::select_images;
use crate::chapters::Chapter;
use crate::chapters::lister::extract_chapters;
use crate::download::chapter_pool::ImageResolver;
use crate::network_parser::network::HttpClient;

pub struct GenericScraper<'a> {
    http: &'a HttpClient,
    filter: ExtensionFilter,
    check_js: bool,
}

impl<'a> GenericScraper<'a> {
    pub fn new(http: &'a HttpClient, allow_ext: &[String], check_js: bool) -> Self {
        Self {
            http,
            filter: ExtensionFilter::new(allow_ext),
            check_js,
        }
    }

    pub fn list_chapters(&self, series_url: &str) -> Result<Vec<Chapter>> {
        let base = Url::parse(series_url).with_context(|| format!("无效的地址: {series_url}"))?;
        let page = self
            .http
            .fetch_page(series_url)
            .with_context(|| format!("获取目录页失败: {series_url}"))?;
        let chapters = extract_chapters(&base, &page.body);
        info!(target: "scraper", "目录页解析出 {} 个章节", chapters.len());
        Ok(chapters)
    }

    pub fn image_urls(&self, chapter_url: &str) -> Result<Vec<String>> {
        let base =
            Url::parse(chapter_url).with_context(|| format!("无效的章节地址: {chapter_url}"))?;
        let page = self
            .http
            .fetch_page(chapter_url)
            .with_context(|| format!("获取章节页失败: {chapter_url}"))?;

        let probe: Option<&dyn EndpointProbe> = if self.check_js {
            Some(self.http)
        } else {
            None
        };
        let candidates = collect_candidates(&base, &page.body, &self.filter, probe);
        let images = select_images(&candidates);
        debug!(
            target: "scraper",
            candidates = candidates.len(),
            selected = images.len(),
            "{}",
            chapter_url
        );
        if images.is_empty() {
            return Err(anyhow!("页面中没有找到图片: {chapter_url}"));
        }
        Ok(images)
    }
}

impl ImageResolver for GenericScraper<'_> {
    fn resolve_images(&self, chapter: &Chapter) -> Result<Vec<String>> {
        self.image_urls(&chapter.url)
    }
}
