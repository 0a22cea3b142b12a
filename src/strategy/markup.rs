use async_trait::async_trait;
use log::{debug, info};

use super::{ResolveContext, Strategy, StrategyResult};
use crate::config::HTML_ACCEPT;
use crate::http::HttpProbe;
use crate::patterns::{script_blocks, ATTRIBUTE_MATCHER, MARKUP_MATCHER};

/// 抓取页面 HTML，在脚本和属性中查找清单地址
pub struct MarkupStrategy {
    http: HttpProbe,
}

impl MarkupStrategy {
    pub fn new(http: HttpProbe) -> Self {
        Self { http }
    }
}

/// 依次扫描内联脚本、标签属性、整个页面
pub fn scan_document(html: &str) -> Option<String> {
    script_blocks(html)
        .into_iter()
        .find_map(|script| MARKUP_MATCHER.first_match(script))
        .or_else(|| ATTRIBUTE_MATCHER.first_match(html))
        .or_else(|| MARKUP_MATCHER.first_match(html))
}

#[async_trait]
impl Strategy for MarkupStrategy {
    fn name(&self) -> &'static str {
        "markup"
    }

    async fn attempt(&self, ctx: &ResolveContext<'_>) -> StrategyResult {
        let response = match self
            .http
            .get(ctx.page_url, Some(ctx.page_url), Some(HTML_ACCEPT))
            .await
        {
            Ok(response) => response,
            Err(e) => return StrategyResult::TransportError(e.to_string()),
        };

        if !response.status.is_success() {
            return StrategyResult::TransportError(format!("HTTP {}", response.status));
        }

        debug!("Scanning {} bytes of page markup", response.body.len());
        match scan_document(&response.body) {
            Some(url) => {
                info!("Manifest found in page markup");
                StrategyResult::Found(url)
            }
            None => StrategyResult::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_script_over_attribute() {
        let html = r#"
            <html><body>
            <video data-src="https://attr.example/a.m3u8"></video>
            <script>var player = { hls: 'https://script.example/b.m3u8' };</script>
            </body></html>
        "#;
        assert_eq!(scan_document(html).as_deref(), Some("https://script.example/b.m3u8"));
    }

    #[test]
    fn falls_back_to_attributes() {
        let html = r#"<script>var a = 1;</script><source src="https://cdn.example/v/index.m3u8" type="application/x-mpegURL">"#;
        assert_eq!(
            scan_document(html).as_deref(),
            Some("https://cdn.example/v/index.m3u8")
        );
    }

    #[test]
    fn finds_url_in_plain_text() {
        let html = "<p>stream at https://cdn.example/live/index.m3u8 today</p>";
        assert_eq!(
            scan_document(html).as_deref(),
            Some("https://cdn.example/live/index.m3u8")
        );
    }

    #[test]
    fn returns_none_without_manifest() {
        let html = r#"<script>var player = { src: "/video.mp4" };</script>"#;
        assert_eq!(scan_document(html), None);
    }
}
