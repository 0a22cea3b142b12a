use std::path::PathBuf;
use std::time::Duration;

/// 所有请求使用的桌面浏览器标识
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

/// 页面抓取请求的 Accept 头
pub const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// 清单文件扩展名标记
pub const MANIFEST_MARKER: &str = ".m3u8";

/// 解析器的全部可调参数
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// API 地址模板，按顺序尝试
    pub api_endpoints: Vec<String>,
    /// CDN 地址模板，替换 `{date}` 和 `{player_id}`
    pub cdn_templates: Vec<String>,
    pub request_timeout: Duration,
    pub probe_timeout: Duration,
    pub extra_headers: Vec<String>,
    /// 主列表跳转的最大层数
    pub max_playlist_depth: usize,
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub navigation_timeout: Duration,
    pub ad_wait: Duration,
    pub poll_interval: Duration,
    pub headless_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            api_endpoints: vec![
                "https://vod.sooplive.co.kr/api/player/{player_id}".to_string(),
                "https://vod.sooplive.co.kr/api/vod/{player_id}".to_string(),
                "https://api.sooplive.co.kr/vod/{player_id}".to_string(),
                "https://vod.sooplive.co.kr/player/api/{player_id}".to_string(),
            ],
            cdn_templates: vec![
                "https://vod-normal-kr-cdn-z01.sooplive.co.kr/spkt/review_clip/{date}/{player_id}_1.smil/manifest.m3u8?rp=o00".to_string(),
                "https://vod-normal-kr-cdn-z01.sooplive.co.kr/spkt/review_clip/{date}/{player_id}/{date}_{player_id}_1.smil/manifest.m3u8?rp=o00".to_string(),
            ],
            request_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
            extra_headers: Vec::new(),
            max_playlist_depth: 4,
            headless: true,
            chrome_executable: None,
            navigation_timeout: Duration::from_secs(30),
            ad_wait: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            headless_timeout: Duration::from_secs(120),
        }
    }
}

impl ResolverConfig {
    /// 不启动浏览器的配置，常用于测试
    pub fn without_headless() -> Self {
        Self {
            headless: false,
            ..Self::default()
        }
    }
}

/// 用 PlayerID 展开 API 模板
pub fn expand_api_template(template: &str, player_id: &str) -> String {
    template.replace("{player_id}", player_id)
}

/// 用日期 (YYYYMMDD) 和 PlayerID 展开 CDN 模板
pub fn expand_cdn_template(template: &str, date: &str, player_id: &str) -> String {
    template
        .replace("{date}", date)
        .replace("{player_id}", player_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_cdn_template() {
        let url = expand_cdn_template(
            "https://cdn/{date}/{player_id}/{date}_{player_id}.m3u8",
            "20240102",
            "42",
        );
        assert_eq!(url, "https://cdn/20240102/42/20240102_42.m3u8");
    }

    #[test]
    fn default_chain_templates_are_ordered() {
        let config = ResolverConfig::default();
        assert_eq!(config.api_endpoints.len(), 4);
        assert!(config.api_endpoints[0].contains("/api/player/"));
        assert!(config
            .cdn_templates
            .iter()
            .all(|t| t.contains(MANIFEST_MARKER)));
    }
}
