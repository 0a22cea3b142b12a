use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{EventRequestWillBeSent, EventResponseReceived};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use log::{debug, info, warn};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

use crate::config::{ResolverConfig, MANIFEST_MARKER, USER_AGENT};
use crate::patterns::MARKUP_MATCHER;

/// 渲染页面，报告网络请求和 DOM 中出现的清单地址
#[async_trait]
pub trait HeadlessProbe: Send + Sync {
    /// 按观察顺序返回候选地址，可能重复
    async fn observe(&self, page_url: &str, timeout: Duration) -> Result<Vec<String>>;
}

const VIEW_VOD_SELECTORS: &[&str] = &[
    "button.btn_vod",
    "a.btn_vod",
    "[class*='vod_play']",
    "[class*='btn_view']",
];

const VIEW_VOD_TEXTS: &[&str] = &["VOD 보기", "다시보기", "View VOD", "Watch VOD"];

const SKIP_SELECTORS: &[&str] = &[
    "[class*='btn_skip']",
    "[class*='ad_skip']",
    "button[class*='skip']",
    "#skip",
];

const SKIP_TEXTS: &[&str] = &["광고 건너뛰기", "건너뛰기", "Skip Ad", "Skip"];

const SCRIPT_TEXT_JS: &str =
    "Array.from(document.scripts).map(s => s.textContent || '').join('\\n')";

/// 按观察顺序记录带有清单标记的 URL
#[derive(Debug, Clone, Default)]
struct NetworkLog {
    urls: Arc<Mutex<Vec<String>>>,
}

impl NetworkLog {
    fn record(&self, url: &str) {
        if !url.contains(MANIFEST_MARKER) {
            return;
        }
        if let Ok(mut urls) = self.urls.lock() {
            debug!("Observed manifest traffic: {}", url);
            urls.push(url.to_string());
        }
    }

    fn is_empty(&self) -> bool {
        self.urls.lock().map(|urls| urls.is_empty()).unwrap_or(true)
    }

    fn snapshot(&self) -> Vec<String> {
        self.urls.lock().map(|urls| urls.clone()).unwrap_or_default()
    }
}

/// 一个浏览器进程及其事件任务；丢弃时配置目录随之删除
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    listeners: Vec<JoinHandle<()>>,
    profile_dir: TempDir,
}

impl BrowserSession {
    /// 优先使用指定的本地浏览器，失败时回退到自动探测
    async fn launch(config: &ResolverConfig) -> Result<Self> {
        if let Some(path) = config.chrome_executable.as_deref() {
            if path.exists() {
                match Self::launch_with(Some(path), config).await {
                    Ok(session) => return Ok(session),
                    Err(e) => warn!("Preferred browser {:?} failed to start, falling back: {:#}", path, e),
                }
            } else {
                warn!("Preferred browser {:?} not found, falling back", path);
            }
        }
        Self::launch_with(None, config).await
    }

    async fn launch_with(executable: Option<&Path>, config: &ResolverConfig) -> Result<Self> {
        // 每个会话使用独立的临时配置目录
        let profile_dir = tempfile::Builder::new()
            .prefix("vod-audio-")
            .tempdir()
            .context("failed to create browser profile directory")?;
        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile_dir.path())
            .no_sandbox()
            .request_timeout(config.navigation_timeout)
            .arg(format!("--user-agent={USER_AGENT}"))
            .arg("--mute-audio")
            .arg("--autoplay-policy=no-user-gesture-required");
        if let Some(executable) = executable {
            builder = builder.chrome_executable(executable);
        }
        let browser_config = builder
            .build()
            .map_err(|e| anyhow!("invalid browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("failed to launch browser")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            handler,
            listeners: Vec::new(),
            profile_dir,
        })
    }

    async fn open_page(&mut self, log: &NetworkLog) -> Result<Page> {
        let page = self.browser.new_page("about:blank").await?;

        let mut requests = page.event_listener::<EventRequestWillBeSent>().await?;
        let request_log = log.clone();
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                request_log.record(&event.request.url);
            }
        }));

        let mut responses = page.event_listener::<EventResponseReceived>().await?;
        let response_log = log.clone();
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                response_log.record(&event.response.url);
            }
        }));

        Ok(page)
    }

    /// 关闭浏览器，失败只记录日志
    async fn close(mut self) {
        for listener in self.listeners.drain(..) {
            listener.abort();
        }
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
        match timeout(Duration::from_secs(5), self.browser.wait()).await {
            Ok(Err(e)) => warn!("Failed to reap browser process: {}", e),
            Err(_) => warn!("Browser process did not exit in time"),
            Ok(Ok(_)) => debug!("Browser session closed, removing {:?}", self.profile_dir.path()),
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.abort();
        }
        self.handler.abort();
    }
}

/// 基于 chromiumoxide 的无头浏览器探测
pub struct ChromeProbe {
    config: ResolverConfig,
}

impl ChromeProbe {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    async fn drive(&self, session: &mut BrowserSession, page_url: &str, log: &NetworkLog) -> Result<Vec<String>> {
        let page = session.open_page(log).await?;

        // 导航失败不终止，继续观察已发生的流量
        match timeout(self.config.navigation_timeout, page.goto(page_url)).await {
            Ok(Ok(_)) => debug!("Loaded {}", page_url),
            Ok(Err(e)) => warn!("Navigation error, continuing: {}", e),
            Err(_) => warn!("Navigation timed out after {:?}, continuing", self.config.navigation_timeout),
        }

        if click_first(&page, VIEW_VOD_SELECTORS, VIEW_VOD_TEXTS).await {
            info!("Activated VOD view control");
            sleep(Duration::from_secs(2)).await;
        } else {
            debug!("No VOD view control found");
        }

        self.wait_for_player(&page, log).await;

        let mut found = log.snapshot();
        found.extend(scan_dom(&page).await);
        Ok(found)
    }

    /// 轮询跳过广告，直到出现播放器且已观察到清单，或超过等待上限
    async fn wait_for_player(&self, page: &Page, log: &NetworkLog) {
        let deadline = Instant::now() + self.config.ad_wait;
        while Instant::now() < deadline {
            if click_first(page, SKIP_SELECTORS, SKIP_TEXTS).await {
                debug!("Clicked a skip control");
            }
            let has_player = page.find_element("video").await.is_ok();
            if has_player && !log.is_empty() {
                debug!("Player present and manifest observed");
                return;
            }
            sleep(self.config.poll_interval).await;
        }
        debug!("Ad wait window of {:?} elapsed", self.config.ad_wait);
    }
}

#[async_trait]
impl HeadlessProbe for ChromeProbe {
    async fn observe(&self, page_url: &str, limit: Duration) -> Result<Vec<String>> {
        let log = NetworkLog::default();
        let mut session = BrowserSession::launch(&self.config).await?;

        let outcome = timeout(limit, self.drive(&mut session, page_url, &log)).await;
        session.close().await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!("Headless probe hit its {:?} limit", limit);
                Ok(log.snapshot())
            }
        }
    }
}

/// 先按选择器，再按文字查找并点击第一个匹配的控件
async fn click_first(page: &Page, selectors: &[&str], texts: &[&str]) -> bool {
    for selector in selectors {
        if let Ok(element) = page.find_element(*selector).await {
            if element.click().await.is_ok() {
                return true;
            }
        }
    }

    let needles = match serde_json::to_string(texts) {
        Ok(needles) => needles,
        Err(_) => return false,
    };
    let script = format!(
        "(() => {{ const needles = {needles}; \
         const nodes = Array.from(document.querySelectorAll('button, a, [role=\"button\"]')); \
         for (const needle of needles) {{ \
           const el = nodes.find(n => (n.innerText || '').trim().includes(needle)); \
           if (el) {{ el.click(); return true; }} \
         }} \
         return false; }})()"
    );
    match page.evaluate(script).await {
        Ok(result) => result.into_value::<bool>().unwrap_or(false),
        Err(_) => false,
    }
}

/// 扫描渲染后的脚本和完整 HTML，捕获未通过网络请求的地址
async fn scan_dom(page: &Page) -> Vec<String> {
    let scripts = match page.evaluate(SCRIPT_TEXT_JS).await {
        Ok(result) => result.into_value::<String>().unwrap_or_default(),
        Err(e) => {
            debug!("Script scan failed: {}", e);
            String::new()
        }
    };
    let html = page.content().await.unwrap_or_default();

    let mut found = MARKUP_MATCHER.all_matches(&scripts);
    found.extend(MARKUP_MATCHER.all_matches(&html));
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_log_keeps_only_manifests_in_order() {
        let log = NetworkLog::default();
        log.record("https://cdn.example/a.ts");
        log.record("https://cdn.example/b.m3u8");
        log.record("https://cdn.example/a.m3u8?x=1");
        assert_eq!(
            log.snapshot(),
            vec!["https://cdn.example/b.m3u8", "https://cdn.example/a.m3u8?x=1"]
        );
        assert!(!log.is_empty());
    }

    fn profile_dirs() -> Vec<std::path::PathBuf> {
        std::fs::read_dir(std::env::temp_dir())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("vod-audio-"))
            .map(|entry| entry.path())
            .collect()
    }

    #[tokio::test]
    async fn failed_launch_removes_profile_dir() {
        let before = profile_dirs();
        let config = ResolverConfig::default();

        let result = BrowserSession::launch_with(Some(Path::new("/nonexistent/chrome")), &config).await;

        assert!(result.is_err());
        let leaked: Vec<_> = profile_dirs()
            .into_iter()
            .filter(|dir| !before.contains(dir))
            .collect();
        assert!(leaked.is_empty(), "leaked profile dirs: {leaked:?}");
    }
}
