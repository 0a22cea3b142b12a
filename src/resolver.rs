use log::{debug, info, warn};
use regex::Regex;
use std::sync::{Arc, LazyLock};

use crate::browser::{ChromeProbe, HeadlessProbe};
use crate::config::{ResolverConfig, MANIFEST_MARKER};
use crate::error::ResolveError;
use crate::http::HttpProbe;
use crate::strategy::{
    ApiProbeStrategy, HeadlessStrategy, MarkupStrategy, PatternInferenceStrategy, ResolveContext, Strategy,
    StrategyResult,
};

static PLAYER_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/player/(\d+)").unwrap());

/// 判断输入是否已经是清单地址
pub fn is_manifest_url(input: &str) -> bool {
    input.contains(MANIFEST_MARKER)
}

/// 从页面地址中提取 PlayerID
pub fn extract_player_id(page_url: &str) -> Option<&str> {
    PLAYER_ID_REGEX
        .captures(page_url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// 按优先级依次执行策略，返回第一个找到的清单地址
pub struct ManifestResolver {
    strategies: Vec<Box<dyn Strategy>>,
}

impl ManifestResolver {
    /// 默认策略链：API、页面、推测地址，启用时最后用无头浏览器
    pub fn new(config: &ResolverConfig, http: HttpProbe) -> Self {
        let headless = config
            .headless
            .then(|| Arc::new(ChromeProbe::new(config.clone())) as Arc<dyn HeadlessProbe>);
        Self::with_headless(config, http, headless)
    }

    pub fn with_headless(config: &ResolverConfig, http: HttpProbe, headless: Option<Arc<dyn HeadlessProbe>>) -> Self {
        let mut strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(ApiProbeStrategy::new(http.clone(), config.api_endpoints.clone())),
            Box::new(MarkupStrategy::new(http.clone())),
            Box::new(PatternInferenceStrategy::new(http, config.cdn_templates.clone())),
        ];
        if let Some(probe) = headless {
            strategies.push(Box::new(HeadlessStrategy::new(probe, config.headless_timeout)));
        }
        Self::with_strategies(strategies)
    }

    pub fn with_strategies(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn resolve(&self, page_url: &str) -> Result<String, ResolveError> {
        if is_manifest_url(page_url) {
            debug!("Input is already a manifest url");
            return Ok(page_url.to_string());
        }

        let player_id = extract_player_id(page_url)
            .ok_or_else(|| ResolveError::InvalidInput(format!("no player id in {page_url}")))?;
        info!("Resolving manifest for player {}", player_id);

        let ctx = ResolveContext { page_url, player_id };
        for strategy in &self.strategies {
            debug!("Trying strategy {}", strategy.name());
            match strategy.attempt(&ctx).await {
                StrategyResult::Found(url) => {
                    info!("Strategy {} found manifest: {}", strategy.name(), url);
                    return Ok(url);
                }
                failed @ StrategyResult::TransportError(_) => {
                    warn!("Strategy {}: {}", strategy.name(), failed)
                }
                other => info!("Strategy {}: {}", strategy.name(), other),
            }
        }

        Err(ResolveError::ManifestNotFound)
    }
}
