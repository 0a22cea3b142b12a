use async_trait::async_trait;
use log::{info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::{ResolveContext, Strategy, StrategyResult};
use crate::browser::HeadlessProbe;
use crate::patterns::is_absolute_manifest_url;

/// 最后手段：渲染页面并观察网络流量
pub struct HeadlessStrategy {
    probe: Arc<dyn HeadlessProbe>,
    timeout: Duration,
}

impl HeadlessStrategy {
    pub fn new(probe: Arc<dyn HeadlessProbe>, timeout: Duration) -> Self {
        Self { probe, timeout }
    }
}

/// 去重后返回第一个有效的绝对清单地址
pub fn first_manifest(observed: Vec<String>) -> Option<String> {
    let mut seen = HashSet::new();
    observed
        .into_iter()
        .filter(|url| seen.insert(url.clone()))
        .find(|url| is_absolute_manifest_url(url))
}

#[async_trait]
impl Strategy for HeadlessStrategy {
    fn name(&self) -> &'static str {
        "headless"
    }

    async fn attempt(&self, ctx: &ResolveContext<'_>) -> StrategyResult {
        match self.probe.observe(ctx.page_url, self.timeout).await {
            Ok(observed) => {
                info!("Headless probe observed {} manifest candidate(s)", observed.len());
                match first_manifest(observed) {
                    Some(url) => StrategyResult::Found(url),
                    None => StrategyResult::NotFound,
                }
            }
            Err(e) => {
                warn!("Headless probe unavailable: {:#}", e);
                StrategyResult::TransportError(e.to_string())
            }
        }
    }
}
