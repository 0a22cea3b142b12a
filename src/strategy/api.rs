use async_trait::async_trait;
use log::{debug, info};

use super::{ResolveContext, Strategy, StrategyResult};
use crate::config::expand_api_template;
use crate::http::HttpProbe;
use crate::patterns::API_MATCHER;
use crate::playlist::resolve_uri;

/// 依次请求候选 API，在 JSON 响应中查找清单地址
pub struct ApiProbeStrategy {
    http: HttpProbe,
    endpoints: Vec<String>,
}

impl ApiProbeStrategy {
    pub fn new(http: HttpProbe, endpoints: Vec<String>) -> Self {
        Self { http, endpoints }
    }

    /// `Ok(None)` 表示接口有响应但没有清单地址
    async fn probe_endpoint(&self, api_url: &str, page_url: &str) -> Result<Option<String>, String> {
        let response = self
            .http
            .get(api_url, Some(page_url), Some("application/json"))
            .await
            .map_err(|e| e.to_string())?;

        if !response.status.is_success() {
            debug!("API {} answered {}", api_url, response.status);
            return Ok(None);
        }

        let data: serde_json::Value = match serde_json::from_str(&response.body) {
            Ok(data) => data,
            Err(e) => {
                debug!("API {} returned non-JSON body: {}", api_url, e);
                return Ok(None);
            }
        };

        // 重新序列化可以去掉 `\/` 之类的转义
        let serialized = data.to_string();
        Ok(API_MATCHER
            .first_match(&serialized)
            .map(|found| resolve_uri(&response.url, &found)))
    }
}

#[async_trait]
impl Strategy for ApiProbeStrategy {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn attempt(&self, ctx: &ResolveContext<'_>) -> StrategyResult {
        let mut answered = false;
        let mut last_error = None;

        for template in &self.endpoints {
            let api_url = expand_api_template(template, ctx.player_id);
            match self.probe_endpoint(&api_url, ctx.page_url).await {
                Ok(Some(url)) => {
                    info!("Manifest found via API {}", api_url);
                    return StrategyResult::Found(url);
                }
                Ok(None) => answered = true,
                Err(reason) => {
                    debug!("API {} failed: {}", api_url, reason);
                    last_error = Some(reason);
                }
            }
        }

        match last_error {
            Some(reason) if !answered => StrategyResult::TransportError(reason),
            _ => StrategyResult::NotFound,
        }
    }
}
