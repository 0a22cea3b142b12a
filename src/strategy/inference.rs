use async_trait::async_trait;
use chrono::Local;
use log::{debug, info};

use super::{ResolveContext, Strategy, StrategyResult};
use crate::config::{expand_cdn_template, MANIFEST_MARKER};
use crate::http::HttpProbe;

/// 根据当天日期和 PlayerID 猜测 CDN 地址，用 HEAD 请求验证
pub struct PatternInferenceStrategy {
    http: HttpProbe,
    templates: Vec<String>,
    date: Option<String>,
}

impl PatternInferenceStrategy {
    pub fn new(http: HttpProbe, templates: Vec<String>) -> Self {
        Self {
            http,
            templates,
            date: None,
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn candidates(&self, player_id: &str) -> Vec<String> {
        let date = self
            .date
            .clone()
            .unwrap_or_else(|| Local::now().format("%Y%m%d").to_string());
        self.templates
            .iter()
            .map(|template| expand_cdn_template(template, &date, player_id))
            .filter(|url| url.contains(MANIFEST_MARKER))
            .collect()
    }
}

#[async_trait]
impl Strategy for PatternInferenceStrategy {
    fn name(&self) -> &'static str {
        "inference"
    }

    async fn attempt(&self, ctx: &ResolveContext<'_>) -> StrategyResult {
        for candidate in self.candidates(ctx.player_id) {
            match self.http.head(&candidate).await {
                Ok(status) if status.is_success() || status.is_redirection() => {
                    info!("Inferred manifest responded {}: {}", status, candidate);
                    return StrategyResult::Found(candidate);
                }
                Ok(status) => debug!("Inferred candidate {} answered {}", candidate, status),
                Err(e) => debug!("Inferred candidate {} failed: {}", candidate, e),
            }
        }
        StrategyResult::NotFound
    }
}
