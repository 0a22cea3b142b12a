pub mod api;
pub mod headless;
pub mod inference;
pub mod markup;

use async_trait::async_trait;
use std::fmt;

pub use api::ApiProbeStrategy;
pub use headless::HeadlessStrategy;
pub use inference::PatternInferenceStrategy;
pub use markup::MarkupStrategy;

#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub page_url: &'a str,
    pub player_id: &'a str,
}

/// 单个策略的执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyResult {
    Found(String),
    NotFound,
    TransportError(String),
}

impl fmt::Display for StrategyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyResult::Found(url) => write!(f, "found {url}"),
            StrategyResult::NotFound => write!(f, "not found"),
            StrategyResult::TransportError(reason) => write!(f, "transport error: {reason}"),
        }
    }
}

#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// 尝试一次，失败体现在结果中而不是返回错误
    async fn attempt(&self, ctx: &ResolveContext<'_>) -> StrategyResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_render_for_logs() {
        assert_eq!(StrategyResult::Found("https://x/y.m3u8".into()).to_string(), "found https://x/y.m3u8");
        assert_eq!(StrategyResult::NotFound.to_string(), "not found");
        assert_eq!(
            StrategyResult::TransportError("connection refused".into()).to_string(),
            "transport error: connection refused"
        );
    }
}
