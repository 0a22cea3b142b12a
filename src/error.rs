use thiserror::Error;

/// 解析流程对外暴露的唯一错误类型
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("no manifest url could be discovered")]
    ManifestNotFound,
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("failed to parse playlist: {0}")]
    ParseFailed(String),
    #[error("playlist nesting exceeded {0} levels")]
    TooDeep(usize),
    #[error("request timed out")]
    Timeout,
    #[error("http error: {0}")]
    Http(reqwest::Error),
}

impl From<reqwest::Error> for ResolveError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ResolveError::Timeout;
        }
        match err.status() {
            Some(status) => ResolveError::HttpStatus(status.as_u16()),
            None => ResolveError::Http(err),
        }
    }
}

impl ResolveError {
    /// 错误种类的简短名称，便于日志和测试断言
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::InvalidInput(_) => "InvalidInput",
            ResolveError::ManifestNotFound => "ManifestNotFound",
            ResolveError::HttpStatus(_) => "HttpStatus",
            ResolveError::ParseFailed(_) => "ParseFailed",
            ResolveError::TooDeep(_) => "TooDeep",
            ResolveError::Timeout => "Timeout",
            ResolveError::Http(_) => "Http",
        }
    }
}
