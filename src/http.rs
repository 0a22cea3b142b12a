use log::{debug, warn};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, REFERER, USER_AGENT},
    redirect, Client, StatusCode,
};
use std::time::Duration;
use url::Url;

use crate::config::{ResolverConfig, USER_AGENT as DEFAULT_UA};
use crate::error::ResolveError;

/// 单次请求的结果，状态码不做判断，由调用方决定
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status: StatusCode,
    pub url: Url,
    pub body: String,
}

/// 所有解析策略共用的 HTTP 探测器
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    // HEAD 探测不跟随重定向
    probe_client: Client,
}

fn build_headers(custom_headers: &[String]) -> Result<HeaderMap, ResolveError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_UA));

    for header in custom_headers {
        if let Some((key, value)) = header.split_once(':') {
            let header_name = HeaderName::from_bytes(key.trim().as_bytes())
                .map_err(|e| ResolveError::InvalidInput(format!("bad header name {key:?}: {e}")))?;
            let header_value = HeaderValue::from_str(value.trim())
                .map_err(|e| ResolveError::InvalidInput(format!("bad header value {value:?}: {e}")))?;
            headers.insert(header_name, header_value);
        } else {
            warn!("Ignoring malformed header: {}", header);
        }
    }

    debug!("Using HTTP headers: {:?}", headers);
    Ok(headers)
}

/// 构建HTTP客户端，包含自定义请求头
pub fn build_http_client(custom_headers: &[String], timeout: Duration) -> Result<Client, ResolveError> {
    let client = Client::builder()
        .default_headers(build_headers(custom_headers)?)
        .timeout(timeout)
        .build()
        .map_err(ResolveError::Http)?;

    Ok(client)
}

impl HttpProbe {
    pub fn new(config: &ResolverConfig) -> Result<Self, ResolveError> {
        let client = build_http_client(&config.extra_headers, config.request_timeout)?;
        let probe_client = Client::builder()
            .default_headers(build_headers(&config.extra_headers)?)
            .timeout(config.probe_timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(ResolveError::Http)?;
        Ok(Self {
            client,
            probe_client,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// 发送 GET 请求并读取完整响应体
    pub async fn get(
        &self,
        url: &str,
        referer: Option<&str>,
        accept: Option<&str>,
    ) -> Result<ProbeResponse, reqwest::Error> {
        let mut request = self.client.get(url);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }

        let response = request.send().await?;
        let status = response.status();
        let final_url = response.url().clone();
        let body = response.text().await?;

        Ok(ProbeResponse {
            status,
            url: final_url,
            body,
        })
    }

    /// 获取文本内容，非 2xx 状态直接作为错误返回
    pub async fn fetch_text(&self, url: &Url) -> Result<(Url, String), ResolveError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::HttpStatus(status.as_u16()));
        }
        let final_url = response.url().clone();
        let content = response.text().await?;
        Ok((final_url, content))
    }

    /// 轻量级存在性探测 (HEAD)，重定向状态原样返回
    pub async fn head(&self, url: &str) -> Result<StatusCode, reqwest::Error> {
        let response = self.probe_client.head(url).send().await?;
        Ok(response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_header_name() {
        let err = build_http_client(&["bad header: x".to_string()], Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
    }

    #[test]
    fn ignores_header_without_colon() {
        assert!(build_http_client(&["Cookie".to_string()], Duration::from_secs(1)).is_ok());
    }
}
