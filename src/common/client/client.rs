use std::time::Duration;

use reqwest::{
    Client, ClientBuilder, RequestBuilder, Response,
    header::{ACCEPT, ACCEPT_LANGUAGE, COOKIE, HeaderMap, HeaderValue, RANGE, REFERER, USER_AGENT},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};

use super::models::common::CommonResponse;
use crate::common::config::BilibiliConfig;
use crate::downloader::error::DownloadError;
use crate::platform::models::ByteRange;

// B站接口客户端，携带配置里的 UA 和 cookie
#[derive(Debug, Clone)]
pub struct BiliClient {
    pub inner: Client,
    api_base: String,
    cookies: Option<String>,
}

impl BiliClient {
    pub fn new(config: &BilibiliConfig) -> Result<Self, DownloadError> {
        let headers = Self::get_default_headers(&config.user_agent)?;

        let inner = ClientBuilder::new()
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()
            .map_err(|e| {
                error!("创建HTTP客户端失败: {}", e);
                DownloadError::Network(format!("创建HTTP客户端失败: {}", e))
            })?;

        Ok(Self {
            inner,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            cookies: config
                .cookies
                .clone()
                .filter(|cookies| !cookies.trim().is_empty()),
        })
    }

    pub fn get_default_headers(user_agent: &str) -> Result<HeaderMap, DownloadError> {
        // 创建默认请求头
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9"));
        headers.insert(
            REFERER,
            HeaderValue::from_static("https://www.bilibili.com/"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| DownloadError::InvalidUrl(format!("无效的 User-Agent: {}", e)))?,
        );

        Ok(headers)
    }

    pub fn api_url(&self, path: &str, query: &[(&str, String)]) -> String {
        let mut url = format!("{}/{}", self.api_base, path.trim_start_matches('/'));
        if !query.is_empty() {
            let query = query
                .iter()
                .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
                .collect::<Vec<String>>()
                .join("&");
            url.push('?');
            url.push_str(&query);
        }
        url
    }

    // 调用 JSON 接口，返回 data 字段
    pub async fn get_api<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, DownloadError> {
        let url = self.api_url(path, query);
        debug!("请求接口: {}", url);

        let resp = self.request(&url).send().await?;
        Self::check_response_status(&resp, &url)?;
        Self::handle_response::<T>(resp, &url).await
    }

    // 获取原始响应，用于流式下载
    pub async fn get_raw_response(
        &self,
        url: &str,
        range: Option<ByteRange>,
    ) -> Result<Response, DownloadError> {
        let mut request = self.request(url);
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }

        let resp = request.send().await?;
        Self::check_response_status(&resp, url)?;
        Ok(resp)
    }

    fn request(&self, url: &str) -> RequestBuilder {
        let request = self.inner.get(url);
        match &self.cookies {
            Some(cookies) => request.header(COOKIE, cookies.as_str()),
            None => request,
        }
    }

    async fn handle_response<T: DeserializeOwned>(
        resp: Response,
        url: &str,
    ) -> Result<T, DownloadError> {
        let text = resp.text().await?;

        let body: CommonResponse<Value> = serde_json::from_str(&text).map_err(|_| {
            if text.contains("<!DOCTYPE html>") || text.contains("<html") {
                DownloadError::Network(format!("接口返回了 HTML 页面，URL: {}", url))
            } else {
                DownloadError::Network(format!("响应解析失败，URL: {}", url))
            }
        })?;

        if body.code != 0 {
            return Err(Self::map_api_code(body.code, &body.message));
        }

        let data = body
            .data
            .filter(|data| !data.is_null())
            .ok_or_else(|| DownloadError::Network(format!("响应缺少 data 字段，URL: {}", url)))?;

        serde_json::from_value::<T>(data).map_err(|e| {
            error!("JSON 结构匹配失败: {}", e);
            error!("期望的结构 可能是: {}", std::any::type_name::<T>());
            DownloadError::Network(format!("结构匹配失败: {}", e))
        })
    }

    /// B站业务错误码归类
    pub fn map_api_code(code: i64, message: &str) -> DownloadError {
        match code {
            -404 | 62002 | 62004 => DownloadError::InvalidUrl(format!("视频不存在: {}", message)),
            -101 | -403 => DownloadError::AuthRequired(message.to_string()),
            -412 | -509 | -799 => DownloadError::RateLimited(message.to_string()),
            -400 => DownloadError::InvalidUrl(message.to_string()),
            _ => DownloadError::Network(format!("B站 API 错误 {}: {}", code, message)),
        }
    }

    // 检查响应状态并处理特殊情况
    fn check_response_status(response: &Response, url: &str) -> Result<(), DownloadError> {
        let status = response.status();
        debug!("Response Status: {}", status);

        match status {
            status if status.is_success() => Ok(()),
            reqwest::StatusCode::FORBIDDEN => {
                warn!("🚫 检测到 403 Forbidden 状态码，可能触发了风控机制");
                Err(DownloadError::RateLimited(format!(
                    "访问被拒绝 (403 Forbidden)，URL: {}，可能触发了风控机制",
                    url
                )))
            }
            status => {
                warn!("❌ 非成功状态码: {}", status);
                Err(DownloadError::from_status(status, url))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::error::ErrorKind;

    #[test]
    fn api_url_encodes_query() {
        let client = BiliClient::new(&BilibiliConfig::default()).unwrap();
        let url = client.api_url("/web-interface/view", &[("bvid", "BV1 x".to_string())]);
        assert_eq!(url, "https://api.bilibili.com/x/web-interface/view?bvid=BV1%20x");
    }

    #[test]
    fn api_codes_are_classified() {
        assert_eq!(BiliClient::map_api_code(-404, "啥都木有").kind(), ErrorKind::InvalidUrl);
        assert_eq!(BiliClient::map_api_code(-101, "账号未登录").kind(), ErrorKind::AuthRequired);
        assert_eq!(BiliClient::map_api_code(-412, "请求被拦截").kind(), ErrorKind::RateLimited);
        assert_eq!(BiliClient::map_api_code(-500, "服务器错误").kind(), ErrorKind::NetworkError);
    }
}
