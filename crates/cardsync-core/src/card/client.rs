//! 卡的 HTTP 接口
//!
//! 卡上运行的是低功耗嵌入式 HTTP 服务器，只提供两个端点：
//!
//! - `GET /dir?dir=A:%5CDCIM`: 返回 HTML 目录页，每个条目是一个 `<a>`
//! - `GET /download?file=DCIM%5CIMG_0001.JPG`: 返回文件原始内容
//!
//! 路径分隔符是反斜杠，在查询参数中编码为 `%5C`。

use async_trait::async_trait;
use log::debug;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::Url;
use std::time::Duration;

use crate::card::CardPath;
use crate::config::SyncSettings;
use crate::error::{ConfigError, FetchError, ListingError};

/// 查询参数中需要编码的字符（`:`、`.`、`_` 保持原样，与卡自身生成的链接一致）
const QUERY_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// 编码查询参数值
pub fn encode_query_value(value: &str) -> String {
    utf8_percent_encode(value, QUERY_VALUE).to_string()
}

/// 卡端 HTTP 操作
///
/// 爬取器和下载器只依赖这个 trait，测试中用内存实现替代。
#[async_trait]
pub trait CardClient: Send + Sync {
    /// 卡文件浏览器的基础地址，用于解析目录页中的相对链接
    fn base_url(&self) -> &Url;

    /// 获取一个目录的 HTML 列表页
    async fn list_directory(&self, path: &CardPath) -> Result<String, ListingError>;

    /// 下载一个文件（`remote_file` 为反斜杠分隔的相对路径）
    async fn download(&self, remote_file: &str) -> Result<Vec<u8>, FetchError>;
}

/// 基于 reqwest 的卡客户端
pub struct HttpCardClient {
    client: reqwest::Client,
    base_url: Url,
    listing_timeout: Duration,
}

impl HttpCardClient {
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        listing_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let base_url = Url::parse(base_url).map_err(|e| ConfigError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        // 卡只在它自己的无线网络上可达，系统代理无法转发到它。
        // 超时只限制建立连接和两次读取之间的空闲，持续传输的大文件不受总时长限制。
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .read_timeout(request_timeout)
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            base_url,
            listing_timeout,
        })
    }

    pub fn from_settings(settings: &SyncSettings) -> Result<Self, ConfigError> {
        Self::new(
            &settings.card_base_url,
            settings.request_timeout(),
            settings.listing_timeout(),
        )
    }

    /// 目录列表地址
    pub fn listing_url(&self, path: &CardPath) -> String {
        format!(
            "{}/dir?dir={}",
            self.base_url.as_str().trim_end_matches('/'),
            encode_query_value(&path.to_string())
        )
    }

    /// 文件下载地址
    pub fn download_url(&self, remote_file: &str) -> String {
        format!(
            "{}/download?file={}",
            self.base_url.as_str().trim_end_matches('/'),
            encode_query_value(remote_file)
        )
    }
}

#[async_trait]
impl CardClient for HttpCardClient {
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn list_directory(&self, path: &CardPath) -> Result<String, ListingError> {
        let url = self.listing_url(path);
        debug!("Loading '{}'", url);

        let response = self
            .client
            .get(&url)
            .timeout(self.listing_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ListingError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }

    async fn download(&self, remote_file: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.download_url(remote_file);
        debug!("Downloading {}", url);

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpCardClient {
        HttpCardClient::new(
            "http://ezshare.card/",
            Duration::from_secs(10),
            Duration::from_secs(30),
        )
        .unwrap()
    }

    #[test]
    fn test_listing_url() {
        let client = client();
        assert_eq!(
            client.listing_url(&CardPath::parse("A:")),
            "http://ezshare.card/dir?dir=A:"
        );
        assert_eq!(
            client.listing_url(&CardPath::parse("A:\\DCIM\\100CANON")),
            "http://ezshare.card/dir?dir=A:%5CDCIM%5C100CANON"
        );
    }

    #[test]
    fn test_download_url() {
        let client = client();
        assert_eq!(
            client.download_url("IMG_0001.JPG"),
            "http://ezshare.card/download?file=IMG_0001.JPG"
        );
        assert_eq!(
            client.download_url("100CANON\\IMG 0002.JPG"),
            "http://ezshare.card/download?file=100CANON%5CIMG%200002.JPG"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = HttpCardClient::new(
            "not a url",
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(ConfigError::InvalidUrl { .. })));
    }
}
