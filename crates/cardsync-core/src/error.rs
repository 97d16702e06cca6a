//! 错误类型
//!
//! 按照失败范围划分：
//! - [`ConnectionError`]: 加入/恢复网络失败，只终止当前卡的处理
//! - [`ListingError`]: 目录列表请求或解析失败，放弃整张卡的目录
//! - [`FetchError`]: 单次下载尝试失败，由重试循环消化
//! - [`ConfigError`]: 配置文件读写失败

use thiserror::Error;

/// 网络切换错误
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("NetworkManager D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    #[error("no Wi-Fi device available")]
    NoWifiDevice,

    #[error("no saved connection named '{0}'")]
    UnknownConnection(String),

    #[error("connection '{name}' failed to activate (state: {state})")]
    ActivationFailed { name: String, state: &'static str },

    #[error("timed out waiting for '{name}' to activate")]
    ActivationTimeout { name: String },
}

/// 卡目录列表错误
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("listing request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("listing '{path}' returned HTTP {status}")]
    Status { path: String, status: u16 },

    #[error("malformed listing for '{path}': {reason}")]
    Malformed { path: String, reason: String },
}

/// 单次下载尝试的错误
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("download request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("download returned HTTP {0}")]
    Status(u16),

    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("refusing unsafe local path component '{0}'")]
    InvalidPath(String),
}

/// 配置文件错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid card URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
