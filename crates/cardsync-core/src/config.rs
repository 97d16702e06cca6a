//! 同步配置和持久化
//!
//! 卡的 SSID 约定、共享密码、目标目录以及各类重试/轮询间隔。

use crate::error::ConfigError;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 同步设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// 本地目标根目录，每张卡一个子目录
    pub destination: PathBuf,
    /// 卡 SSID 的固定标记（如 "ez Share X100S" 中的 "ez Share"）
    pub card_ssid_tag: String,
    /// 所有卡共用的 WPA 密码
    pub card_password: String,
    /// 卡的 HTTP 文件浏览器地址
    pub card_base_url: String,
    /// 卡上的根目录
    pub card_root: String,
    /// WiFi 接口名称（为空则使用第一个 WiFi 设备）
    pub wifi_interface: Option<String>,
    /// 轮询模式下两次发现之间的间隔
    pub poll_interval_secs: u64,
    /// 轮询模式下处理完一张卡后的停顿
    pub card_pause_secs: u64,
    /// 单个文件的最大下载尝试次数
    pub max_attempts: u32,
    /// 首次重试前的等待时间（之后每次翻倍）
    pub initial_backoff_secs: u64,
    /// 建立连接和读取空闲的超时（不限制整个下载的时长）
    pub request_timeout_secs: u64,
    /// 目录列表请求超时
    pub listing_timeout_secs: u64,
    /// 等待 NetworkManager 激活连接的超时
    pub activation_timeout_secs: u64,
    /// 请求 WiFi 扫描后等待结果的时间
    pub scan_settle_secs: u64,
    /// 目录递归的最大深度
    pub max_crawl_depth: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            destination: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("sdcard-sync"),
            card_ssid_tag: "ez Share".to_string(),
            card_password: "88888888".to_string(),
            card_base_url: "http://ezshare.card".to_string(),
            card_root: "A:".to_string(),
            wifi_interface: None,
            poll_interval_secs: 600,
            card_pause_secs: 10,
            max_attempts: 10,
            initial_backoff_secs: 1,
            request_timeout_secs: 10,
            listing_timeout_secs: 30,
            activation_timeout_secs: 30,
            scan_settle_secs: 2,
            max_crawl_depth: 32,
        }
    }
}

impl SyncSettings {
    /// 默认配置文件路径
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cardsync")
            .join("settings.toml")
    }

    /// 加载设置（文件不存在或无法解析时使用默认值）
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    /// 从指定文件加载设置
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let settings = toml::from_str(&content)?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// 保存设置
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn card_pause(&self) -> Duration {
        Duration::from_secs(self.card_pause_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_secs(self.initial_backoff_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn listing_timeout(&self) -> Duration {
        Duration::from_secs(self.listing_timeout_secs)
    }

    pub fn activation_timeout(&self) -> Duration {
        Duration::from_secs(self.activation_timeout_secs)
    }

    pub fn scan_settle(&self) -> Duration {
        Duration::from_secs(self.scan_settle_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = SyncSettings::default();
        assert_eq!(settings.card_ssid_tag, "ez Share");
        assert_eq!(settings.card_password, "88888888");
        assert_eq!(settings.max_attempts, 10);
        assert_eq!(settings.poll_interval(), Duration::from_secs(600));
        assert_eq!(settings.card_pause(), Duration::from_secs(10));
        assert!(settings.destination.ends_with("sdcard-sync"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings: SyncSettings = toml::from_str(
            r#"
            destination = "/srv/photos"
            card_ssid_tag = "Flash Air"
            "#,
        )
        .unwrap();

        assert_eq!(settings.destination, PathBuf::from("/srv/photos"));
        assert_eq!(settings.card_ssid_tag, "Flash Air");
        // 未指定的字段回退到默认值
        assert_eq!(settings.card_root, "A:");
        assert_eq!(settings.request_timeout_secs, 10);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let settings = SyncSettings {
            wifi_interface: Some("wlp3s0".to_string()),
            poll_interval_secs: 120,
            ..Default::default()
        };
        settings.save_to(&path).unwrap();

        let loaded = SyncSettings::load_from(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_load_from_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "max_attempts = \"many\"").unwrap();

        let err = SyncSettings::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
