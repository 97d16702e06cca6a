//! WiFi 网络切换
//!
//! - [`NetworkAdapter`]: 编排器依赖的网络操作抽象
//! - [`NmNetworkAdapter`]: 基于 NetworkManager D-Bus 的实现
//! - [`NoNetwork`]: 不切换网络
//! - [`CardSsid`] / [`NetworkIdentity`]: 卡网络与普通网络的名称

pub mod adapter;
pub mod nm_dbus;

pub use adapter::NmNetworkAdapter;

use async_trait::async_trait;
use log::{error, info};
use std::fmt;

use crate::error::ConnectionError;

/// 一个可加入的网络（卡网络或家庭网络），只由名称标识
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetworkIdentity(String);

impl NetworkIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 符合卡命名约定的 SSID（如 `ez Share X100S`）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CardSsid {
    ssid: String,
    suffix: String,
}

impl CardSsid {
    /// SSID 包含 `tag` 时返回卡网络，否则返回 `None`
    ///
    /// 后缀为标记之后的部分并去掉前导空白；后缀为空时退回完整 SSID，
    /// 保证每张卡都有自己的子目录。
    pub fn parse(ssid: &str, tag: &str) -> Option<Self> {
        if tag.is_empty() {
            return None;
        }
        let (_, rest) = ssid.split_once(tag)?;
        let suffix = rest.trim_start();
        let suffix = if suffix.is_empty() { ssid } else { suffix };

        Some(Self {
            ssid: ssid.to_string(),
            suffix: suffix.trim_end().to_string(),
        })
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    /// 目标子目录名
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn identity(&self) -> NetworkIdentity {
        NetworkIdentity::new(self.ssid.clone())
    }
}

impl fmt::Display for CardSsid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ssid)
    }
}

/// 从扫描结果中筛选卡网络，去重并保持扫描顺序
pub fn filter_card_ssids<I, S>(ssids: I, tag: &str) -> Vec<CardSsid>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut cards: Vec<CardSsid> = Vec::new();
    for ssid in ssids {
        if let Some(card) = CardSsid::parse(ssid.as_ref(), tag)
            && !cards.contains(&card)
        {
            cards.push(card);
        }
    }
    cards
}

/// 主机网络操作
///
/// 编排器是唯一的调用者，也是“当前加入哪个网络”这一状态的唯一写入者。
#[async_trait]
pub trait NetworkAdapter: Send + Sync {
    /// 列出当前可见的卡网络；没有时返回空列表
    async fn list_card_networks(&self) -> Result<Vec<CardSsid>, ConnectionError>;

    /// 当前活动连接；没有时记录 error 日志并返回 `None`
    async fn current_active_connection(&self) -> Option<NetworkIdentity>;

    /// 加入卡网络
    async fn join(&self, ssid: &CardSsid, shared_secret: &str) -> Result<(), ConnectionError>;

    /// 重新激活之前的连接
    async fn reconnect(&self, identity: &NetworkIdentity) -> Result<(), ConnectionError>;

    /// 恢复之前的连接，失败只记录日志
    ///
    /// 这个调用本身出现在各个失败处理路径中，不能掩盖正在处理的原始错误。
    async fn rejoin(&self, identity: &NetworkIdentity) {
        match self.reconnect(identity).await {
            Ok(()) => info!("Reconnected to home network '{}'", identity),
            Err(e) => error!("Error reconnecting to home network '{}': {}", identity, e),
        }
    }
}

/// 不切换网络的适配器，用于主机已经连在卡上的场景
///
/// 发现不到任何卡，也没有可恢复的连接；加入和重连都返回错误。
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNetwork;

#[async_trait]
impl NetworkAdapter for NoNetwork {
    async fn list_card_networks(&self) -> Result<Vec<CardSsid>, ConnectionError> {
        Ok(Vec::new())
    }

    async fn current_active_connection(&self) -> Option<NetworkIdentity> {
        None
    }

    async fn join(&self, _ssid: &CardSsid, _shared_secret: &str) -> Result<(), ConnectionError> {
        Err(ConnectionError::NoWifiDevice)
    }

    async fn reconnect(&self, _identity: &NetworkIdentity) -> Result<(), ConnectionError> {
        Err(ConnectionError::NoWifiDevice)
    }
}
