//! 基于 NetworkManager 的网络适配器

use async_trait::async_trait;
use log::{debug, error, info};
use std::time::Duration;

use crate::config::SyncSettings;
use crate::error::ConnectionError;
use crate::wifi::nm_dbus::{NmClient, WifiDevice};
use crate::wifi::{CardSsid, NetworkAdapter, NetworkIdentity, filter_card_ssids};

/// NetworkManager 中回环连接的类型名
const LOOPBACK_TYPE: &str = "loopback";

/// 通过 NetworkManager D-Bus 切换网络
pub struct NmNetworkAdapter {
    client: NmClient,
    interface: Option<String>,
    card_tag: String,
    activation_timeout: Duration,
    scan_settle: Duration,
}

impl NmNetworkAdapter {
    pub async fn connect(settings: &SyncSettings) -> Result<Self, ConnectionError> {
        let client = NmClient::new().await?;
        Ok(Self {
            client,
            interface: settings.wifi_interface.clone(),
            card_tag: settings.card_ssid_tag.clone(),
            activation_timeout: settings.activation_timeout(),
            scan_settle: settings.scan_settle(),
        })
    }

    async fn wifi_device(&self) -> Result<WifiDevice, ConnectionError> {
        self.client
            .find_wifi_device(self.interface.as_deref())
            .await?
            .ok_or(ConnectionError::NoWifiDevice)
    }
}

#[async_trait]
impl NetworkAdapter for NmNetworkAdapter {
    async fn list_card_networks(&self) -> Result<Vec<CardSsid>, ConnectionError> {
        let device = self.wifi_device().await?;

        // 刚扫描过时 NetworkManager 会拒绝新的扫描，沿用已有结果即可
        match self.client.request_wifi_scan(&device).await {
            Ok(()) => tokio::time::sleep(self.scan_settle).await,
            Err(e) => debug!("WiFi rescan not performed: {}", e),
        }

        let ssids = self.client.visible_ssids(&device).await?;
        let cards = filter_card_ssids(ssids, &self.card_tag);
        info!(
            "Found {} card network(s) on {}",
            cards.len(),
            device.interface
        );
        Ok(cards)
    }

    async fn current_active_connection(&self) -> Option<NetworkIdentity> {
        let connections = match self.client.active_connections().await {
            Ok(connections) => connections,
            Err(e) => {
                error!("Failed to query active connections: {}", e);
                return None;
            }
        };

        let active = connections
            .into_iter()
            .find(|c| c.has_device && c.connection_type != LOOPBACK_TYPE && !c.id.is_empty());

        if let Some(conn) = active {
            info!("'{}' is the current network connection", conn.id);
            Some(NetworkIdentity::new(conn.id))
        } else {
            error!("There seems to be no active network connection!");
            None
        }
    }

    async fn join(&self, ssid: &CardSsid, shared_secret: &str) -> Result<(), ConnectionError> {
        info!("Going to connect to '{}'", ssid);

        let result = async {
            let device = self.wifi_device().await?;
            let active = self
                .client
                .connect_wifi(ssid.ssid(), shared_secret, &device)
                .await?;
            self.client
                .wait_for_activation(&active.as_ref(), ssid.ssid(), self.activation_timeout)
                .await
        }
        .await;

        if let Err(e) = &result {
            error!("Error connecting to '{}': {}", ssid, e);
        }
        result
    }

    async fn reconnect(&self, identity: &NetworkIdentity) -> Result<(), ConnectionError> {
        let active = self
            .client
            .activate_connection_by_name(identity.name())
            .await?;
        self.client
            .wait_for_activation(&active.as_ref(), identity.name(), self.activation_timeout)
            .await
    }
}
