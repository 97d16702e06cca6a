//! NetworkManager D-Bus 客户端
//!
//! 通过 D-Bus 直接与 NetworkManager 守护进程通信，替代 `nmcli` 子进程调用。
//!
//! # 使用
//!
//! ```ignore
//! use cardsync_core::wifi::nm_dbus::NmClient;
//!
//! let client = NmClient::new().await?;
//!
//! // 扫描可见网络
//! let device = client.find_wifi_device(None).await?.unwrap();
//! client.request_wifi_scan(&device).await?;
//! let ssids = client.visible_ssids(&device).await?;
//!
//! // 连接到卡，再切回原来的连接
//! let active = client.connect_wifi("ez Share X100S", "88888888", &device).await?;
//! client.wait_for_activation(&active.as_ref(), "ez Share X100S", timeout).await?;
//! client.activate_connection_by_name("Home").await?;
//! ```

use std::collections::HashMap;
use std::ops::Deref;
use std::time::Duration;

use log::{debug, info};
use zbus::Connection;
use zbus::proxy;
use zbus::zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Value};

use crate::error::ConnectionError;

type Result<T> = std::result::Result<T, ConnectionError>;

/// NetworkManager 主接口代理
#[proxy(
    interface = "org.freedesktop.NetworkManager",
    default_service = "org.freedesktop.NetworkManager",
    default_path = "/org/freedesktop/NetworkManager"
)]
trait NetworkManager {
    /// 获取所有网络设备
    fn get_devices(&self) -> zbus::Result<Vec<OwnedObjectPath>>;

    /// 激活连接
    fn activate_connection(
        &self,
        connection: &ObjectPath<'_>,
        device: &ObjectPath<'_>,
        specific_object: &ObjectPath<'_>,
    ) -> zbus::Result<OwnedObjectPath>;

    /// 添加并激活连接
    fn add_and_activate_connection(
        &self,
        connection: HashMap<&str, HashMap<&str, Value<'_>>>,
        device: &ObjectPath<'_>,
        specific_object: &ObjectPath<'_>,
    ) -> zbus::Result<(OwnedObjectPath, OwnedObjectPath)>;

    /// NetworkManager 版本
    #[zbus(property)]
    fn version(&self) -> zbus::Result<String>;

    /// 活动连接列表
    #[zbus(property)]
    fn active_connections(&self) -> zbus::Result<Vec<OwnedObjectPath>>;
}

/// NetworkManager.Settings 接口代理
#[proxy(
    interface = "org.freedesktop.NetworkManager.Settings",
    default_service = "org.freedesktop.NetworkManager",
    default_path = "/org/freedesktop/NetworkManager/Settings"
)]
trait NmSettings {
    /// 列出所有连接
    fn list_connections(&self) -> zbus::Result<Vec<OwnedObjectPath>>;
}

/// NetworkManager.Settings.Connection 接口代理
#[proxy(
    interface = "org.freedesktop.NetworkManager.Settings.Connection",
    default_service = "org.freedesktop.NetworkManager"
)]
trait NmConnection {
    /// 获取连接设置
    fn get_settings(&self) -> zbus::Result<HashMap<String, HashMap<String, OwnedValue>>>;

    /// 删除连接
    fn delete(&self) -> zbus::Result<()>;
}

/// NetworkManager.Device 接口代理
#[proxy(
    interface = "org.freedesktop.NetworkManager.Device",
    default_service = "org.freedesktop.NetworkManager"
)]
trait NmDevice {
    /// 设备接口名 (如 wlan0)
    #[zbus(property)]
    fn interface(&self) -> zbus::Result<String>;

    /// 设备类型 (2=WiFi)
    #[zbus(property)]
    fn device_type(&self) -> zbus::Result<u32>;
}

/// NetworkManager.Device.Wireless 接口代理
#[proxy(
    interface = "org.freedesktop.NetworkManager.Device.Wireless",
    default_service = "org.freedesktop.NetworkManager"
)]
trait NmDeviceWireless {
    /// 触发 WiFi 扫描
    fn request_scan(&self, options: HashMap<&str, Value<'_>>) -> zbus::Result<()>;

    /// 获取所有接入点
    fn get_all_access_points(&self) -> zbus::Result<Vec<OwnedObjectPath>>;
}

/// NetworkManager.AccessPoint 接口代理
#[proxy(
    interface = "org.freedesktop.NetworkManager.AccessPoint",
    default_service = "org.freedesktop.NetworkManager"
)]
trait NmAccessPoint {
    /// SSID 原始字节
    #[zbus(property)]
    fn ssid(&self) -> zbus::Result<Vec<u8>>;
}

/// NetworkManager.Connection.Active 接口代理
#[proxy(
    interface = "org.freedesktop.NetworkManager.Connection.Active",
    default_service = "org.freedesktop.NetworkManager"
)]
trait NmActiveConnection {
    /// 连接 ID
    #[zbus(property)]
    fn id(&self) -> zbus::Result<String>;

    /// 连接类型 (802-11-wireless, loopback ...)
    #[zbus(property, name = "Type")]
    fn connection_type(&self) -> zbus::Result<String>;

    /// 连接状态
    #[zbus(property)]
    fn state(&self) -> zbus::Result<u32>;

    /// 绑定的设备
    #[zbus(property)]
    fn devices(&self) -> zbus::Result<Vec<OwnedObjectPath>>;
}

// ============================================================================
// 高层封装
// ============================================================================

/// 设备类型常量
pub mod device_type {
    pub const WIFI: u32 = 2;
}

/// 连接状态常量
pub mod active_connection_state {
    pub const UNKNOWN: u32 = 0;
    pub const ACTIVATING: u32 = 1;
    pub const ACTIVATED: u32 = 2;
    pub const DEACTIVATING: u32 = 3;
    pub const DEACTIVATED: u32 = 4;

    pub fn name(state: u32) -> &'static str {
        match state {
            UNKNOWN => "UNKNOWN",
            ACTIVATING => "ACTIVATING",
            ACTIVATED => "ACTIVATED",
            DEACTIVATING => "DEACTIVATING",
            DEACTIVATED => "DEACTIVATED",
            _ => "INVALID",
        }
    }
}

/// WiFi 设备信息
#[derive(Debug, Clone)]
pub struct WifiDevice {
    /// D-Bus 对象路径
    pub path: OwnedObjectPath,
    /// 接口名 (如 wlan0)
    pub interface: String,
}

/// 活动连接信息
#[derive(Debug, Clone)]
pub struct ActiveConnectionInfo {
    pub path: OwnedObjectPath,
    /// 连接名称（`nmcli connection` 中的 NAME）
    pub id: String,
    /// 连接类型
    pub connection_type: String,
    /// 是否绑定了设备
    pub has_device: bool,
}

/// NetworkManager D-Bus 客户端
pub struct NmClient {
    connection: Connection,
}

impl NmClient {
    /// 创建新的 NM D-Bus 客户端
    pub async fn new() -> Result<Self> {
        let connection = Connection::system().await?;

        // 验证 NetworkManager 是否可用
        let nm = NetworkManagerProxy::new(&connection).await?;
        let version = nm.version().await?;
        info!("Connected to NetworkManager {}", version);

        Ok(Self { connection })
    }

    /// 获取所有 WiFi 设备
    pub async fn get_wifi_devices(&self) -> Result<Vec<WifiDevice>> {
        let nm = NetworkManagerProxy::new(&self.connection).await?;
        let device_paths = nm.get_devices().await?;

        let mut wifi_devices = Vec::new();

        for path in device_paths {
            let device = NmDeviceProxy::builder(&self.connection)
                .path(&path)?
                .build()
                .await?;

            if device.device_type().await.unwrap_or(0) == device_type::WIFI {
                let interface = device.interface().await.unwrap_or_default();
                wifi_devices.push(WifiDevice { path, interface });
            }
        }

        Ok(wifi_devices)
    }

    /// 查找 WiFi 设备（未指定接口名时取第一个）
    pub async fn find_wifi_device(&self, interface: Option<&str>) -> Result<Option<WifiDevice>> {
        let devices = self.get_wifi_devices().await?;

        if let Some(iface) = interface {
            Ok(devices.into_iter().find(|d| d.interface == iface))
        } else {
            Ok(devices.into_iter().next())
        }
    }

    /// 触发 WiFi 扫描
    pub async fn request_wifi_scan(&self, device: &WifiDevice) -> Result<()> {
        let wireless = NmDeviceWirelessProxy::builder(&self.connection)
            .path(&device.path)?
            .build()
            .await?;

        wireless.request_scan(HashMap::new()).await?;
        Ok(())
    }

    /// 列出设备可见的 SSID（按 NetworkManager 报告的顺序）
    pub async fn visible_ssids(&self, device: &WifiDevice) -> Result<Vec<String>> {
        let wireless = NmDeviceWirelessProxy::builder(&self.connection)
            .path(&device.path)?
            .build()
            .await?;

        let mut ssids = Vec::new();
        for ap_path in wireless.get_all_access_points().await? {
            let ap = NmAccessPointProxy::builder(&self.connection)
                .path(&ap_path)?
                .build()
                .await?;

            // 接入点可能在扫描过程中消失
            if let Ok(raw) = ap.ssid().await
                && !raw.is_empty()
            {
                ssids.push(String::from_utf8_lossy(&raw).into_owned());
            }
        }

        debug!("{} visible access points", ssids.len());
        Ok(ssids)
    }

    /// 列出活动连接
    pub async fn active_connections(&self) -> Result<Vec<ActiveConnectionInfo>> {
        let nm = NetworkManagerProxy::new(&self.connection).await?;

        let mut result = Vec::new();
        for path in nm.active_connections().await? {
            let active = NmActiveConnectionProxy::builder(&self.connection)
                .path(&path)?
                .build()
                .await?;

            let id = active.id().await.unwrap_or_default();
            let connection_type = active.connection_type().await.unwrap_or_default();
            let has_device = active
                .devices()
                .await
                .map(|d| !d.is_empty())
                .unwrap_or(false);

            result.push(ActiveConnectionInfo {
                path,
                id,
                connection_type,
                has_device,
            });
        }

        Ok(result)
    }

    /// 创建 WiFi 客户端连接并立即激活（相当于 `nmcli device wifi connect`）
    ///
    /// 返回活动连接路径
    pub async fn connect_wifi(
        &self,
        ssid: &str,
        password: &str,
        device: &WifiDevice,
    ) -> Result<OwnedObjectPath> {
        // 先删除可能存在的旧连接
        if self.delete_connection_by_name(ssid).await? {
            debug!("Removed stale connection profile '{}'", ssid);
        }

        let nm = NetworkManagerProxy::new(&self.connection).await?;
        let settings = build_wifi_client_settings(ssid, password, &device.interface);

        let (conn_path, active_conn) = nm
            .add_and_activate_connection(
                settings,
                &device.path.as_ref(),
                &ObjectPath::from_static_str_unchecked("/"),
            )
            .await?;

        debug!(
            "Created connection {:?}, activating as {:?}",
            conn_path, active_conn
        );
        Ok(active_conn)
    }

    /// 按名称激活已保存的连接（相当于 `nmcli connection up <name>`）
    ///
    /// 返回活动连接路径
    pub async fn activate_connection_by_name(&self, name: &str) -> Result<OwnedObjectPath> {
        let conn_path = self
            .find_connection_by_name(name)
            .await?
            .ok_or_else(|| ConnectionError::UnknownConnection(name.to_string()))?;

        let nm = NetworkManagerProxy::new(&self.connection).await?;
        let root = ObjectPath::from_static_str_unchecked("/");
        let active_conn = nm
            .activate_connection(&conn_path.as_ref(), &root, &root)
            .await?;

        info!("Activating connection '{}': {:?}", name, active_conn);
        Ok(active_conn)
    }

    /// 按名称查找已保存的连接
    pub async fn find_connection_by_name(&self, name: &str) -> Result<Option<OwnedObjectPath>> {
        let settings = NmSettingsProxy::new(&self.connection).await?;

        for conn_path in settings.list_connections().await? {
            let conn = NmConnectionProxy::builder(&self.connection)
                .path(&conn_path)?
                .build()
                .await?;

            if let Ok(conn_settings) = conn.get_settings().await
                && connection_id(&conn_settings).is_some_and(|id| id == name)
            {
                return Ok(Some(conn_path));
            }
        }

        Ok(None)
    }

    /// 删除连接（通过名称）
    pub async fn delete_connection_by_name(&self, name: &str) -> Result<bool> {
        let Some(conn_path) = self.find_connection_by_name(name).await? else {
            return Ok(false);
        };

        let conn = NmConnectionProxy::builder(&self.connection)
            .path(&conn_path)?
            .build()
            .await?;
        conn.delete().await?;
        debug!("Deleted connection by name: {}", name);
        Ok(true)
    }

    /// 等待连接激活
    pub async fn wait_for_activation(
        &self,
        active_connection: &ObjectPath<'_>,
        name: &str,
        timeout: Duration,
    ) -> Result<()> {
        let start = std::time::Instant::now();
        let mut last_state = 0u32;

        loop {
            if start.elapsed() > timeout {
                return Err(ConnectionError::ActivationTimeout {
                    name: name.to_string(),
                });
            }

            let active = NmActiveConnectionProxy::builder(&self.connection)
                .path(active_connection)?
                .build()
                .await?;

            let state = active.state().await.unwrap_or(0);

            // 状态变化时记录日志
            if state != last_state {
                debug!(
                    "Connection '{}' state changed: {} -> {}",
                    name,
                    active_connection_state::name(last_state),
                    active_connection_state::name(state)
                );
                last_state = state;
            }

            match state {
                active_connection_state::ACTIVATED => {
                    info!("Connected to '{}'", name);
                    return Ok(());
                }
                active_connection_state::DEACTIVATED | active_connection_state::DEACTIVATING => {
                    return Err(ConnectionError::ActivationFailed {
                        name: name.to_string(),
                        state: active_connection_state::name(state),
                    });
                }
                _ => {
                    // UNKNOWN, ACTIVATING - 继续等待
                }
            }

            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
}

/// 从连接设置中取出 `connection.id`
fn connection_id(settings: &HashMap<String, HashMap<String, OwnedValue>>) -> Option<&str> {
    let id_value = settings.get("connection")?.get("id")?;
    match id_value.deref() {
        Value::Str(id) => Some(id.as_str()),
        _ => None,
    }
}

/// 构建 WiFi 客户端连接设置
fn build_wifi_client_settings<'a>(
    ssid: &'a str,
    password: &'a str,
    interface: &'a str,
) -> HashMap<&'static str, HashMap<&'static str, Value<'a>>> {
    let mut settings: HashMap<&str, HashMap<&str, Value>> = HashMap::new();

    // connection 部分（id 与 SSID 相同，和 nmcli 的行为一致）
    let mut connection: HashMap<&str, Value> = HashMap::new();
    connection.insert("id", Value::from(ssid));
    connection.insert("type", Value::from("802-11-wireless"));
    connection.insert("autoconnect", Value::Bool(false));
    if !interface.is_empty() {
        connection.insert("interface-name", Value::from(interface));
    }
    settings.insert("connection", connection);

    // 802-11-wireless 部分
    let mut wireless: HashMap<&str, Value> = HashMap::new();
    wireless.insert("ssid", Value::Array(ssid.as_bytes().into()));
    wireless.insert("mode", Value::from("infrastructure"));
    settings.insert("802-11-wireless", wireless);

    // 802-11-wireless-security 部分
    let mut wireless_security: HashMap<&str, Value> = HashMap::new();
    wireless_security.insert("key-mgmt", Value::from("wpa-psk"));
    wireless_security.insert("psk", Value::from(password));
    settings.insert("802-11-wireless-security", wireless_security);

    // ipv4 部分
    let mut ipv4: HashMap<&str, Value> = HashMap::new();
    ipv4.insert("method", Value::from("auto"));
    settings.insert("ipv4", ipv4);

    // ipv6 部分（卡只提供 IPv4）
    let mut ipv6: HashMap<&str, Value> = HashMap::new();
    ipv6.insert("method", Value::from("ignore"));
    settings.insert("ipv6", ipv6);

    settings
}
