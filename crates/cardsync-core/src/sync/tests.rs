use super::*;
use crate::error::{FetchError, ListingError};
use crate::wifi::filter_card_ssids;
use async_trait::async_trait;
use reqwest::Url;
use std::collections::HashMap;
use std::sync::Mutex;
use tempfile::TempDir;

const TAG: &str = "ez Share";

#[derive(Debug, Clone, PartialEq, Eq)]
enum NetEvent {
    QueryActive,
    ListCards,
    Join(String),
    Reconnect(String),
}

/// 网络状态：加入卡后活动连接变成卡，重连后变回原网络
#[derive(Default)]
struct NetState {
    visible: Vec<String>,
    discovery_fails: bool,
    failing_joins: Vec<String>,
    reconnect_fails: bool,
    active: Mutex<Option<String>>,
    events: Mutex<Vec<NetEvent>>,
}

#[derive(Clone)]
struct FakeNetwork(Arc<NetState>);

impl FakeNetwork {
    fn new(home: Option<&str>, visible: &[&str], state: NetState) -> Self {
        *state.active.lock().unwrap() = home.map(str::to_string);
        Self(Arc::new(NetState {
            visible: visible.iter().map(|s| (*s).to_string()).collect(),
            ..state
        }))
    }

    fn events(&self) -> Vec<NetEvent> {
        self.0.events.lock().unwrap().clone()
    }

    fn joins(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, NetEvent::Join(_)))
            .count()
    }

    fn reconnects(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                NetEvent::Reconnect(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: NetEvent) {
        self.0.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl NetworkAdapter for FakeNetwork {
    async fn list_card_networks(&self) -> Result<Vec<CardSsid>, ConnectionError> {
        self.push(NetEvent::ListCards);
        if self.0.discovery_fails {
            return Err(ConnectionError::NoWifiDevice);
        }
        Ok(filter_card_ssids(&self.0.visible, TAG))
    }

    async fn current_active_connection(&self) -> Option<NetworkIdentity> {
        self.push(NetEvent::QueryActive);
        self.0
            .active
            .lock()
            .unwrap()
            .clone()
            .map(NetworkIdentity::new)
    }

    async fn join(&self, ssid: &CardSsid, _shared_secret: &str) -> Result<(), ConnectionError> {
        self.push(NetEvent::Join(ssid.ssid().to_string()));
        if self.0.failing_joins.iter().any(|s| s == ssid.ssid()) {
            return Err(ConnectionError::ActivationTimeout {
                name: ssid.ssid().to_string(),
            });
        }
        *self.0.active.lock().unwrap() = Some(ssid.ssid().to_string());
        Ok(())
    }

    async fn reconnect(&self, identity: &NetworkIdentity) -> Result<(), ConnectionError> {
        self.push(NetEvent::Reconnect(identity.name().to_string()));
        if self.0.reconnect_fails {
            return Err(ConnectionError::UnknownConnection(identity.name().to_string()));
        }
        *self.0.active.lock().unwrap() = Some(identity.name().to_string());
        Ok(())
    }
}

/// 固定目录页和文件内容的卡
struct FakeCard {
    base: Url,
    pages: HashMap<String, String>,
    files: HashMap<String, Vec<u8>>,
    downloads: Mutex<Vec<String>>,
}

impl FakeCard {
    /// 根目录下一个文件，`100CANON` 子目录下一个文件
    fn sample() -> Arc<Self> {
        let pages = HashMap::from([
            (
                "A:".to_string(),
                r#"<a href="dir?dir=A:"> .</a>
                   <a href="dir?dir=A:%5C100CANON"> 100CANON</a>
                   <a href="download?file=IMG_0001.JPG"> IMG_0001.JPG</a>"#
                    .to_string(),
            ),
            (
                "A:\\100CANON".to_string(),
                r#"<a href="dir?dir=A:"> ..</a>
                   <a href="download?file=100CANON%5CIMG_0002.JPG"> IMG_0002.JPG</a>"#
                    .to_string(),
            ),
        ]);
        let files = HashMap::from([
            ("IMG_0001.JPG".to_string(), b"first".to_vec()),
            ("100CANON\\IMG_0002.JPG".to_string(), b"second".to_vec()),
        ]);
        Self::new(pages, files)
    }

    fn new(pages: HashMap<String, String>, files: HashMap<String, Vec<u8>>) -> Arc<Self> {
        Arc::new(Self {
            base: Url::parse("http://ezshare.card/").unwrap(),
            pages,
            files,
            downloads: Mutex::new(Vec::new()),
        })
    }

    fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }
}

#[async_trait]
impl CardClient for FakeCard {
    fn base_url(&self) -> &Url {
        &self.base
    }

    async fn list_directory(&self, path: &CardPath) -> Result<String, ListingError> {
        let key = path.to_string();
        self.pages.get(&key).cloned().ok_or(ListingError::Status {
            path: key,
            status: 404,
        })
    }

    async fn download(&self, remote_file: &str) -> Result<Vec<u8>, FetchError> {
        self.downloads.lock().unwrap().push(remote_file.to_string());
        self.files
            .get(remote_file)
            .cloned()
            .ok_or(FetchError::Status(500))
    }
}

fn settings(dest: &TempDir) -> SyncSettings {
    SyncSettings {
        destination: dest.path().to_path_buf(),
        max_attempts: 3,
        ..SyncSettings::default()
    }
}

fn orchestrator(
    network: &FakeNetwork,
    card: &Arc<FakeCard>,
    dest: &TempDir,
) -> SyncOrchestrator<FakeNetwork, FakeCard> {
    SyncOrchestrator::new(network.clone(), card.clone(), &settings(dest))
}

#[tokio::test(start_paused = true)]
async fn test_once_mirrors_card_into_suffix_directory() {
    let dest = TempDir::new().unwrap();
    let network = FakeNetwork::new(
        Some("HomeWifi"),
        &["HomeWifi", "ez Share X100S"],
        NetState::default(),
    );
    let card = FakeCard::sample();
    let mut sync = orchestrator(&network, &card, &dest);

    let report = sync
        .run_until(SyncMode::Once, std::future::pending())
        .await
        .unwrap();

    let root = dest.path().join("X100S");
    assert_eq!(std::fs::read(root.join("IMG_0001.JPG")).unwrap(), b"first");
    assert_eq!(
        std::fs::read(root.join("100CANON").join("IMG_0002.JPG")).unwrap(),
        b"second"
    );

    assert_eq!(
        network.events(),
        [
            NetEvent::QueryActive,
            NetEvent::ListCards,
            NetEvent::Join("ez Share X100S".into()),
            NetEvent::Reconnect("HomeWifi".into()),
        ]
    );

    assert_eq!(report.cards.len(), 1);
    assert_eq!(report.cards[0].destination, root);
    assert_eq!(
        report.cards[0].status,
        CardStatus::Completed(FileTally {
            downloaded: 2,
            already_present: 0,
            failed: 0,
        })
    );
    assert_eq!(sync.home(), Some(&NetworkIdentity::new("HomeWifi")));
}

#[tokio::test(start_paused = true)]
async fn test_second_run_downloads_nothing() {
    let dest = TempDir::new().unwrap();
    let network = FakeNetwork::new(Some("HomeWifi"), &["ez Share X100S"], NetState::default());
    let card = FakeCard::sample();
    let mut sync = orchestrator(&network, &card, &dest);

    sync.run_until(SyncMode::Once, std::future::pending())
        .await
        .unwrap();
    assert_eq!(card.download_count(), 2);

    let report = sync
        .run_until(SyncMode::Once, std::future::pending())
        .await
        .unwrap();
    assert_eq!(card.download_count(), 2);
    assert_eq!(report.totals().already_present, 2);
    assert_eq!(report.totals().downloaded, 0);
}

#[tokio::test(start_paused = true)]
async fn test_join_failure_still_rejoins_once() {
    let dest = TempDir::new().unwrap();
    let network = FakeNetwork::new(
        Some("HomeWifi"),
        &["ez Share X100S"],
        NetState {
            failing_joins: vec!["ez Share X100S".into()],
            ..NetState::default()
        },
    );
    let card = FakeCard::sample();
    let mut sync = orchestrator(&network, &card, &dest);

    let report = sync
        .run_until(SyncMode::Once, std::future::pending())
        .await
        .unwrap();

    assert_eq!(network.reconnects(), ["HomeWifi"]);
    assert_eq!(card.download_count(), 0);
    assert!(matches!(report.cards[0].status, CardStatus::JoinFailed(_)));
    assert!(report.has_failures());
}

#[tokio::test(start_paused = true)]
async fn test_listing_failure_still_rejoins_once() {
    let dest = TempDir::new().unwrap();
    let network = FakeNetwork::new(Some("HomeWifi"), &["ez Share X100S"], NetState::default());
    let card = FakeCard::new(HashMap::new(), HashMap::new());
    let mut sync = orchestrator(&network, &card, &dest);

    let report = sync
        .run_until(SyncMode::Once, std::future::pending())
        .await
        .unwrap();

    assert_eq!(network.reconnects(), ["HomeWifi"]);
    assert!(matches!(
        report.cards[0].status,
        CardStatus::ListingFailed(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_download_failure_still_rejoins_once() {
    let dest = TempDir::new().unwrap();
    let network = FakeNetwork::new(Some("HomeWifi"), &["ez Share X100S"], NetState::default());
    let pages = HashMap::from([(
        "A:".to_string(),
        r#"<a href="download?file=BROKEN.JPG"> BROKEN.JPG</a>"#.to_string(),
    )]);
    let card = FakeCard::new(pages, HashMap::new());
    let mut sync = orchestrator(&network, &card, &dest);

    let report = sync
        .run_until(SyncMode::Once, std::future::pending())
        .await
        .unwrap();

    assert_eq!(network.reconnects(), ["HomeWifi"]);
    assert_eq!(card.download_count(), 3);
    assert_eq!(
        report.cards[0].status,
        CardStatus::Completed(FileTally {
            downloaded: 0,
            already_present: 0,
            failed: 1,
        })
    );
    assert!(!dest.path().join("X100S").join("BROKEN.JPG").exists());
    assert!(!dest.path().join("X100S").join("BROKEN.JPG.part").exists());
}

#[tokio::test(start_paused = true)]
async fn test_failed_card_does_not_stop_the_pass() {
    let dest = TempDir::new().unwrap();
    let network = FakeNetwork::new(
        Some("HomeWifi"),
        &["ez Share GR3", "ez Share X100S"],
        NetState {
            failing_joins: vec!["ez Share GR3".into()],
            ..NetState::default()
        },
    );
    let card = FakeCard::sample();
    let mut sync = orchestrator(&network, &card, &dest);

    let report = sync
        .run_until(SyncMode::Once, std::future::pending())
        .await
        .unwrap();

    assert_eq!(network.joins(), 2);
    assert_eq!(network.reconnects(), ["HomeWifi", "HomeWifi"]);
    assert_eq!(report.cards.len(), 2);
    assert!(!report.cards[0].status.is_completed());
    assert!(report.cards[1].status.is_completed());
    assert!(dest.path().join("GR3").is_dir());
    assert!(dest.path().join("X100S").join("IMG_0001.JPG").is_file());
}

#[tokio::test(start_paused = true)]
async fn test_discovery_failure_in_once_mode_is_an_error() {
    let dest = TempDir::new().unwrap();
    let network = FakeNetwork::new(
        Some("HomeWifi"),
        &[],
        NetState {
            discovery_fails: true,
            ..NetState::default()
        },
    );
    let card = FakeCard::sample();
    let mut sync = orchestrator(&network, &card, &dest);

    let result = sync.run_until(SyncMode::Once, std::future::pending()).await;

    assert!(matches!(result, Err(ConnectionError::NoWifiDevice)));
    assert_eq!(network.reconnects(), ["HomeWifi"]);
    assert_eq!(network.joins(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_cards_visible() {
    let dest = TempDir::new().unwrap();
    let network = FakeNetwork::new(Some("HomeWifi"), &["HomeWifi"], NetState::default());
    let card = FakeCard::sample();
    let mut sync = orchestrator(&network, &card, &dest);

    let report = sync
        .run_until(SyncMode::Once, std::future::pending())
        .await
        .unwrap();

    assert!(report.cards.is_empty());
    assert_eq!(network.joins(), 0);
    assert!(network.reconnects().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_home_skips_rejoin() {
    let dest = TempDir::new().unwrap();
    let network = FakeNetwork::new(None, &["ez Share X100S"], NetState::default());
    let card = FakeCard::sample();
    let mut sync = orchestrator(&network, &card, &dest);

    let report = sync
        .run_until(SyncMode::Once, std::future::pending())
        .await
        .unwrap();

    assert!(report.cards[0].status.is_completed());
    assert!(network.reconnects().is_empty());
    assert!(sync.home().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_no_wifi_mode_never_touches_the_network() {
    let dest = TempDir::new().unwrap();
    let network = FakeNetwork::new(Some("HomeWifi"), &["ez Share X100S"], NetState::default());
    let card = FakeCard::sample();
    let mut sync = orchestrator(&network, &card, &dest);

    let report = sync
        .run_until(SyncMode::NoWifi, std::future::pending())
        .await
        .unwrap();

    assert!(network.events().is_empty());
    assert!(dest.path().join("IMG_0001.JPG").is_file());
    assert!(dest.path().join("100CANON").join("IMG_0002.JPG").is_file());
    assert_eq!(report.cards[0].card, None);
    assert_eq!(report.totals().downloaded, 2);
}

#[tokio::test(start_paused = true)]
async fn test_poll_repeats_until_shutdown() {
    let dest = TempDir::new().unwrap();
    let network = FakeNetwork::new(Some("HomeWifi"), &["ez Share X100S"], NetState::default());
    let card = FakeCard::sample();
    let mut sync = orchestrator(&network, &card, &dest);

    // 每轮 10s 卡间暂停 + 600s 轮询间隔：0s、610s、1220s 各一轮
    let shutdown = tokio::time::sleep(Duration::from_secs(1300));
    let report = sync.run_until(SyncMode::Poll, shutdown).await.unwrap();

    assert_eq!(network.joins(), 3);
    // 每张卡一次，外加退出时一次
    assert_eq!(network.reconnects().len(), 4);
    assert_eq!(report.cards.len(), 3);
    assert_eq!(report.totals().downloaded, 2);
    assert_eq!(report.totals().already_present, 4);
    assert_eq!(card.download_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_poll_keeps_discovering_after_errors() {
    let dest = TempDir::new().unwrap();
    let network = FakeNetwork::new(
        Some("HomeWifi"),
        &[],
        NetState {
            discovery_fails: true,
            ..NetState::default()
        },
    );
    let card = FakeCard::sample();
    let mut sync = orchestrator(&network, &card, &dest);

    let shutdown = tokio::time::sleep(Duration::from_secs(1500));
    let report = sync.run_until(SyncMode::Poll, shutdown).await.unwrap();

    let discoveries = network
        .events()
        .iter()
        .filter(|e| **e == NetEvent::ListCards)
        .count();
    assert_eq!(discoveries, 3);
    assert!(report.cards.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_starting_on_card_network_leaves_home_unknown() {
    let dest = TempDir::new().unwrap();
    // 上次运行中断后主机仍连在卡上
    let network = FakeNetwork::new(
        Some("ez Share X100S"),
        &["ez Share X100S"],
        NetState::default(),
    );
    let card = FakeCard::sample();
    let mut sync = orchestrator(&network, &card, &dest);

    let report = sync
        .run_until(SyncMode::Once, std::future::pending())
        .await
        .unwrap();

    assert!(report.cards[0].status.is_completed());
    assert!(sync.home().is_none());
    assert!(network.reconnects().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_poll_never_adopts_card_as_home() {
    let dest = TempDir::new().unwrap();
    // 重连失败时活动连接停留在卡上
    let network = FakeNetwork::new(
        Some("HomeWifi"),
        &["ez Share X100S"],
        NetState {
            reconnect_fails: true,
            ..NetState::default()
        },
    );
    let card = FakeCard::sample();
    let mut sync = orchestrator(&network, &card, &dest);

    let shutdown = tokio::time::sleep(Duration::from_secs(700));
    sync.run_until(SyncMode::Poll, shutdown).await.unwrap();

    assert_eq!(network.joins(), 2);
    assert!(network.reconnects().iter().all(|name| name == "HomeWifi"));
    assert_eq!(sync.home(), Some(&NetworkIdentity::new("HomeWifi")));
}

#[tokio::test(start_paused = true)]
async fn test_poll_follows_home_network_changes() {
    let dest = TempDir::new().unwrap();
    let network = FakeNetwork::new(Some("HomeWifi"), &["ez Share X100S"], NetState::default());
    let card = FakeCard::sample();
    let mut sync = orchestrator(&network, &card, &dest);

    // 300s 时用户切换到另一个网络，700s 时退出
    let shutdown = {
        let network = network.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(300)).await;
            *network.0.active.lock().unwrap() = Some("OfficeWifi".into());
            tokio::time::sleep(Duration::from_secs(400)).await;
        }
    };
    sync.run_until(SyncMode::Poll, shutdown).await.unwrap();

    assert_eq!(network.reconnects(), ["HomeWifi", "OfficeWifi", "OfficeWifi"]);
    assert_eq!(sync.home(), Some(&NetworkIdentity::new("OfficeWifi")));
}

#[tokio::test(start_paused = true)]
async fn test_list_cards_only_discovers() {
    let dest = TempDir::new().unwrap();
    let network = FakeNetwork::new(
        Some("HomeWifi"),
        &["HomeWifi", "ez Share X100S", "ez Share GR3"],
        NetState::default(),
    );
    let card = FakeCard::sample();
    let sync = orchestrator(&network, &card, &dest);

    let cards = sync.list_cards().await.unwrap();
    let suffixes: Vec<&str> = cards.iter().map(CardSsid::suffix).collect();

    assert_eq!(suffixes, ["X100S", "GR3"]);
    assert_eq!(network.events(), [NetEvent::ListCards]);
    assert_eq!(card.download_count(), 0);
}
