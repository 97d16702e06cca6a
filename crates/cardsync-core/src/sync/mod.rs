//! 同步编排
//!
//! 一个状态机，按 [`SyncMode`] 决定是否切换网络、是否循环：
//!
//! ```text
//! Idle → DiscoverHome → DiscoverCards → { Join → Crawl → FetchAll → Rejoin }* → (循环或结束)
//! ```
//!
//! 所有步骤严格串行执行。凡是加入过卡网络的路径（成功或失败）都会恰好恢复一次家庭网络。

pub mod report;

#[cfg(test)]
mod tests;

pub use report::{CardReport, CardStatus, FileTally, SyncReport};

use log::{debug, error, info, warn};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::card::{CardClient, CardPath, CatalogEntry};
use crate::catalog::Crawler;
use crate::config::SyncSettings;
use crate::error::ConnectionError;
use crate::fetch::{Fetcher, RetryPolicy};
use crate::wifi::{CardSsid, NetworkAdapter, NetworkIdentity};

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// 不切换网络，假定已经连在卡上
    NoWifi,
    /// 处理当前可见的所有卡一次
    Once,
    /// 无限轮询
    Poll,
}

impl SyncMode {
    fn switches_network(self) -> bool {
        !matches!(self, SyncMode::NoWifi)
    }
}

/// 编排器使用的参数
#[derive(Debug, Clone)]
struct SyncOptions {
    destination: PathBuf,
    card_root: CardPath,
    card_tag: String,
    shared_secret: String,
    poll_interval: Duration,
    card_pause: Duration,
}

/// 同步编排器
///
/// 独占“当前目标目录”和“当前加入的网络”两项状态。
pub struct SyncOrchestrator<N, C> {
    network: N,
    crawler: Crawler<C>,
    fetcher: Fetcher<C>,
    options: SyncOptions,
    home: Option<NetworkIdentity>,
    report: SyncReport,
}

impl<N: NetworkAdapter, C: CardClient> SyncOrchestrator<N, C> {
    pub fn new(network: N, client: Arc<C>, settings: &SyncSettings) -> Self {
        Self {
            network,
            crawler: Crawler::new(client.clone(), settings.max_crawl_depth),
            fetcher: Fetcher::new(client, RetryPolicy::from_settings(settings)),
            options: SyncOptions {
                destination: settings.destination.clone(),
                card_root: CardPath::parse(&settings.card_root),
                card_tag: settings.card_ssid_tag.clone(),
                shared_secret: settings.card_password.clone(),
                poll_interval: settings.poll_interval(),
                card_pause: settings.card_pause(),
            },
            home: None,
            report: SyncReport::default(),
        }
    }

    /// 最近一次捕获的家庭网络
    pub fn home(&self) -> Option<&NetworkIdentity> {
        self.home.as_ref()
    }

    /// 仅列出可见的卡网络，不做任何切换
    pub async fn list_cards(&self) -> Result<Vec<CardSsid>, ConnectionError> {
        self.network.list_card_networks().await
    }

    /// 运行直到完成或 `shutdown` 触发
    ///
    /// `shutdown` 触发时尽力恢复家庭网络，然后返回已经收集到的结果。
    pub async fn run_until<F>(
        &mut self,
        mode: SyncMode,
        shutdown: F,
    ) -> Result<SyncReport, ConnectionError>
    where
        F: Future<Output = ()>,
    {
        let finished = tokio::select! {
            result = self.run(mode) => Some(result),
            () = shutdown => None,
        };

        match finished {
            Some(result) => {
                result?;
            }
            None => {
                info!("Interrupted, shutting down");
                if mode.switches_network() {
                    self.restore_home().await;
                }
            }
        }

        Ok(std::mem::take(&mut self.report))
    }

    /// 按模式运行；`Poll` 模式永不返回
    pub async fn run(&mut self, mode: SyncMode) -> Result<(), ConnectionError> {
        if !mode.switches_network() {
            self.run_without_network_switching().await;
            return Ok(());
        }

        self.home = None;
        self.refresh_home().await;

        loop {
            if let Err(e) = self.run_pass(mode).await {
                error!("Card discovery failed: {}", e);
                self.restore_home().await;
                if mode == SyncMode::Once {
                    return Err(e);
                }
            }

            if mode == SyncMode::Once {
                return Ok(());
            }

            debug!("Sleeping {:?} before next discovery", self.options.poll_interval);
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    /// 对当前可见的卡各处理一遍
    async fn run_pass(&mut self, mode: SyncMode) -> Result<(), ConnectionError> {
        let cards = self.network.list_card_networks().await?;
        if cards.is_empty() {
            info!("No card networks visible");
            return Ok(());
        }

        for card in cards {
            let completed = self.process_card(&card, mode).await;
            if mode == SyncMode::Poll && completed {
                debug!("Sleeping {:?} after '{}'", self.options.card_pause, card);
                tokio::time::sleep(self.options.card_pause).await;
            }
        }
        Ok(())
    }

    /// 单张卡的完整周期：加入 → 爬取 → 下载 → 恢复
    async fn process_card(&mut self, card: &CardSsid, mode: SyncMode) -> bool {
        let destination = self.options.destination.join(card.suffix());
        if let Err(e) = tokio::fs::create_dir_all(&destination).await {
            error!(
                "Cannot create destination '{}' for '{}': {}",
                destination.display(),
                card,
                e
            );
            self.record(Some(card), destination, CardStatus::DestinationFailed(e.to_string()));
            return false;
        }

        if mode == SyncMode::Poll {
            self.refresh_home().await;
        }

        info!("Connecting to SSID: {}", card);
        info!("Downloading to: {}", destination.display());

        let status = match self.network.join(card, &self.options.shared_secret).await {
            Err(e) => CardStatus::JoinFailed(e.to_string()),
            Ok(()) => self.sync_catalog(&destination).await,
        };

        self.restore_home().await;

        if !status.is_completed() {
            error!("There's a problem processing '{}': {}", card, status);
        }
        let completed = status.is_completed();
        self.record(Some(card), destination, status);
        completed
    }

    /// 不切换网络，直接同步到目标根目录
    async fn run_without_network_switching(&mut self) {
        let destination = self.options.destination.clone();
        let status = match tokio::fs::create_dir_all(&destination).await {
            Ok(()) => self.sync_catalog(&destination).await,
            Err(e) => CardStatus::DestinationFailed(e.to_string()),
        };

        if !status.is_completed() {
            error!("There's a problem processing the card: {}", status);
        }
        self.record(None, destination, status);
    }

    /// 爬取目录并下载所有条目
    async fn sync_catalog(&self, destination: &Path) -> CardStatus {
        match self.crawler.crawl(&self.options.card_root).await {
            Ok(entries) => CardStatus::Completed(self.fetch_all(destination, &entries).await),
            Err(e) => CardStatus::ListingFailed(e.to_string()),
        }
    }

    async fn fetch_all(&self, destination: &Path, entries: &[CatalogEntry]) -> FileTally {
        let mut tally = FileTally::default();
        for entry in entries {
            let outcome = self.fetcher.fetch(destination, entry).await;
            tally.record(&outcome);
        }
        info!("{}: {}", destination.display(), tally);
        tally
    }

    /// 捕获当前活动连接作为家庭网络
    ///
    /// 启动时和每次加入卡之前调用；卡网络不会被记为家庭网络。
    async fn refresh_home(&mut self) {
        if let Some(current) = self.network.current_active_connection().await {
            if CardSsid::parse(current.name(), &self.options.card_tag).is_some() {
                warn!(
                    "Active connection '{}' is a card network, keeping previous home network",
                    current
                );
            } else {
                self.home = Some(current);
            }
        }
    }

    async fn restore_home(&self) {
        match &self.home {
            Some(home) => self.network.rejoin(home).await,
            None => warn!("No home network known, leaving the current connection as is"),
        }
    }

    fn record(&mut self, card: Option<&CardSsid>, destination: PathBuf, status: CardStatus) {
        self.report.cards.push(CardReport {
            card: card.cloned(),
            destination,
            status,
        });
    }
}
