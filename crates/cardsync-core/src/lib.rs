//! Cardsync Core Library
//!
//! 把 ez Share WiFi SD 卡上的文件镜像到本地目录
//!
//! # 模块
//!
//! - **wifi**: 通过 NetworkManager 发现、加入卡网络并恢复家庭网络
//! - **card**: 卡上路径模型和 HTTP 客户端
//! - **catalog**: 递归爬取卡的目录页
//! - **fetch**: 带指数退避重试的单文件下载
//! - **sync**: 串联以上步骤的编排器
//! - **config**: `settings.toml` 配置
//!
//! # 使用示例
//!
//! ```ignore
//! use cardsync_core::{HttpCardClient, NmNetworkAdapter, SyncMode, SyncOrchestrator, SyncSettings};
//!
//! let settings = SyncSettings::load();
//! let client = Arc::new(HttpCardClient::from_settings(&settings)?);
//! let network = NmNetworkAdapter::connect(&settings).await?;
//!
//! let mut sync = SyncOrchestrator::new(network, client, &settings);
//! let report = sync.run_until(SyncMode::Once, std::future::pending()).await?;
//! println!("{}", report.totals());
//! ```

pub mod card;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod sync;
pub mod wifi;

// Card re-exports
pub use card::{CardClient, CardPath, CatalogEntry, HttpCardClient};

// Catalog re-exports
pub use catalog::Crawler;

// Config re-exports
pub use config::SyncSettings;

// Error re-exports
pub use error::{ConfigError, ConnectionError, FetchError, ListingError};

// Fetch re-exports
pub use fetch::{FetchOutcome, Fetcher, RetryPolicy};

// Sync re-exports
pub use sync::{CardReport, CardStatus, FileTally, SyncMode, SyncOrchestrator, SyncReport};

// WiFi re-exports
pub use wifi::{CardSsid, NetworkAdapter, NetworkIdentity, NmNetworkAdapter, NoNetwork};
