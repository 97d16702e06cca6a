//! 文件下载
//!
//! 卡上的 HTTP 服务器很不稳定，下载需要有限次重试和指数退避。
//! 本地已存在的文件视为已同步，直接跳过，因此重复运行会逐步收敛。

use log::{debug, error, info, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;

use crate::card::{CardClient, CatalogEntry};
use crate::config::SyncSettings;
use crate::error::FetchError;

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大尝试次数（含第一次）
    pub max_attempts: u32,
    /// 第一次失败后的等待时间，之后每次翻倍
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            initial_backoff: settings.initial_backoff(),
        }
    }

    /// 第 `attempt` 次失败后的等待时间，溢出时停在上限
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }
}

/// 单个文件的下载结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 本次下载完成
    Downloaded,
    /// 本地已存在，未发起网络请求
    AlreadyPresent,
    /// 放弃，附带原因
    Failed(String),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, FetchOutcome::Failed(_))
    }
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchOutcome::Downloaded => write!(f, "downloaded"),
            FetchOutcome::AlreadyPresent => write!(f, "already present"),
            FetchOutcome::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// 计算条目在本地的保存路径
///
/// 卡目录的相对部分映射为本地子目录；空组件、`.`、`..` 以及含 `/` 的组件被拒绝，
/// 以免卡端数据把文件写到目标目录之外。
pub fn local_path(destination: &Path, entry: &CatalogEntry) -> Result<PathBuf, FetchError> {
    let mut path = destination.to_path_buf();
    for component in entry
        .directory
        .components()
        .iter()
        .chain(std::iter::once(&entry.file_name))
    {
        if component.is_empty()
            || component == "."
            || component == ".."
            || component.contains('/')
            || component.contains('\0')
        {
            return Err(FetchError::InvalidPath(component.clone()));
        }
        path.push(component);
    }
    Ok(path)
}

/// 带重试的文件下载器
pub struct Fetcher<C> {
    client: Arc<C>,
    policy: RetryPolicy,
}

impl<C: CardClient> Fetcher<C> {
    pub fn new(client: Arc<C>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// 下载一个条目到 `destination` 下
    ///
    /// 不返回错误：所有失败都记录日志并以 [`FetchOutcome::Failed`] 报告。
    pub async fn fetch(&self, destination: &Path, entry: &CatalogEntry) -> FetchOutcome {
        info!("Going to download {}", entry);

        let target = match self.prepare(destination, entry).await {
            Ok(Some(target)) => target,
            Ok(None) => {
                info!(" - Already downloaded - skip");
                return FetchOutcome::AlreadyPresent;
            }
            Err(e) => {
                error!("Error preparing download of '{}': {}", entry, e);
                return FetchOutcome::Failed(e.to_string());
            }
        };
        info!(" - Destination: {}", target.display());

        let remote = entry.remote_file();
        let mut last_error = String::from("no attempts made");

        for attempt in 1..=self.policy.max_attempts {
            match self.attempt(&remote, &target).await {
                Ok(bytes) => {
                    info!("Downloaded '{}' ({} bytes)", target.display(), bytes);
                    return FetchOutcome::Downloaded;
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt == self.policy.max_attempts {
                        break;
                    }
                    let backoff = self.policy.backoff(attempt);
                    warn!(
                        "Attempt {}/{} for '{}' failed ({}), sleeping {:?}",
                        attempt, self.policy.max_attempts, remote, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        error!(
            "Retried {} times downloading '{}': {}",
            self.policy.max_attempts, remote, last_error
        );
        FetchOutcome::Failed(last_error)
    }

    /// 创建目录并检查本地文件；返回 `None` 表示已存在
    async fn prepare(
        &self,
        destination: &Path,
        entry: &CatalogEntry,
    ) -> Result<Option<PathBuf>, FetchError> {
        let target = local_path(destination, entry)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        if fs::try_exists(&target).await? {
            return Ok(None);
        }
        Ok(Some(target))
    }

    /// 单次尝试：下载并原子写入
    async fn attempt(&self, remote: &str, target: &Path) -> Result<usize, FetchError> {
        let body = self.client.download(remote).await?;

        let mut partial = target.as_os_str().to_owned();
        partial.push(".part");
        let partial = PathBuf::from(partial);

        fs::write(&partial, &body).await?;
        if let Err(e) = fs::rename(&partial, target).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }

        debug!("Wrote {} bytes to {}", body.len(), target.display());
        Ok(body.len())
    }
}
