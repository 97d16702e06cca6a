//! 卡目录爬取
//!
//! 从根目录开始深度优先遍历卡的 HTML 文件浏览器，收集所有可下载文件。
//!
//! 卡端返回的标记不完全可信，遍历时：
//! - 只进入当前目录的子孙目录（忽略指向自身或上级的链接）
//! - 每个目录只访问一次
//! - 超过最大深度的目录跳过

pub mod listing;

pub use listing::{Listing, SKIPPED_NAMES, parse_listing};

use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::sync::Arc;

use crate::card::{CardClient, CardPath, CatalogEntry};
use crate::error::ListingError;

/// 卡目录爬取器
pub struct Crawler<C> {
    client: Arc<C>,
    max_depth: usize,
}

impl<C: CardClient> Crawler<C> {
    pub fn new(client: Arc<C>, max_depth: usize) -> Self {
        Self { client, max_depth }
    }

    /// 列出 `root` 下的所有文件
    ///
    /// 任一目录的请求或解析失败都会终止整个爬取，不返回部分结果。
    pub async fn crawl(&self, root: &CardPath) -> Result<Vec<CatalogEntry>, ListingError> {
        let mut entries = Vec::new();
        let mut visited = HashSet::from([root.clone()]);
        let mut stack = vec![root.clone()];

        while let Some(dir) = stack.pop() {
            let html = self
                .client
                .list_directory(&dir)
                .await
                .inspect_err(|e| error!("Error downloading list of files in '{}': {}", dir, e))?;

            let listing = parse_listing(&html, &dir, self.client.base_url())
                .inspect_err(|e| error!("Error parsing list of files in '{}': {}", dir, e))?;

            debug!(
                "'{}': {} files, {} directories",
                dir,
                listing.files.len(),
                listing.directories.len()
            );
            entries.extend(listing.files);

            let mut subdirs = Vec::new();
            for sub in listing.directories {
                if !sub.is_descendant_of(&dir) {
                    debug!("Ignoring link from '{}' to non-descendant '{}'", dir, sub);
                    continue;
                }
                if sub.depth().saturating_sub(root.depth()) > self.max_depth {
                    warn!(
                        "Skipping '{}': deeper than {} levels below '{}'",
                        sub, self.max_depth, root
                    );
                    continue;
                }
                if visited.insert(sub.clone()) {
                    subdirs.push(sub);
                }
            }

            // 逆序入栈，使子目录按页面顺序出栈
            stack.extend(subdirs.into_iter().rev());
        }

        info!(
            "Retrieved a list of {} files that are on the card",
            entries.len()
        );
        Ok(entries)
    }
}
