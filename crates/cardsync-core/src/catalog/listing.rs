//! 目录页解析
//!
//! 卡返回的目录页形如：
//!
//! ```html
//! <a href="dir?dir=A:%5CDCIM"> DCIM</a>
//! <a href="http://ezshare.card/download?file=IMG_0001.JPG"> IMG_0001.JPG</a>
//! ```
//!
//! 显示文本前固定带一个空格，目录和文件名都要去掉它。

use log::debug;
use percent_encoding::percent_decode_str;
use reqwest::Url;
use scraper::{Html, Selector};

use crate::card::{CardPath, CatalogEntry};
use crate::error::ListingError;

/// 不进入的目录（自身、上级和系统保留目录）
pub const SKIPPED_NAMES: &[&str] = &[".", "..", ".Trashes", ".Spotlight-V100", ".fseventsd"];

/// 目录链接的路径标记
const DIR_TOKEN: &str = "/dir";
/// 下载链接的路径标记
const DOWNLOAD_TOKEN: &str = "/download";
/// 目录链接中携带路径的查询参数
const DIR_PARAM: &str = "dir";

/// 单个目录页的解析结果
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Listing {
    pub directories: Vec<CardPath>,
    pub files: Vec<CatalogEntry>,
}

/// 去掉显示文本前的单个空格
pub fn display_name(text: &str) -> &str {
    text.strip_prefix(' ').unwrap_or(text)
}

/// 取查询串中 `key` 的值，只做百分号解码
///
/// 卡上的文件名可以含 `+`，不能按表单编码把它当成空格。
fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query()?.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        (name == key).then(|| percent_decode_str(value).decode_utf8_lossy().into_owned())
    })
}

/// 解析 `current` 目录的列表页
pub fn parse_listing(html: &str, current: &CardPath, base: &Url) -> Result<Listing, ListingError> {
    let malformed = |reason: String| ListingError::Malformed {
        path: current.to_string(),
        reason,
    };

    let document = Html::parse_document(html);
    let selector = Selector::parse("a").map_err(|e| malformed(e.to_string()))?;

    let mut listing = Listing::default();

    for anchor in document.select(&selector) {
        let text: String = anchor.text().collect();
        let name = display_name(&text);

        if SKIPPED_NAMES.contains(&name) {
            debug!("Skipping dir: '{}' in {}", name, current);
            continue;
        }

        let href = anchor
            .value()
            .attr("href")
            .ok_or_else(|| malformed(format!("anchor '{name}' has no href")))?;

        let target = base
            .join(href)
            .map_err(|e| malformed(format!("bad href '{href}': {e}")))?;

        if target.path().ends_with(DIR_TOKEN) {
            let dir = query_value(&target, DIR_PARAM).ok_or_else(|| {
                malformed(format!("directory link '{href}' has no dir parameter"))
            })?;

            debug!("Found dir: {}", dir);
            listing.directories.push(CardPath::parse(&dir));
        } else if target.path().ends_with(DOWNLOAD_TOKEN) {
            if name.is_empty() {
                return Err(malformed(format!("download link '{href}' has no file name")));
            }

            debug!("File on card: {}", name);
            listing
                .files
                .push(CatalogEntry::new(current.clone(), name));
        }
    }

    Ok(listing)
}
