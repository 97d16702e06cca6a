//! 卡端模型与 HTTP 接口
//!
//! - [`CardPath`]: 卡上的目录路径（`A:\DCIM\100CANON`）
//! - [`CatalogEntry`]: 爬取到的一个可下载文件
//! - [`CardClient`]: 目录列表和文件下载两个端点的抽象
//! - [`HttpCardClient`]: 基于 reqwest 的实现

pub mod client;

pub use client::{CardClient, HttpCardClient};

use std::fmt;

/// 卡文件系统的路径分隔符
pub const CARD_SEPARATOR: char = '\\';

/// 卡上的目录路径
///
/// 由盘符前缀（如 `A:`）和相对路径组成，前缀通过显式匹配拆分，
/// 不依赖固定的字符长度。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CardPath {
    drive: String,
    components: Vec<String>,
}

impl CardPath {
    /// 解析已解码的卡路径，如 `A:`、`A:\DCIM`
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim_end_matches(CARD_SEPARATOR);
        let (drive, rest) = match trimmed.find(':') {
            Some(idx) => (&trimmed[..=idx], &trimmed[idx + 1..]),
            None => ("", trimmed),
        };

        let components = rest
            .split(CARD_SEPARATOR)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            drive: drive.to_string(),
            components,
        }
    }

    /// 盘符前缀（如 `A:`）
    pub fn drive(&self) -> &str {
        &self.drive
    }

    /// 相对于盘符的路径组件
    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// 追加一级子目录
    pub fn child(&self, name: &str) -> Self {
        let mut components = self.components.clone();
        components.push(name.to_string());
        Self {
            drive: self.drive.clone(),
            components,
        }
    }

    /// 是否为 `self` 的严格子孙目录
    pub fn is_descendant_of(&self, ancestor: &CardPath) -> bool {
        self.drive == ancestor.drive
            && self.components.len() > ancestor.components.len()
            && self.components.starts_with(&ancestor.components)
    }

    /// 下载端点使用的远程文件名：相对目录与文件名以反斜杠连接
    pub fn remote_file(&self, file_name: &str) -> String {
        let mut parts: Vec<&str> = self.components.iter().map(String::as_str).collect();
        parts.push(file_name);
        parts.join("\\")
    }
}

impl fmt::Display for CardPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.drive)?;
        for component in &self.components {
            write!(f, "{CARD_SEPARATOR}{component}")?;
        }
        Ok(())
    }
}

/// 卡上的一个可下载文件
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatalogEntry {
    pub directory: CardPath,
    pub file_name: String,
}

impl CatalogEntry {
    pub fn new(directory: CardPath, file_name: impl Into<String>) -> Self {
        Self {
            directory,
            file_name: file_name.into(),
        }
    }

    pub fn remote_file(&self) -> String {
        self.directory.remote_file(&self.file_name)
    }
}

impl fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.directory, CARD_SEPARATOR, self.file_name)
    }
}
