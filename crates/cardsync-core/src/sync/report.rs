//! 同步结果汇总

use std::fmt;
use std::path::PathBuf;

use crate::fetch::FetchOutcome;
use crate::wifi::CardSsid;

/// 一张卡的文件计数
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FileTally {
    pub downloaded: usize,
    pub already_present: usize,
    pub failed: usize,
}

impl FileTally {
    pub fn record(&mut self, outcome: &FetchOutcome) {
        match outcome {
            FetchOutcome::Downloaded => self.downloaded += 1,
            FetchOutcome::AlreadyPresent => self.already_present += 1,
            FetchOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.downloaded + self.already_present + self.failed
    }

    fn add(&mut self, other: &FileTally) {
        self.downloaded += other.downloaded;
        self.already_present += other.already_present;
        self.failed += other.failed;
    }
}

impl fmt::Display for FileTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} downloaded, {} already present, {} failed",
            self.downloaded, self.already_present, self.failed
        )
    }
}

/// 一张卡的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardStatus {
    /// 目录爬取成功，文件逐个处理完毕（单个文件可能失败）
    Completed(FileTally),
    /// 无法创建本地目标目录
    DestinationFailed(String),
    /// 无法加入卡网络
    JoinFailed(String),
    /// 目录列表失败
    ListingFailed(String),
}

impl CardStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, CardStatus::Completed(_))
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardStatus::Completed(tally) => write!(f, "{tally}"),
            CardStatus::DestinationFailed(e) => write!(f, "destination unavailable: {e}"),
            CardStatus::JoinFailed(e) => write!(f, "join failed: {e}"),
            CardStatus::ListingFailed(e) => write!(f, "listing failed: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardReport {
    /// `None` 表示未切换网络（nowifi 模式）
    pub card: Option<CardSsid>,
    pub destination: PathBuf,
    pub status: CardStatus,
}

/// 一次运行的全部结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub cards: Vec<CardReport>,
}

impl SyncReport {
    /// 所有已完成卡的文件计数之和
    pub fn totals(&self) -> FileTally {
        let mut totals = FileTally::default();
        for report in &self.cards {
            if let CardStatus::Completed(tally) = &report.status {
                totals.add(tally);
            }
        }
        totals
    }

    pub fn has_failures(&self) -> bool {
        self.cards.iter().any(|r| match &r.status {
            CardStatus::Completed(tally) => tally.failed > 0,
            _ => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_record() {
        let mut tally = FileTally::default();
        tally.record(&FetchOutcome::Downloaded);
        tally.record(&FetchOutcome::AlreadyPresent);
        tally.record(&FetchOutcome::AlreadyPresent);
        tally.record(&FetchOutcome::Failed("timeout".into()));

        assert_eq!(
            tally,
            FileTally {
                downloaded: 1,
                already_present: 2,
                failed: 1
            }
        );
        assert_eq!(tally.total(), 4);
    }

    #[test]
    fn test_report_totals_and_failures() {
        let ok = CardReport {
            card: None,
            destination: PathBuf::from("/tmp/a"),
            status: CardStatus::Completed(FileTally {
                downloaded: 2,
                already_present: 1,
                failed: 0,
            }),
        };
        let mut report = SyncReport {
            cards: vec![ok.clone(), ok],
        };
        assert_eq!(report.totals().downloaded, 4);
        assert!(!report.has_failures());

        report.cards.push(CardReport {
            card: None,
            destination: PathBuf::from("/tmp/b"),
            status: CardStatus::JoinFailed("timeout".into()),
        });
        assert!(report.has_failures());
        assert_eq!(report.totals().total(), 6);
    }
}
