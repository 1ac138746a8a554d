use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use log::info;

use crate::clockify::TimeEntryRepository;
use crate::error::Error;
use crate::time_entry::TimeEntry;

/// `--dump`で表示する期間。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DumpRange {
    Month { year: i32, month: u32 },
    Year(i32),
}

/// 期間をパースする。`YYYY-MM`なら1ヶ月、`YYYY`なら1年とする。
pub fn parse_dump_range(s: &str) -> Result<DumpRange> {
    if let Some((year, month)) = s.split_once('-') {
        let target_date = format!("{}-{}-01", year, month);
        NaiveDate::parse_from_str(&target_date, "%Y-%m-%d")
            .with_context(|| format!("Failed to parse month: {}", s))?;
        let year = year.parse().with_context(|| format!("Failed to parse year: {}", s))?;
        let month = month.parse().with_context(|| format!("Failed to parse month: {}", s))?;
        return Ok(DumpRange::Month { year, month });
    }

    if s.len() != 4 || !s.chars().all(|c| c.is_ascii_digit()) {
        bail!("Expected YYYY-MM or YYYY, got {}", s);
    }
    let year = s.parse().with_context(|| format!("Failed to parse year: {}", s))?;

    Ok(DumpRange::Year(year))
}

/// 1ヶ月または1年分のエントリーを日毎にまとめるコマンド。
pub struct DumpCommand<'a, T: TimeEntryRepository> {
    repository: &'a T,
}

impl<'a, T: TimeEntryRepository> DumpCommand<'a, T> {
    /// 新しい`DumpCommand`を返す。
    pub fn new(repository: &'a T) -> Self {
        Self { repository }
    }

    /// 期間内のエントリーを取得し、日付順にまとめて返す。
    ///
    /// # Arguments
    ///
    /// * `range` - 取得する期間
    /// * `project` - 指定した場合、このプロジェクトのエントリーだけを残す
    /// * `tags` - 全てのタグを持つエントリーだけを残す
    pub async fn run(
        &self,
        range: DumpRange,
        project: Option<&str>,
        tags: &[String],
    ) -> Result<Vec<(NaiveDate, Vec<TimeEntry>)>, Error> {
        let time_entries = match range {
            DumpRange::Month { year, month } => {
                self.repository.read_entries_month(year, month).await?
            }
            DumpRange::Year(year) => self.repository.read_entries_year(year).await?,
        };
        info!("Time entries retrieved successfully.");

        let daily_time_entries: HashMap<NaiveDate, Vec<TimeEntry>> = time_entries
            .into_iter()
            .filter(|entry| project.map_or(true, |project| entry.project.as_deref() == Some(project)))
            .filter(|entry| tags.iter().all(|tag| entry.tags.contains(tag)))
            .fold(HashMap::new(), |mut acc, entry| {
                if let Some(start) = entry.start {
                    acc.entry(start.date_naive()).or_default().push(entry);
                }
                acc
            });
        let mut sorted_time_entries = daily_time_entries.into_iter().collect::<Vec<_>>();
        sorted_time_entries.sort_by_key(|(date, _)| *date);

        Ok(sorted_time_entries)
    }
}
