use std::collections::HashSet;

use log::info;

use crate::clockify::TimeEntryRepository;
use crate::error::Error;
use crate::parser::Invocation;
use crate::time_entry::TimeEntry;

/// 1日分の処理結果。
#[derive(Debug)]
pub struct DailyReport {
    /// 対象の日のタイムエントリー。
    pub entries: Vec<TimeEntry>,
    /// 今回追加、更新したエントリーのID。
    pub added_ids: HashSet<String>,
}

/// タイムエントリーを追加し、その日のエントリーを取得するコマンド。
pub struct DailyCommand<'a, T: TimeEntryRepository> {
    repository: &'a T,
}

impl<'a, T: TimeEntryRepository> DailyCommand<'a, T> {
    /// 新しい`DailyCommand`を返す。
    ///
    /// # Arguments
    /// * `repository` - Clockify APIと通信するためのリポジトリ
    pub fn new(repository: &'a T) -> Self {
        Self { repository }
    }

    /// 引数で指定されたエントリーを送信した後、対象の日のエントリーを取得する。
    ///
    /// タグとプロジェクトは送信前に検証し、不明なものがあれば何も送信しない。
    pub async fn run(&self, invocation: &Invocation) -> Result<DailyReport, Error> {
        let added_ids = if invocation.entries.is_empty() {
            HashSet::new()
        } else {
            self.repository
                .validate(&invocation.tags, invocation.project.as_deref())?;
            let added_ids = self.repository.add_entries(&invocation.entries).await?;
            info!("{} time entries submitted", added_ids.len());
            added_ids
        };

        let entries = self.repository.read_entries_day(invocation.date).await?;
        info!("Time entries retrieved successfully.");

        Ok(DailyReport { entries, added_ids })
    }
}
