use chrono::DateTime;
use chrono_tz::Tz;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, Project, Tag};
use crate::datetime::{from_iso_timestamp, to_iso_timestamp};
use crate::error::Error;

/// タイムエントリー。
///
/// 引数から作成した下書きと、APIから取得したレコードの両方を表す。
/// `start`が`None`のエントリーは、実行中のエントリーを終了させる操作を表す。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeEntry {
    pub start: Option<DateTime<Tz>>,
    pub end: Option<DateTime<Tz>>,
    pub description: Option<String>,
    pub billable: bool,
    pub project: Option<String>,
    /// 取得したレコードにのみ設定され、送信はしない。
    pub project_color: Option<String>,
    pub tags: Vec<String>,
    pub eid: Option<String>,
}

/// タイムエントリーを送信するためのリクエスト。
#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntryRequest {
    /// 実行中のエントリーを終了させる(PATCH)。
    Close(CloseEntryRequest),
    /// 新しいエントリーを作成する(POST)。
    Create(NewEntryRequest),
}

#[derive(Debug, PartialEq, Serialize)]
pub struct CloseEntryRequest {
    pub end: String,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntryRequest {
    pub start: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub billable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub tag_ids: Vec<String>,
}

/// Clockify APIのタイムエントリーをデシリアライズするための構造体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntryRecord {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub billable: bool,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub tag_ids: Option<Vec<String>>,
    pub time_interval: TimeInterval,
}

#[derive(Debug, Deserialize)]
pub struct TimeInterval {
    pub start: String,
    #[serde(default)]
    pub end: Option<String>,
}

impl TimeEntry {
    /// 送信用のリクエストに変換する。
    ///
    /// プロジェクトとタグは名前からIDに変換する。名前が存在するかは事前に検証しておくこと。
    ///
    /// # Panics
    ///
    /// `start`と`end`がどちらも`None`の場合。
    pub fn serialize(
        &self,
        projects: &Catalog<Project>,
        tags: &Catalog<Tag>,
    ) -> Result<EntryRequest, Error> {
        let Some(start) = &self.start else {
            let end = self
                .end
                .as_ref()
                .expect("an entry closing the running one needs an end");
            return Ok(EntryRequest::Close(CloseEntryRequest {
                end: to_iso_timestamp(end),
            }));
        };

        let project_id = match &self.project {
            Some(name) => Some(
                projects
                    .by_name(name)
                    .map(|project| project.id.clone())
                    .ok_or_else(|| Error::usage(format!("Unknown project {name}")))?,
            ),
            None => None,
        };
        let tag_ids = self
            .tags
            .iter()
            .map(|name| {
                tags.by_name(name)
                    .map(|tag| tag.id.clone())
                    .ok_or_else(|| Error::usage(format!("Unknown tag {name}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EntryRequest::Create(NewEntryRequest {
            start: to_iso_timestamp(start),
            end: self.end.as_ref().map(to_iso_timestamp),
            description: self.description.clone(),
            billable: self.billable,
            project_id,
            tag_ids,
        }))
    }

    /// APIのレコードから`TimeEntry`を作成する。
    ///
    /// 時刻はユーザーのタイムゾーンに変換する。
    /// Catalogに存在しないIDは警告を出した上でIDをそのまま名前として使う。
    pub fn from_record(
        record: TimeEntryRecord,
        projects: &Catalog<Project>,
        tags: &Catalog<Tag>,
        timezone: &Tz,
    ) -> Result<Self, chrono::ParseError> {
        let mut entry = TimeEntry {
            start: Some(from_iso_timestamp(&record.time_interval.start, timezone)?),
            description: record.description,
            billable: record.billable,
            ..Default::default()
        };

        if let Some(end) = &record.time_interval.end {
            entry.end = Some(from_iso_timestamp(end, timezone)?);
        }

        if let Some(project_id) = record.project_id {
            match projects.by_id(&project_id) {
                Some(project) => {
                    entry.project = Some(project.name.clone());
                    entry.project_color = project.color.clone();
                }
                None => {
                    warn!("Unknown project id {} in entry {}", project_id, record.id);
                    entry.project = Some(project_id);
                }
            }
        }

        for tag_id in record.tag_ids.unwrap_or_default() {
            match tags.by_id(&tag_id) {
                Some(tag) => entry.tags.push(tag.name.clone()),
                None => {
                    warn!("Unknown tag id {} in entry {}", tag_id, record.id);
                    entry.tags.push(tag_id);
                }
            }
        }

        entry.eid = Some(record.id);

        Ok(entry)
    }
}
