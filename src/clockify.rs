use std::collections::HashSet;

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use log::{debug, info, warn};
use reqwest::{header::CONTENT_TYPE, Client, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::catalog::{Catalog, Project, Tag};
use crate::config::Config;
use crate::datetime::{day_window, month_window, to_iso_timestamp, year_window};
use crate::error::Error;
use crate::time_entry::{EntryRequest, TimeEntry, TimeEntryRecord};

/// Clockify APIのワークスペース情報をデシリアライズするための構造体。
#[derive(Clone, Debug, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
}

/// Clockify APIのユーザー情報をデシリアライズするための構造体。
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub default_workspace: Option<String>,
    #[serde(default)]
    pub settings: UserSettings,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    #[serde(default)]
    pub time_zone: Option<String>,
}

/// 作成、更新したタイムエントリーのレスポンス。IDだけを利用する。
#[derive(Debug, Deserialize)]
struct EntryResponse {
    id: String,
}

impl User {
    /// ユーザーのプロフィールに設定されたタイムゾーンを返す。
    ///
    /// 設定がない、または解釈できない場合はUTCとする。
    pub fn timezone(&self) -> Tz {
        match &self.settings.time_zone {
            Some(name) => name.parse::<Tz>().unwrap_or_else(|err| {
                warn!("Unknown time zone {}, using UTC: {}", name, err);
                Tz::UTC
            }),
            None => {
                warn!("No time zone configured for user {}, using UTC", self.id);
                Tz::UTC
            }
        }
    }
}

/// Clockify APIと通信するためのクライアント。
///
/// # Examples
///
/// ```
/// let client = ClockifyClient::new(&config);
/// let user = client.read_user().await.unwrap();
/// ```
pub struct ClockifyClient {
    client: Client,
    api_url: String,
    api_key: String,
}

impl ClockifyClient {
    /// 新しい`ClockifyClient`を返す。
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// APIを呼び出し、レスポンスをデシリアライズする。
    ///
    /// 成功以外のステータスは`Error::Api`に、送信の失敗は`Error::Connection`にする。
    async fn send<T, B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T, Error>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let mut request = self
            .client
            .request(method.clone(), format!("{}/{}", self.api_url, path))
            .header("X-Api-Key", &self.api_key)
            .header(CONTENT_TYPE, "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        debug!(
            "{} {}: query={:?} body={}",
            method,
            path,
            query,
            body.and_then(|body| serde_json::to_string(body).ok())
                .unwrap_or_default()
        );

        let response = request
            .send()
            .await
            .map_err(|err| Error::Connection(err.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| Error::Connection(err.to_string()))?;
        if !status.is_success() {
            return Err(Error::Api {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }
        debug!("Answer: {}", text);

        serde_json::from_str(&text).map_err(|err| Error::InvalidResponse {
            path: path.to_string(),
            message: err.to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, Error> {
        self.send::<T, ()>(Method::GET, path, query, None).await
    }

    /// ログインしているユーザーの情報を取得する。
    pub async fn read_user(&self) -> Result<User, Error> {
        self.get("user", &[]).await
    }

    /// ワークスペースの一覧を取得する。
    pub async fn read_workspaces(&self) -> Result<Vec<Workspace>, Error> {
        self.get("workspaces", &[]).await
    }

    /// プロジェクトの一覧を取得する。
    pub async fn read_projects(&self, workspace_id: &str) -> Result<Vec<Project>, Error> {
        self.get(&format!("workspaces/{workspace_id}/projects"), &[])
            .await
    }

    /// タグの一覧を取得する。
    pub async fn read_tags(&self, workspace_id: &str) -> Result<Vec<Tag>, Error> {
        self.get(&format!("workspaces/{workspace_id}/tags"), &[])
            .await
    }
}

/// タイムエントリーを読み書きするためのリポジトリ。
#[allow(async_fn_in_trait)]
pub trait TimeEntryRepository {
    fn workspace_name(&self) -> &str;

    /// 時刻の表示と解釈に使うタイムゾーン。
    fn timezone(&self) -> Tz;

    /// タグとプロジェクトが存在することを確認する。
    fn validate(&self, tags: &[String], project: Option<&str>) -> Result<(), Error>;

    /// タイムエントリーを順に送信し、作成、更新されたエントリーのIDを返す。
    ///
    /// 途中で失敗した場合、それまでに送信したエントリーはそのまま残る。
    async fn add_entries(&self, entries: &[TimeEntry]) -> Result<HashSet<String>, Error>;

    /// 指定された範囲のタイムエントリーを取得する。
    ///
    /// # Arguments
    ///
    /// * `start_at` - 取得するタイムエントリーの開始日時
    /// * `end_at` - 取得するタイムエントリーの終了日時
    async fn read_entries(
        &self,
        start_at: &DateTime<Tz>,
        end_at: &DateTime<Tz>,
    ) -> Result<Vec<TimeEntry>, Error>;

    /// 指定された日のタイムエントリーを取得する。
    async fn read_entries_day(&self, date: NaiveDate) -> Result<Vec<TimeEntry>, Error> {
        let (start_at, end_at) = day_window(date, &self.timezone())?;
        self.read_entries(&start_at, &end_at).await
    }

    /// 指定された月のタイムエントリーを取得する。
    async fn read_entries_month(&self, year: i32, month: u32) -> Result<Vec<TimeEntry>, Error> {
        let (start_at, end_at) = month_window(year, month, &self.timezone())?;
        self.read_entries(&start_at, &end_at).await
    }

    /// 指定された年のタイムエントリーを取得する。
    async fn read_entries_year(&self, year: i32) -> Result<Vec<TimeEntry>, Error> {
        let (start_at, end_at) = year_window(year, &self.timezone())?;
        self.read_entries(&start_at, &end_at).await
    }
}

/// ワークスペース、ユーザー、プロジェクトとタグを読み込んだ後のClockify。
pub struct ClockifySession {
    client: ClockifyClient,
    user: User,
    timezone: Tz,
    workspace: Workspace,
    projects: Catalog<Project>,
    tags: Catalog<Tag>,
}

impl ClockifySession {
    /// ワークスペースを決め、プロジェクトとタグの一覧を読み込む。
    ///
    /// ワークスペース名が指定されていない場合はユーザーのデフォルトのワークスペースを使う。
    pub async fn open(
        client: ClockifyClient,
        user: User,
        workspace_name: Option<String>,
    ) -> Result<Self, Error> {
        let workspaces = client.read_workspaces().await?;
        let available = || {
            workspaces
                .iter()
                .map(|workspace| workspace.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let workspace = match (workspace_name, user.default_workspace.as_deref()) {
            (Some(name), _) => workspaces
                .iter()
                .find(|workspace| workspace.name == name)
                .cloned()
                .ok_or_else(|| {
                    Error::usage(format!(
                        "No workspace {name} found! Available workspaces: {}",
                        available()
                    ))
                })?,
            (None, Some(id)) => workspaces
                .iter()
                .find(|workspace| workspace.id == id)
                .cloned()
                .ok_or_else(|| {
                    Error::usage(format!(
                        "Default workspace {id} not found! Available workspaces: {}",
                        available()
                    ))
                })?,
            (None, None) => {
                return Err(Error::usage(format!(
                    "No workspace given, set {} or use ^workspace",
                    crate::config::WORKSPACE_VAR
                )))
            }
        };
        info!("Using workspace {} ({})", workspace.name, workspace.id);

        let projects = Catalog::new(client.read_projects(&workspace.id).await?);
        let tags = Catalog::new(client.read_tags(&workspace.id).await?);
        info!(
            "Loaded {} projects and {} tags",
            projects.names().len(),
            tags.names().len()
        );

        Ok(Self {
            client,
            timezone: user.timezone(),
            user,
            workspace,
            projects,
            tags,
        })
    }

    fn entries_path(&self) -> String {
        format!(
            "workspaces/{}/user/{}/time-entries",
            self.workspace.id, self.user.id
        )
    }
}

impl TimeEntryRepository for ClockifySession {
    fn workspace_name(&self) -> &str {
        &self.workspace.name
    }

    fn timezone(&self) -> Tz {
        self.timezone
    }

    fn validate(&self, tags: &[String], project: Option<&str>) -> Result<(), Error> {
        if let Some(tag) = tags.iter().find(|tag| self.tags.by_name(tag).is_none()) {
            return Err(Error::usage(format!(
                "Unknown tag {tag}. Available tags: {}",
                self.tags.names().join(", ")
            )));
        }

        if let Some(project) = project.filter(|project| self.projects.by_name(project).is_none()) {
            return Err(Error::usage(format!(
                "Unknown project {project}. Available projects: {}",
                self.projects.names().join(", ")
            )));
        }

        Ok(())
    }

    async fn add_entries(&self, entries: &[TimeEntry]) -> Result<HashSet<String>, Error> {
        let mut added_ids = HashSet::new();
        for entry in entries {
            let request = entry.serialize(&self.projects, &self.tags)?;
            let response: EntryResponse = match &request {
                EntryRequest::Close(_) => {
                    self.client
                        .send(Method::PATCH, &self.entries_path(), &[], Some(&request))
                        .await?
                }
                EntryRequest::Create(_) => {
                    let path = format!("workspaces/{}/time-entries", self.workspace.id);
                    self.client
                        .send(Method::POST, &path, &[], Some(&request))
                        .await?
                }
            };
            info!("Submitted time entry {}", response.id);
            added_ids.insert(response.id);
        }

        Ok(added_ids)
    }

    async fn read_entries(
        &self,
        start_at: &DateTime<Tz>,
        end_at: &DateTime<Tz>,
    ) -> Result<Vec<TimeEntry>, Error> {
        let path = self.entries_path();
        let records: Vec<TimeEntryRecord> = self
            .client
            .get(
                &path,
                &[
                    ("start", to_iso_timestamp(start_at)),
                    ("end", to_iso_timestamp(end_at)),
                ],
            )
            .await?;
        info!("length of time entries: {}", records.len());

        records
            .into_iter()
            .map(|record| {
                TimeEntry::from_record(record, &self.projects, &self.tags, &self.timezone).map_err(
                    |err| Error::InvalidResponse {
                        path: path.clone(),
                        message: err.to_string(),
                    },
                )
            })
            .collect()
    }
}


/// コマンドのテストで使う、メモリ上のリポジトリ。
#[cfg(test)]
pub mod fake {
    use std::cell::RefCell;
    use std::collections::HashSet;

    use chrono::DateTime;
    use chrono_tz::Tz;

    use super::TimeEntryRepository;
    use crate::error::Error;
    use crate::time_entry::TimeEntry;

    pub struct FakeRepository {
        pub timezone: Tz,
        pub tags: Vec<String>,
        pub projects: Vec<String>,
        /// `read_entries`で返すエントリー。
        pub entries: Vec<TimeEntry>,
        pub submitted: RefCell<Vec<TimeEntry>>,
        pub windows: RefCell<Vec<(DateTime<Tz>, DateTime<Tz>)>>,
    }

    impl FakeRepository {
        pub fn new(timezone: Tz) -> Self {
            Self {
                timezone,
                tags: vec!["alpha".to_string(), "beta".to_string()],
                projects: vec!["work".to_string()],
                entries: vec![],
                submitted: RefCell::new(vec![]),
                windows: RefCell::new(vec![]),
            }
        }
    }

    impl TimeEntryRepository for FakeRepository {
        fn workspace_name(&self) -> &str {
            "Acme"
        }

        fn timezone(&self) -> Tz {
            self.timezone
        }

        fn validate(&self, tags: &[String], project: Option<&str>) -> Result<(), Error> {
            if let Some(tag) = tags.iter().find(|tag| !self.tags.contains(tag)) {
                return Err(Error::usage(format!("Unknown tag {tag}")));
            }
            match project {
                Some(project) if !self.projects.iter().any(|known| known == project) => {
                    Err(Error::usage(format!("Unknown project {project}")))
                }
                _ => Ok(()),
            }
        }

        async fn add_entries(&self, entries: &[TimeEntry]) -> Result<HashSet<String>, Error> {
            let mut submitted = self.submitted.borrow_mut();
            let mut ids = HashSet::new();
            for entry in entries {
                ids.insert(format!("new{}", submitted.len()));
                submitted.push(entry.clone());
            }
            Ok(ids)
        }

        async fn read_entries(
            &self,
            start_at: &DateTime<Tz>,
            end_at: &DateTime<Tz>,
        ) -> Result<Vec<TimeEntry>, Error> {
            self.windows.borrow_mut().push((*start_at, *end_at));
            Ok(self.entries.clone())
        }
    }
}
