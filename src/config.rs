use std::{env, fmt};

use log::{debug, warn};

use crate::error::Error;

pub const API_KEY_VAR: &str = "CLOCKIFY_API_KEY";
pub const WORKSPACE_VAR: &str = "CLOCKIFY_WORKSPACE";
pub const API_URL_VAR: &str = "CLOCKIFY_API_URL";
pub const DEFAULT_API_URL: &str = "https://api.clockify.me/api/v1";

/// 環境変数から読み込む設定。
pub struct Config {
    pub api_key: String,
    /// `^workspace`で上書きされなかった場合に使うワークスペース名。
    pub workspace: Option<String>,
    pub api_url: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"[REDACTED]")
            .field("workspace", &self.workspace)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl Config {
    /// 環境変数から設定を読み込む。
    ///
    /// カレントディレクトリの`.env`と、設定ディレクトリの`cloclify/env`があれば先に読み込む。
    /// 既に設定されている環境変数は上書きしない。
    pub fn load() -> Result<Self, Error> {
        load_env_files();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// `lookup`で引いた値から設定を作成する。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let api_key = lookup(API_KEY_VAR)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::usage(format!("{API_KEY_VAR} not defined in environment")))?;
        let workspace = lookup(WORKSPACE_VAR).filter(|workspace| !workspace.is_empty());
        let api_url = lookup(API_URL_VAR)
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Ok(Self {
            api_key,
            workspace,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }
}

fn load_env_files() {
    match dotenvy::dotenv() {
        Ok(path) => debug!("Loaded {}", path.display()),
        Err(err) if err.not_found() => {}
        Err(err) => warn!("Failed to load .env: {}", err),
    }

    if let Some(path) = dirs::config_dir().map(|dir| dir.join("cloclify").join("env")) {
        if path.exists() {
            match dotenvy::from_path(&path) {
                Ok(()) => debug!("Loaded {}", path.display()),
                Err(err) => warn!("Failed to load {}: {}", path.display(), err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::{Config, DEFAULT_API_URL};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_from_lookup() {
        let config = Config::from_lookup(lookup(&[
            ("CLOCKIFY_API_KEY", "secret"),
            ("CLOCKIFY_WORKSPACE", "acme"),
        ]))
        .unwrap();

        assert_eq!(config.api_key, "secret");
        assert_eq!(config.workspace.as_deref(), Some("acme"));
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_api_url_override() {
        let config = Config::from_lookup(lookup(&[
            ("CLOCKIFY_API_KEY", "secret"),
            ("CLOCKIFY_API_URL", "http://localhost:1234/"),
        ]))
        .unwrap();

        assert_eq!(config.api_url, "http://localhost:1234");
        assert_eq!(config.workspace, None);
    }

    #[rstest]
    #[case::missing(&[])]
    #[case::empty(&[("CLOCKIFY_API_KEY", " ")])]
    fn test_missing_api_key(#[case] vars: &[(&str, &str)]) {
        let error = Config::from_lookup(lookup(vars)).unwrap_err();

        assert_eq!(error.to_string(), "CLOCKIFY_API_KEY not defined in environment");
    }

    #[test]
    fn test_debug_hides_api_key() {
        let config = Config::from_lookup(lookup(&[("CLOCKIFY_API_KEY", "secret")])).unwrap();

        assert!(!format!("{config:?}").contains("secret"));
    }
}
