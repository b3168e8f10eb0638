use super::environment::{get_environment, Environment};
use crate::shared::errors::{AppError, AppResult};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// 保存デバウンスの既定値（ミリ秒）
pub const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 1000;

/// 共有ドキュメントのポーリング間隔の既定値（秒）
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// 共有リンクの既定ベースURL
pub const DEFAULT_SHARE_BASE_URL: &str = "http://localhost:3000/";

/// アプリケーションの動作モード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripMode {
    /// 単独利用（保存はデバウンス、同期なし）
    Standalone,
    /// 共同編集（即時保存、ドキュメントストアと同期）
    Collaborative,
}

impl FromStr for TripMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "standalone" => Ok(TripMode::Standalone),
            "collaborative" | "shared" => Ok(TripMode::Collaborative),
            other => Err(format!("不明な動作モードです: {other}")),
        }
    }
}

/// ドキュメントストアの接続設定
#[derive(Debug, Clone)]
pub struct DocumentStoreConfig {
    /// ドキュメントストアのベースURL（例: https://store.example.com/documents）
    pub base_url: String,
    /// 静的なBearerトークン
    pub api_token: String,
    /// リクエストタイムアウト（未設定の場合は無期限）
    pub request_timeout: Option<Duration>,
    /// リモートドキュメントのポーリング間隔
    pub poll_interval: Duration,
}

/// アプリケーション設定
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    /// ローカルデータベースを置くディレクトリ
    pub data_dir: PathBuf,
    pub mode: TripMode,
    /// 単独利用モードでの保存デバウンス時間
    pub save_debounce: Duration,
    pub document_store: Option<DocumentStoreConfig>,
    /// 共有リンクのベースURL
    pub share_base_url: Url,
}

impl AppConfig {
    /// 環境変数から設定を読み込む
    ///
    /// 実行時環境変数を優先し、見つからない場合はコンパイル時埋め込み値を使用する
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意の参照関数から設定を読み込む
    ///
    /// # 引数
    /// * `lookup` - 設定キーから値を返す関数
    ///
    /// # 戻り値
    /// 検証済みの設定、または不正な値がある場合は設定エラー
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = get_environment();

        let data_dir = match lookup("TRIP_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .ok_or_else(|| AppError::configuration("データディレクトリを特定できません"))?
                .join("trip-planner"),
        };

        let mode = match lookup("TRIP_MODE") {
            Some(value) => value.parse::<TripMode>().map_err(AppError::Configuration)?,
            None => TripMode::Standalone,
        };

        let save_debounce = Duration::from_millis(parse_number(
            &lookup,
            "SAVE_DEBOUNCE_MS",
            DEFAULT_SAVE_DEBOUNCE_MS,
        )?);

        let store_url = lookup("DOCUMENT_STORE_URL")
            .or_else(|| option_env!("EMBEDDED_DOCUMENT_STORE_URL").map(str::to_string));
        let store_token = lookup("DOCUMENT_STORE_TOKEN")
            .or_else(|| option_env!("EMBEDDED_DOCUMENT_STORE_TOKEN").map(str::to_string));

        let document_store = match (store_url, store_token) {
            (Some(base_url), Some(api_token)) => {
                let timeout_secs = lookup("DOCUMENT_STORE_TIMEOUT_SECS")
                    .map(|value| {
                        value.trim().parse::<u64>().map_err(|_| {
                            AppError::configuration(format!(
                                "DOCUMENT_STORE_TIMEOUT_SECS が数値ではありません: {value}"
                            ))
                        })
                    })
                    .transpose()?;

                Some(DocumentStoreConfig {
                    base_url: base_url.trim_end_matches('/').to_string(),
                    api_token,
                    request_timeout: timeout_secs.map(Duration::from_secs),
                    poll_interval: Duration::from_secs(parse_number(
                        &lookup,
                        "POLL_INTERVAL_SECS",
                        DEFAULT_POLL_INTERVAL_SECS,
                    )?),
                })
            }
            (Some(_), None) => {
                log::warn!("DOCUMENT_STORE_TOKEN が未設定のため、共有機能を無効にします");
                None
            }
            _ => None,
        };

        let share_base_url = lookup("SHARE_BASE_URL")
            .or_else(|| option_env!("EMBEDDED_SHARE_BASE_URL").map(str::to_string))
            .unwrap_or_else(|| DEFAULT_SHARE_BASE_URL.to_string());
        let share_base_url = Url::parse(&share_base_url).map_err(|e| {
            AppError::configuration(format!("SHARE_BASE_URL が不正です: {e}"))
        })?;

        let config = Self {
            environment,
            data_dir,
            mode,
            save_debounce,
            document_store,
            share_base_url,
        };
        config.validate()?;
        Ok(config)
    }

    /// 動作モードを上書きした設定を返す
    pub fn with_mode(mut self, mode: TripMode) -> AppResult<Self> {
        self.mode = mode;
        self.validate()?;
        Ok(self)
    }

    /// 設定の整合性を検証する
    pub fn validate(&self) -> AppResult<()> {
        if self.mode == TripMode::Collaborative && self.document_store.is_none() {
            return Err(AppError::configuration(
                "共同編集モードには DOCUMENT_STORE_URL と DOCUMENT_STORE_TOKEN の設定が必要です",
            ));
        }

        if let Some(store) = &self.document_store {
            if store.api_token.trim().is_empty() {
                return Err(AppError::configuration("DOCUMENT_STORE_TOKEN が空です"));
            }
            if store.poll_interval.is_zero() {
                return Err(AppError::configuration(
                    "POLL_INTERVAL_SECS は1以上である必要があります",
                ));
            }
            Url::parse(&store.base_url).map_err(|e| {
                AppError::configuration(format!("DOCUMENT_STORE_URL が不正です: {e}"))
            })?;
        }

        Ok(())
    }
}

fn parse_number<F>(lookup: &F, key: &str, default: u64) -> AppResult<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|_| AppError::configuration(format!("{key} が数値ではありません: {value}"))),
        None => Ok(default),
    }
}
