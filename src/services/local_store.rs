// ローカルストアモジュール

use crate::db::KeyValueStore;
use crate::models::Trip;
use crate::shared::errors::AppResult;
use log::{debug, error, info, warn};
use rand::Rng;
use std::sync::Arc;

/// 旅行データを保存するキー
pub const TRIP_DATA_KEY: &str = "tripData";

/// ユーザー名を保存するキー
pub const USER_ALIAS_KEY: &str = "tripUserName";

/// 自動生成されるユーザー名の接頭辞
pub const USER_ALIAS_PREFIX: &str = "Usuario";

/// 端末内の正本となる旅行データとユーザー名を管理する
#[derive(Clone)]
pub struct LocalStore {
    kv: Arc<dyn KeyValueStore>,
}

impl LocalStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// 保存済みの旅行データを読み込む
    ///
    /// # 戻り値
    /// 保存データ。存在しない・解析できない・読み込めない場合はNone（ログのみ出力）
    pub fn load(&self) -> Option<Trip> {
        let raw = match self.kv.get_item(TRIP_DATA_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("保存済みの旅行データはありません");
                return None;
            }
            Err(e) => {
                error!("旅行データの読み込みに失敗しました: {e}");
                return None;
            }
        };

        match serde_json::from_str::<Trip>(&raw) {
            Ok(trip) => {
                debug!(
                    "旅行データを読み込みました: name={}, expenses={}",
                    trip.trip_name,
                    trip.expenses.len()
                );
                Some(trip)
            }
            Err(e) => {
                warn!("保存データの解析に失敗したため、保存なしとして扱います: {e}");
                None
            }
        }
    }

    /// 旅行データ全体を書き込む（以前の内容は完全に置き換える）
    pub fn save(&self, trip: &Trip) -> AppResult<()> {
        let raw = serde_json::to_string(trip)?;
        self.kv.set_item(TRIP_DATA_KEY, &raw)?;
        debug!(
            "旅行データを保存しました: expenses={}, last_updated={:?}",
            trip.expenses.len(),
            trip.last_updated
        );
        Ok(())
    }

    /// 端末ごとのユーザー名を取得する
    ///
    /// 初回呼び出し時に "Usuario" + 0〜9999 の乱数で生成して保存し、以降は同じ値を返す
    pub fn load_user_alias(&self) -> AppResult<String> {
        if let Some(alias) = self.kv.get_item(USER_ALIAS_KEY)? {
            if !alias.trim().is_empty() {
                return Ok(alias);
            }
        }

        let number: u16 = rand::thread_rng().gen_range(0..=9999);
        let alias = format!("{USER_ALIAS_PREFIX}{number}");
        self.kv.set_item(USER_ALIAS_KEY, &alias)?;
        info!("ユーザー名を生成しました: {alias}");

        Ok(alias)
    }
}
