use crate::db::kv_store::SqliteKeyValueStore;
use crate::shared::config::{initialize_application, log_initialization_complete, AppConfig};
use crate::shared::errors::AppResult;

/// ローカルストアを初期化し、マイグレーションを実行する
///
/// # 引数
/// * `config` - アプリケーション設定
///
/// # 戻り値
/// キー・バリューストア、または失敗時はエラー
///
/// # 処理内容
/// 1. アプリケーション全体の初期化を実行
/// 2. データベース接続を開く（テーブルがなければ作成）
/// 3. 初期化完了ログを出力
pub fn initialize_database(config: &AppConfig) -> AppResult<SqliteKeyValueStore> {
    let init_result = initialize_application(config)?;

    let store = SqliteKeyValueStore::open(&init_result.database_path)?;

    log_initialization_complete(&init_result);

    Ok(store)
}
