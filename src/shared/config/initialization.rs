use super::app_config::AppConfig;
use super::environment::{get_database_filename, Environment};
use crate::shared::errors::{AppError, AppResult};
use std::fs;
use std::path::{Path, PathBuf};

/// アプリケーション初期化の結果を表す構造体
#[derive(Debug)]
pub struct InitializationResult {
    /// 初回起動かどうか
    pub is_first_run: bool,
    /// アプリケーションデータディレクトリのパス
    pub app_data_dir: PathBuf,
    /// データベースファイルのパス
    pub database_path: PathBuf,
    /// 実行環境
    pub environment: Environment,
}

/// アプリケーションの初期化を実行する
///
/// # 引数
/// * `config` - アプリケーション設定
///
/// # 戻り値
/// 初期化結果、または失敗時はエラー
///
/// # 処理内容
/// 1. アプリケーションデータディレクトリの作成
/// 2. 初回起動の判定（データベースファイルの存在で判定）
pub fn initialize_application(config: &AppConfig) -> AppResult<InitializationResult> {
    let app_data_dir = ensure_app_data_directory(&config.data_dir)?;

    let database_path = app_data_dir.join(get_database_filename(config.environment));
    let is_first_run = !database_path.exists();

    if is_first_run {
        log_first_run_initialization(&config.environment, &app_data_dir, &database_path);
    }

    Ok(InitializationResult {
        is_first_run,
        app_data_dir,
        database_path,
        environment: config.environment,
    })
}

/// アプリケーションデータディレクトリを確実に作成する
fn ensure_app_data_directory(app_data_dir: &Path) -> AppResult<PathBuf> {
    if !app_data_dir.exists() {
        fs::create_dir_all(app_data_dir).map_err(|e| {
            AppError::configuration(format!(
                "アプリデータディレクトリの作成に失敗しました: {e}"
            ))
        })?;

        log::info!("アプリケーションデータディレクトリを作成しました: {app_data_dir:?}");
    }

    Ok(app_data_dir.to_path_buf())
}

/// 初回起動時の初期化ログを出力する
fn log_first_run_initialization(
    environment: &Environment,
    app_data_dir: &Path,
    database_path: &Path,
) {
    log::info!("=== アプリケーション初回起動 ===");
    log::info!("実行環境: {environment:?}");
    log::info!("アプリデータディレクトリ: {app_data_dir:?}");
    log::info!("データベースファイル: {database_path:?}");
}

/// 初期化完了ログを出力する
pub fn log_initialization_complete(result: &InitializationResult) {
    if result.is_first_run {
        log::info!("初回起動の初期化が正常に完了しました");
    } else {
        log::info!("アプリケーション起動完了（既存データベースを使用）");
    }
    log::debug!(
        "環境: {:?}, データベース: {:?}",
        result.environment,
        result.database_path
    );
}
