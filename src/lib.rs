pub mod cli;
pub mod commands;
pub mod db;
pub mod models;
pub mod services;
pub mod shared;

use clap::Parser;
use cli::{Cli, Command};
use log::{error, info};
use services::{HttpDocumentStore, LocalStore, SyncCoordinator, SyncEvent, TripView};
use shared::config::{
    initialize_logging_system, load_environment_variables, AppConfig, TripMode,
};
use shared::errors::{AppError, AppResult};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;

/// コマンドラインから起動する
///
/// # 処理内容
/// 1. 環境変数ファイルの読み込みとログシステムの初期化
/// 2. 設定の読み込みと検証
/// 3. ローカルストアの初期化と旅行ビューの作成
/// 4. コマンドの実行と終了処理（待機中の保存を書き込む）
pub async fn run() -> ExitCode {
    let env_messages = load_environment_variables();
    initialize_logging_system();
    for message in env_messages {
        info!("{message}");
    }

    let cli = Cli::parse();

    match run_cli(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("コマンドの実行に失敗しました: {} (severity={:?})", e.details(), e.severity());
            eprintln!("エラー: {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run_cli(cli: Cli) -> AppResult<()> {
    let mut config = AppConfig::from_env()?;
    if cli.collaborative {
        config = config.with_mode(TripMode::Collaborative)?;
    }
    info!("動作モード: {:?}", config.mode);

    let (mut view, mut events) = open_trip_view(&config)?;
    let mut stdout = std::io::stdout();

    let result = match cli.command.unwrap_or(Command::Show) {
        Command::Session => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            commands::run_session(&mut view, &mut events, stdin, &mut stdout).await
        }
        command => commands::execute(&mut view, command, &mut stdout).await,
    };

    view.shutdown().await;
    result
}

/// 設定に応じたモードで旅行ビューを開く
fn open_trip_view(
    config: &AppConfig,
) -> AppResult<(TripView, mpsc::UnboundedReceiver<SyncEvent>)> {
    let kv_store = db::initialize_database(config)?;
    let store = LocalStore::new(Arc::new(kv_store));

    match config.mode {
        TripMode::Standalone => TripView::standalone(store, config.save_debounce),
        TripMode::Collaborative => {
            let store_config = config.document_store.as_ref().ok_or_else(|| {
                AppError::configuration("ドキュメントストアの設定がありません")
            })?;
            let client = HttpDocumentStore::new(store_config)?;
            let coordinator = SyncCoordinator::new(
                Arc::new(client),
                store_config.poll_interval,
                config.share_base_url.clone(),
            );
            TripView::collaborative(store, coordinator)
        }
    }
}
