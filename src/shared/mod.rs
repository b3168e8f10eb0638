/// 共有エラー型とエラーハンドリング
pub mod errors;

/// 共有設定管理
pub mod config;

// 便利な再エクスポート
pub use config::{
    get_database_filename, get_environment, initialize_application, initialize_logging_system,
    load_environment_variables, log_initialization_complete, AppConfig, DocumentStoreConfig,
    Environment, EnvironmentConfig, InitializationResult, TripMode,
};
pub use errors::{AppError, AppResult, ErrorSeverity};
