/// 旅行ビューを操作するコマンド（1回実行）
pub mod trip_commands;

/// 標準入力を読み続ける対話モード
pub mod session_commands;

pub use session_commands::run_session;
pub use trip_commands::{execute, render_trip, write_notifications};
