use crate::models::ExpenseCategory;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "trip-planner", version, about = "旅行の予算と経費を管理する")]
pub struct Cli {
    /// 共同編集モードで起動する（TRIP_MODE より優先）
    #[arg(long, global = true)]
    pub collaborative: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// 旅行ビューに対する操作
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 旅行の内容と集計を表示する
    Show,

    /// 旅行名を変更する
    Name {
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,
    },

    /// 予算を設定する
    Budget {
        #[arg(allow_negative_numbers = true)]
        amount: i64,
    },

    /// 経費を追加する（例: add hotel 400000 Hotel Caribe）
    Add {
        /// 種類（英語またはスペイン語名）
        category: ExpenseCategory,
        #[arg(allow_negative_numbers = true)]
        amount: i64,
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        description: Vec<String>,
    },

    /// 経費の完了状態を切り替える
    Toggle { id: String },

    /// 経費を削除する
    Delete { id: String },

    /// JSONファイルにエクスポートする
    Export {
        #[arg(long, value_name = "DIR", default_value = ".")]
        dir: PathBuf,
    },

    /// JSONファイルからインポートする（現在の内容は置き換わる）
    Import { path: PathBuf },

    /// すぐにローカルへ保存する
    Save,

    /// 旅行を共有し、共有リンクを表示する
    Share,

    /// 共有リンクを開いて旅行を取り込む
    Open { link: String },

    /// 共有ドキュメントの最新内容を取得する
    Pull,

    /// 標準入力からコマンドを読み続ける対話モード
    Session,
}

/// 対話モードの1行
#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_version_flag = true)]
pub struct SessionLine {
    #[command(subcommand)]
    pub command: Command,
}
