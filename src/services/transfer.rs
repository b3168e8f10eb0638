// エクスポート・インポートモジュール

use crate::models::Trip;
use crate::shared::errors::{AppError, AppResult};
use chrono::{NaiveDate, Utc};
use log::{error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

static WHITESPACE_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("空白パターンのコンパイルに失敗"));

/// ファイル名に使えない文字（パス区切りを含む）
static FILE_NAME_UNSAFE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[/\\:*?"<>|\x00-\x1F]"#).expect("ファイル名パターンのコンパイルに失敗")
});

/// エクスポートファイルの内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedTrip {
    pub file_name: String,
    pub contents: String,
}

/// エクスポートファイル名を作成する
///
/// 旅行名の連続した空白とファイル名に使えない文字を "_" に置き換え、
/// 日付（YYYY-MM-DD）を付ける。結果は常に単一のファイル名になる
pub fn export_file_name(trip_name: &str, date: NaiveDate) -> String {
    let collapsed = WHITESPACE_RUNS.replace_all(trip_name, "_");
    format!(
        "{}_{}.json",
        FILE_NAME_UNSAFE.replace_all(&collapsed, "_"),
        date.format("%Y-%m-%d")
    )
}

/// 旅行データを整形済みJSONとしてエクスポートする
///
/// # 引数
/// * `trip` - 旅行データ
/// * `date` - ファイル名に付ける日付
pub fn export_trip(trip: &Trip, date: NaiveDate) -> AppResult<ExportedTrip> {
    Ok(ExportedTrip {
        file_name: export_file_name(&trip.trip_name, date),
        contents: serde_json::to_string_pretty(trip)?,
    })
}

/// 本日（UTC）の日付でディレクトリにエクスポートファイルを書き出す
///
/// # 戻り値
/// 書き出したファイルのパス
pub fn write_export(trip: &Trip, dir: &Path) -> AppResult<PathBuf> {
    let exported = export_trip(trip, Utc::now().date_naive())?;
    let path = dir.join(&exported.file_name);
    fs::write(&path, exported.contents)?;
    info!("旅行データをエクスポートしました: {path:?}");
    Ok(path)
}

/// インポートファイルの内容を解析する
///
/// 解析に失敗した場合はインポートエラーを返す（呼び出し側の状態は変更しない）
pub fn parse_import(contents: &str) -> AppResult<Trip> {
    serde_json::from_str::<Trip>(contents).map_err(|e| {
        error!("インポートデータの解析に失敗しました: {e}");
        AppError::import(e.to_string())
    })
}

/// ファイルから旅行データを読み込む
pub fn read_import(path: &Path) -> AppResult<Trip> {
    let contents = fs::read_to_string(path)?;
    parse_import(&contents)
}
