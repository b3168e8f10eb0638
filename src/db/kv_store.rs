use crate::db::migrations::run_migrations;
use crate::shared::errors::{AppError, AppResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// 文字列キーと文字列値を保持する永続ストア
///
/// ブラウザのローカルストレージと同じ意味論（キー単位の全置換、部分更新なし）を持つ
pub trait KeyValueStore: Send + Sync {
    /// キーに対応する値を取得する（存在しない場合はNone）
    fn get_item(&self, key: &str) -> AppResult<Option<String>>;

    /// キーに値を書き込む（既存の値は完全に置き換える）
    fn set_item(&self, key: &str, value: &str) -> AppResult<()>;
}

/// SQLiteによるキー・バリューストア実装
pub struct SqliteKeyValueStore {
    conn: Mutex<Connection>,
}

impl SqliteKeyValueStore {
    /// 既存の接続からストアを作成し、マイグレーションを実行する
    pub fn new(conn: Connection) -> AppResult<Self> {
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// データベースファイルを開いてストアを作成する
    ///
    /// # 引数
    /// * `path` - データベースファイルのパス（存在しない場合は作成される）
    pub fn open(path: &Path) -> AppResult<Self> {
        let conn = Connection::open(path).map_err(|e| {
            AppError::Database(format!("データベースのオープンに失敗しました: {e}"))
        })?;
        Self::new(conn)
    }

    /// メモリ上のストアを作成する
    pub fn open_in_memory() -> AppResult<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AppError::Database(format!("データベースロックエラー: {e}")))
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get_item(&self, key: &str) -> AppResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> AppResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }
}
