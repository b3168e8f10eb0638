// 旅行ビュー（コントローラー）モジュール

use crate::models::{Expense, NewExpense, Trip, TripSummary};
use crate::services::local_store::LocalStore;
use crate::services::save_scheduler::SaveScheduler;
use crate::services::sync::{
    document_id_from_url, reconcile, PollHandle, PullOutcome, PushQueue, SyncActivity,
    SyncCoordinator, SyncEvent,
};
use crate::services::transfer::{self, ExportedTrip};
use crate::shared::errors::{AppError, AppResult};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// 通知の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

/// ユーザーに表示する通知（表示側が取り出した時点で閉じたものとする）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

/// 共有状態（Private → Shared の一方向のみ）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SharingStatus {
    Private,
    Shared { document_id: String, link: String },
}

/// 保存方式
enum Persistence {
    /// 単独モード: 操作が途切れてから保存する
    Debounced(SaveScheduler),
    /// 共同編集モード: 変更のたびに即時保存する
    Immediate { saved: bool },
}

/// 旅行データを唯一所有し、編集・保存・同期を取りまとめるコントローラー
///
/// 旅行データを変更するのはこの構造体だけ。ポーリングの結果や
/// バックグラウンドでのプッシュ・保存の失敗は `SyncEvent` として受け取り、
/// `handle_sync_event` で反映する
pub struct TripView {
    trip: Trip,
    store: LocalStore,
    persistence: Persistence,
    sync: Option<SyncCoordinator>,
    user_alias: String,
    activity: SyncActivity,
    pushes: Option<PushQueue>,
    notifications: Vec<Notification>,
    poll: Option<PollHandle>,
    events: mpsc::UnboundedSender<SyncEvent>,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl TripView {
    /// 単独モードで旅行ビューを開く
    ///
    /// # 引数
    /// * `store` - ローカルストア
    /// * `save_debounce` - 最後の編集から保存までの待機時間
    ///
    /// # 戻り値
    /// 旅行ビューと同期イベントの受信側
    pub fn standalone(
        store: LocalStore,
        save_debounce: Duration,
    ) -> AppResult<(Self, mpsc::UnboundedReceiver<SyncEvent>)> {
        let (events, receiver) = mpsc::unbounded_channel();
        let scheduler = SaveScheduler::new(store.clone(), save_debounce, events.clone());
        let view = Self::open(store, Persistence::Debounced(scheduler), None, events)?;
        Ok((view, receiver))
    }

    /// 共同編集モードで旅行ビューを開く
    ///
    /// 保存済みの旅行が共有済みであれば、すぐにポーリングを開始する
    pub fn collaborative(
        store: LocalStore,
        sync: SyncCoordinator,
    ) -> AppResult<(Self, mpsc::UnboundedReceiver<SyncEvent>)> {
        let (events, receiver) = mpsc::unbounded_channel();
        let view = Self::open(store, Persistence::Immediate { saved: true }, Some(sync), events)?;
        Ok((view, receiver))
    }

    fn open(
        store: LocalStore,
        persistence: Persistence,
        sync: Option<SyncCoordinator>,
        events: mpsc::UnboundedSender<SyncEvent>,
    ) -> AppResult<Self> {
        let user_alias = store.load_user_alias()?;
        let trip = store.load().unwrap_or_else(|| {
            info!("保存データがないため、新しい旅行を作成します");
            Trip::default()
        });
        let activity = SyncActivity::default();
        let pushes = sync
            .as_ref()
            .map(|sync| sync.start_pushing(activity.clone(), events.clone()));

        let mut view = Self {
            trip,
            store,
            persistence,
            sync,
            user_alias,
            activity,
            pushes,
            notifications: Vec::new(),
            poll: None,
            events,
        };
        view.restart_polling();

        Ok(view)
    }

    pub fn trip(&self) -> &Trip {
        &self.trip
    }

    pub fn summary(&self) -> TripSummary {
        self.trip.summary()
    }

    pub fn user_alias(&self) -> &str {
        &self.user_alias
    }

    pub fn is_collaborative(&self) -> bool {
        self.sync.is_some()
    }

    /// すべての変更がローカルに保存済みか
    pub fn is_saved(&self) -> bool {
        match &self.persistence {
            Persistence::Debounced(scheduler) => scheduler.is_saved(),
            Persistence::Immediate { saved } => *saved,
        }
    }

    /// 共有サーバーへの要求が進行中か
    pub fn is_syncing(&self) -> bool {
        self.activity.is_active()
    }

    pub fn is_polling(&self) -> bool {
        self.poll.as_ref().is_some_and(PollHandle::is_active)
    }

    pub fn sharing_status(&self) -> SharingStatus {
        match (&self.trip.document_id, &self.sync) {
            (Some(document_id), Some(sync)) => SharingStatus::Shared {
                document_id: document_id.clone(),
                link: sync.share_url(document_id),
            },
            _ => SharingStatus::Private,
        }
    }

    /// 未読の通知を参照する
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// 通知を取り出す（取り出した通知は閉じたものとして消える）
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    pub async fn set_trip_name(&mut self, name: impl Into<String>) {
        self.trip.trip_name = name.into();
        self.commit().await;
    }

    pub async fn set_budget(&mut self, budget: i64) {
        self.trip.budget = budget;
        self.commit().await;
    }

    /// 経費を追加する
    ///
    /// # 戻り値
    /// 追加した場合はtrue。説明が空、または金額が0以下の入力は何もせずfalse
    pub async fn add_expense(&mut self, new_expense: NewExpense) -> bool {
        if !new_expense.is_valid() {
            debug!("無効な経費入力のため追加しません: {new_expense:?}");
            return false;
        }

        let now = now_millis();
        let collaborative = self.is_collaborative();
        let expense = Expense {
            id: self.trip.next_expense_id(now),
            description: new_expense.description,
            amount: new_expense.amount,
            category: new_expense.category,
            completed: false,
            created_by: collaborative.then(|| self.user_alias.clone()),
            created_at: collaborative.then_some(now),
        };

        info!("経費を追加しました: id={}, amount={}", expense.id, expense.amount);
        self.trip.add_expense(expense);
        self.commit().await;
        true
    }

    /// 経費の完了状態を切り替える（存在しないIDは何もしない）
    pub async fn toggle_expense_completed(&mut self, id: &str) -> bool {
        if !self.trip.toggle_expense(id) {
            debug!("経費が見つからないため切り替えません: id={id}");
            return false;
        }
        self.commit().await;
        true
    }

    /// 経費を削除する（存在しないIDは保存もプッシュもしない）
    pub async fn delete_expense(&mut self, id: &str) -> bool {
        if !self.trip.remove_expense(id) {
            debug!("経費が見つからないため削除しません: id={id}");
            return false;
        }
        info!("経費を削除しました: id={id}");
        self.commit().await;
        true
    }

    /// JSON文字列から旅行データを取り込み、現在の内容を丸ごと置き換える
    ///
    /// 共有状態は変わらない（ドキュメントIDは常に現在のものを引き継ぐ）。
    /// 解析に失敗した場合は現在の状態をそのまま残してエラーを返す
    pub async fn import_json(&mut self, contents: &str) -> AppResult<()> {
        let imported = transfer::parse_import(contents)?;
        self.replace_with_import(imported).await;
        Ok(())
    }

    pub async fn import_file(&mut self, path: &Path) -> AppResult<()> {
        let imported = transfer::read_import(path)?;
        self.replace_with_import(imported).await;
        Ok(())
    }

    /// 本日（UTC）の日付でエクスポート内容を作成する
    pub fn export(&self) -> AppResult<ExportedTrip> {
        transfer::export_trip(&self.trip, Utc::now().date_naive())
    }

    pub fn export_to_dir(&self, dir: &Path) -> AppResult<PathBuf> {
        transfer::write_export(&self.trip, dir)
    }

    /// 手動保存（待機中のデバウンス保存は不要になる）
    pub fn save_now(&mut self) -> AppResult<()> {
        self.store.save(&self.trip)?;
        match &mut self.persistence {
            Persistence::Debounced(scheduler) => scheduler.mark_saved(),
            Persistence::Immediate { saved } => *saved = true,
        }
        info!("旅行データを手動保存しました");
        Ok(())
    }

    /// 旅行を共有し、共有リンクを返す
    ///
    /// 既に共有済みの場合は再作成せず、既存のリンクを返す
    pub async fn share(&mut self) -> AppResult<String> {
        let sync = self.coordinator()?;
        if let Some(document_id) = &self.trip.document_id {
            return Ok(sync.share_url(document_id));
        }

        // 作成に失敗した場合に非共有のまま残すため、複製に対して実行する
        let mut candidate = self.trip.clone();
        let request = self.activity.begin();
        let result = sync.publish(&mut candidate).await;
        drop(request);

        match result {
            Ok(document_id) => {
                self.trip = candidate;
                self.persist_now();
                self.restart_polling();
                Ok(sync.share_url(&document_id))
            }
            Err(e) => {
                error!("旅行の共有に失敗しました: {}", e.details());
                Err(e)
            }
        }
    }

    /// 共有リンクを開き、その共有ドキュメントを取り込む
    pub async fn open_share_link(&mut self, link: &str) -> AppResult<()> {
        let document_id = document_id_from_url(link)
            .ok_or_else(|| AppError::validation(format!("共有リンクにIDが含まれていません: {link}")))?;
        self.adopt(&document_id).await
    }

    /// 共有ドキュメントを取得し、ローカル状態を丸ごと置き換える
    pub async fn adopt(&mut self, document_id: &str) -> AppResult<()> {
        let sync = self.coordinator()?;

        let request = self.activity.begin();
        let result = sync.adopt(document_id).await;
        drop(request);

        match result {
            Ok(trip) => {
                self.trip = trip;
                self.persist_now();
                self.restart_polling();
                self.notify(
                    NotificationLevel::Info,
                    format!("共有された旅行「{}」を読み込みました", self.trip.trip_name),
                );
                Ok(())
            }
            Err(e) => {
                error!("共有ドキュメントの取り込みに失敗しました: {}", e.details());
                Err(e)
            }
        }
    }

    /// すぐにリモートを取得して比較する
    ///
    /// # 戻り値
    /// リモートで置き換えた場合はtrue
    pub async fn pull_now(&mut self) -> AppResult<bool> {
        let sync = self.coordinator()?;

        let request = self.activity.begin();
        let result = sync.pull(&self.trip).await;
        drop(request);

        match result {
            Ok(outcome) => Ok(self.apply_pull(outcome)),
            Err(e) => {
                warn!("共有ドキュメントの取得に失敗しました: {}", e.details());
                Err(e)
            }
        }
    }

    /// バックグラウンドタスクからのイベントを反映する
    ///
    /// # 戻り値
    /// リモートで置き換えた場合はtrue
    pub fn handle_sync_event(&mut self, event: SyncEvent) -> bool {
        match event {
            SyncEvent::RemoteFetched(remote) => {
                if remote.document_id != self.trip.document_id {
                    debug!("現在の共有ドキュメントと異なるため破棄します: {:?}", remote.document_id);
                    return false;
                }
                let outcome = reconcile(&self.trip, remote);
                self.apply_pull(outcome)
            }
            SyncEvent::PollFailed(message)
            | SyncEvent::PushFailed(message)
            | SyncEvent::SaveFailed(message) => {
                self.notify(NotificationLevel::Error, message);
                false
            }
        }
    }

    /// 待機中の保存とプッシュを書き込み、ポーリングを停止する
    pub async fn shutdown(self) {
        if let Some(poll) = &self.poll {
            poll.cancel();
        }
        if let Persistence::Debounced(scheduler) = self.persistence {
            scheduler.shutdown().await;
        }
        if let Some(pushes) = self.pushes {
            pushes.shutdown().await;
        }
        debug!("旅行ビューを終了しました");
    }

    /// 取り込んだ旅行で置き換える（ドキュメントIDは現在のものを引き継ぐ）
    async fn replace_with_import(&mut self, mut imported: Trip) {
        imported.document_id = self.trip.document_id.clone();
        info!(
            "旅行データをインポートしました: name={}, expenses={}",
            imported.trip_name,
            imported.expenses.len()
        );
        self.trip = imported;
        self.commit().await;
    }

    fn apply_pull(&mut self, outcome: PullOutcome) -> bool {
        match outcome {
            PullOutcome::Replaced(remote) => {
                info!(
                    "リモートの変更を反映します: last_updated={:?}",
                    remote.last_updated
                );
                self.trip = remote;
                self.persist_now();
                self.notify(
                    NotificationLevel::Info,
                    "他のユーザーの変更を反映しました".to_string(),
                );
                true
            }
            PullOutcome::Unchanged => false,
        }
    }

    /// 変更後の保存と同期
    async fn commit(&mut self) {
        if let Persistence::Debounced(scheduler) = &mut self.persistence {
            scheduler.schedule(self.trip.clone());
            return;
        }

        self.trip.last_updated = Some(now_millis());
        self.persist_now();
        self.push();
    }

    /// 直ちにローカルへ保存する（失敗は通知のみ）
    fn persist_now(&mut self) {
        let result = self.store.save(&self.trip);
        let ok = result.is_ok();
        match &mut self.persistence {
            Persistence::Debounced(scheduler) => {
                if ok {
                    scheduler.mark_saved();
                }
            }
            Persistence::Immediate { saved } => *saved = ok,
        }

        if let Err(e) = result {
            error!("旅行データの保存に失敗しました: {}", e.details());
            self.notify(NotificationLevel::Error, e.user_message().to_string());
        }
    }

    /// 共有済みであれば現在の内容をプッシュタスクへ渡す
    ///
    /// 送信は待たない。失敗は `SyncEvent::PushFailed` として後から届く
    fn push(&self) {
        let Some(pushes) = &self.pushes else {
            return;
        };
        if self.trip.is_shared() {
            pushes.enqueue(self.trip.clone());
        }
    }

    /// 共有済みならポーリングを（再）開始する
    fn restart_polling(&mut self) {
        let (Some(sync), Some(document_id)) = (&self.sync, &self.trip.document_id) else {
            return;
        };
        if self
            .poll
            .as_ref()
            .is_some_and(|poll| poll.document_id() == document_id && poll.is_active())
        {
            return;
        }

        // 以前のハンドルはここでドロップされ、タスクが止まる
        self.poll = Some(sync.start_polling(document_id.clone(), self.events.clone()));
    }

    fn coordinator(&self) -> AppResult<SyncCoordinator> {
        self.sync
            .clone()
            .ok_or_else(|| AppError::configuration("共有機能は共同編集モードでのみ利用できます"))
    }

    fn notify(&mut self, level: NotificationLevel, message: String) {
        self.notifications.push(Notification { level, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{KeyValueStore, SqliteKeyValueStore};
    use crate::models::ExpenseCategory;
    use crate::services::local_store::TRIP_DATA_KEY;
    use crate::services::testing::InMemoryDocumentStore;
    use std::sync::Arc;
    use tempfile::TempDir;
    use url::Url;

    fn local_store() -> LocalStore {
        LocalStore::new(Arc::new(
            SqliteKeyValueStore::open_in_memory().expect("ストアの作成に失敗"),
        ))
    }

    fn coordinator(store: Arc<InMemoryDocumentStore>) -> SyncCoordinator {
        SyncCoordinator::new(
            store,
            Duration::from_secs(30),
            Url::parse("https://trips.example.com/").unwrap(),
        )
    }

    fn collaborative_view(
        local: LocalStore,
        remote: Arc<InMemoryDocumentStore>,
    ) -> (TripView, mpsc::UnboundedReceiver<SyncEvent>) {
        TripView::collaborative(local, coordinator(remote)).expect("ビューの作成に失敗")
    }

    fn hotel(amount: i64) -> NewExpense {
        NewExpense::new("Hotel Caribe", amount, ExpenseCategory::Hotel)
    }

    /// バックグラウンドのプッシュが終わるまで待つ
    async fn settle(view: &TripView) {
        while view.is_syncing() {
            tokio::task::yield_now().await;
        }
    }

    /// 旅行データの書き込みだけが失敗するストア
    struct TripWriteFailingStore {
        inner: SqliteKeyValueStore,
    }

    impl KeyValueStore for TripWriteFailingStore {
        fn get_item(&self, key: &str) -> AppResult<Option<String>> {
            self.inner.get_item(key)
        }

        fn set_item(&self, key: &str, value: &str) -> AppResult<()> {
            if key == TRIP_DATA_KEY {
                return Err(AppError::Database("disk full".to_string()));
            }
            self.inner.set_item(key, value)
        }
    }

    #[tokio::test]
    async fn test_budget_scenario() {
        let (mut view, _rx) =
            TripView::standalone(local_store(), Duration::from_secs(1)).unwrap();
        assert_eq!(view.trip().trip_name, "Mi Viaje");

        view.set_budget(1_000_000).await;
        assert!(view.add_expense(hotel(400_000)).await);

        let summary = view.summary();
        assert_eq!(summary.total_planned, 400_000);
        assert_eq!(summary.total_spent, 0);
        assert_eq!(summary.remaining_budget, 1_000_000);

        let id = view.trip().expenses[0].id.clone();
        assert!(view.toggle_expense_completed(&id).await);

        let summary = view.summary();
        assert_eq!(summary.total_spent, 400_000);
        assert_eq!(summary.remaining_budget, 600_000);
        assert_eq!(summary.progress_percent, 40.0);

        view.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_expense_is_rejected_silently() {
        let (mut view, _rx) =
            TripView::standalone(local_store(), Duration::from_secs(1)).unwrap();

        assert!(!view.add_expense(hotel(0)).await);
        assert!(!view.add_expense(hotel(-5)).await);
        assert!(!view
            .add_expense(NewExpense::new("", 100, ExpenseCategory::Lunch))
            .await);

        assert!(view.trip().expenses.is_empty());
        assert!(view.is_saved());
        assert!(view.notifications().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_standalone_saves_after_debounce() {
        let local = local_store();
        let (mut view, _rx) = TripView::standalone(local.clone(), Duration::from_secs(1)).unwrap();

        view.set_trip_name("Viaje a Medellín").await;
        assert!(!view.is_saved());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(view.is_saved());
        assert_eq!(
            local.load().map(|t| t.trip_name),
            Some("Viaje a Medellín".to_string())
        );
        // 単独モードでは最終更新時刻を付けない
        assert_eq!(view.trip().last_updated, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_save_and_shutdown_flush() {
        let local = local_store();
        let (mut view, _rx) = TripView::standalone(local.clone(), Duration::from_secs(1)).unwrap();

        view.set_budget(500_000).await;
        view.save_now().expect("手動保存に失敗");
        assert!(view.is_saved());
        assert_eq!(local.load().map(|t| t.budget), Some(500_000));

        view.set_budget(700_000).await;
        view.shutdown().await;
        assert_eq!(local.load().map(|t| t.budget), Some(700_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_debounced_save_is_notified() {
        let store = LocalStore::new(Arc::new(TripWriteFailingStore {
            inner: SqliteKeyValueStore::open_in_memory().expect("ストアの作成に失敗"),
        }));
        let (mut view, mut rx) = TripView::standalone(store, Duration::from_secs(1)).unwrap();

        view.set_budget(123).await;
        tokio::time::sleep(Duration::from_secs(3)).await;

        let event = rx.recv().await.expect("保存失敗のイベントが届きません");
        assert!(!view.handle_sync_event(event));
        assert!(!view.is_saved());
        let notifications = view.take_notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].level, NotificationLevel::Error);
    }

    #[tokio::test]
    async fn test_sharing_unavailable_in_standalone() {
        let (mut view, _rx) =
            TripView::standalone(local_store(), Duration::from_secs(1)).unwrap();

        assert!(matches!(view.share().await, Err(AppError::Configuration(_))));
        assert!(matches!(view.pull_now().await, Err(AppError::Configuration(_))));
        assert_eq!(view.sharing_status(), SharingStatus::Private);
    }

    #[tokio::test]
    async fn test_collaborative_edits_stamp_and_save_immediately() {
        let local = local_store();
        let remote = InMemoryDocumentStore::new();
        let (mut view, _rx) = collaborative_view(local.clone(), remote.clone());

        assert!(view.add_expense(hotel(250_000)).await);
        let expense = &view.trip().expenses[0];
        assert_eq!(expense.created_by.as_deref(), Some(view.user_alias()));
        assert!(expense.created_at.is_some());
        assert!(view.trip().last_updated.is_some());

        assert!(view.is_saved());
        assert_eq!(local.load().as_ref(), Some(view.trip()));
        // 未共有のためプッシュしない
        assert!(remote.replaced().is_empty());
    }

    #[tokio::test]
    async fn test_share_then_mutations_replace_remote() {
        let remote = InMemoryDocumentStore::new();
        let (mut view, _rx) = collaborative_view(local_store(), remote.clone());

        let link = view.share().await.expect("共有に失敗");
        assert_eq!(document_id_from_url(&link), Some("doc-1".to_string()));
        assert!(view.is_polling());
        assert!(!view.is_syncing());

        view.set_trip_name("Eje Cafetero").await;
        settle(&view).await;
        assert!(view.add_expense(hotel(90_000)).await);
        settle(&view).await;

        let replaced = remote.replaced();
        assert_eq!(replaced.len(), 2);
        assert!(replaced.iter().all(|(id, _)| id == "doc-1"));
        assert_eq!(replaced[1].1, *view.trip());

        // 2回目の共有は既存のリンクを返し、作成は1回だけ
        assert_eq!(view.share().await.unwrap(), link);
        assert_eq!(remote.create_count(), 1);
        assert_eq!(
            view.sharing_status(),
            SharingStatus::Shared {
                document_id: "doc-1".to_string(),
                link,
            }
        );
    }

    #[tokio::test]
    async fn test_share_failure_keeps_trip_private() {
        let remote = InMemoryDocumentStore::new();
        remote.set_failing(true);
        let (mut view, _rx) = collaborative_view(local_store(), remote);

        assert!(view.share().await.is_err());
        assert_eq!(view.sharing_status(), SharingStatus::Private);
        assert!(!view.is_polling());

        // 明示的な操作の失敗は通知ではなくエラーとして返す
        assert!(view.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_expense_neither_saves_nor_pushes() {
        let remote = InMemoryDocumentStore::new();
        let (mut view, _rx) = collaborative_view(local_store(), remote.clone());
        view.share().await.unwrap();
        let before = view.trip().clone();

        assert!(!view.delete_expense("no-such-expense").await);
        assert!(!view.toggle_expense_completed("no-such-expense").await);

        assert_eq!(view.trip(), &before);
        assert!(remote.replaced().is_empty());
    }

    #[tokio::test]
    async fn test_push_failure_is_notified_without_retry() {
        let local = local_store();
        let remote = InMemoryDocumentStore::new();
        let (mut view, mut rx) = collaborative_view(local.clone(), remote.clone());
        view.share().await.unwrap();
        view.take_notifications();

        remote.set_failing(true);
        view.set_budget(2_000_000).await;
        assert_eq!(local.load().map(|t| t.budget), Some(2_000_000));

        let event = rx.recv().await.expect("プッシュ失敗のイベントが届きません");
        assert!(!view.handle_sync_event(event));
        assert!(!view.is_syncing());
        let notifications = view.take_notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].level, NotificationLevel::Error);
        assert!(remote.replaced().is_empty());
    }

    #[tokio::test]
    async fn test_hung_push_does_not_block_edits() {
        let remote = InMemoryDocumentStore::new();
        let (mut view, _rx) = collaborative_view(local_store(), remote.clone());
        view.share().await.unwrap();
        remote.set_hanging(true);

        view.set_budget(5).await;
        tokio::task::yield_now().await;
        assert!(view.is_syncing());

        view.set_trip_name("Segundo").await;
        assert_eq!(view.trip().trip_name, "Segundo");
        assert_eq!(view.trip().budget, 5);
        assert!(view.is_syncing());
        assert!(remote.replaced().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_request_clears_syncing() {
        let local = local_store();
        local
            .save(&Trip {
                last_updated: Some(1),
                document_id: Some("doc-1".to_string()),
                ..Trip::default()
            })
            .unwrap();
        let remote = InMemoryDocumentStore::new();
        remote.set_hanging(true);
        let (mut view, _rx) = collaborative_view(local, remote);

        let pull = tokio::time::timeout(Duration::from_millis(100), view.pull_now()).await;
        assert!(pull.is_err());
        assert!(!view.is_syncing());
    }

    #[tokio::test]
    async fn test_sync_events_apply_newer_remote_only() {
        let local = local_store();
        local
            .save(&Trip {
                trip_name: "local".to_string(),
                last_updated: Some(100),
                document_id: Some("doc-1".to_string()),
                ..Trip::default()
            })
            .unwrap();
        let (mut view, _rx) = collaborative_view(local.clone(), InMemoryDocumentStore::new());

        let newer = Trip {
            trip_name: "remote".to_string(),
            last_updated: Some(200),
            document_id: Some("doc-1".to_string()),
            ..Trip::default()
        };
        assert!(view.handle_sync_event(SyncEvent::RemoteFetched(newer.clone())));
        assert_eq!(view.trip(), &newer);
        assert_eq!(local.load(), Some(newer));
        assert_eq!(view.take_notifications().len(), 1);

        let older = Trip {
            trip_name: "stale".to_string(),
            last_updated: Some(100),
            document_id: Some("doc-1".to_string()),
            ..Trip::default()
        };
        assert!(!view.handle_sync_event(SyncEvent::RemoteFetched(older)));
        assert_eq!(view.trip().trip_name, "remote");
        assert!(view.notifications().is_empty());

        assert!(!view.handle_sync_event(SyncEvent::PollFailed("通信失敗".to_string())));
        assert_eq!(view.take_notifications()[0].message, "通信失敗");

        assert!(!view.handle_sync_event(SyncEvent::PushFailed("更新失敗".to_string())));
        let notifications = view.take_notifications();
        assert_eq!(notifications[0].level, NotificationLevel::Error);
        assert_eq!(notifications[0].message, "更新失敗");
    }

    #[tokio::test]
    async fn test_sync_event_for_other_document_is_ignored() {
        let local = local_store();
        local
            .save(&Trip {
                document_id: Some("doc-1".to_string()),
                ..Trip::default()
            })
            .unwrap();
        let (mut view, _rx) = collaborative_view(local, InMemoryDocumentStore::new());

        let other = Trip {
            trip_name: "other".to_string(),
            last_updated: Some(i64::MAX),
            document_id: Some("doc-2".to_string()),
            ..Trip::default()
        };
        assert!(!view.handle_sync_event(SyncEvent::RemoteFetched(other)));
        assert_eq!(view.trip().trip_name, "Mi Viaje");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_trip_starts_polling_on_open() {
        let local = local_store();
        local
            .save(&Trip {
                last_updated: Some(100),
                document_id: Some("doc-1".to_string()),
                ..Trip::default()
            })
            .unwrap();
        let remote = InMemoryDocumentStore::new();
        remote.insert(
            "doc-1",
            Trip {
                trip_name: "desde otro equipo".to_string(),
                last_updated: Some(500),
                ..Trip::default()
            },
        );

        let (mut view, mut rx) = collaborative_view(local, remote.clone());
        assert!(view.is_polling());

        let event = rx.recv().await.expect("ポーリングイベントが届きません");
        assert!(view.handle_sync_event(event));
        assert_eq!(view.trip().trip_name, "desde otro equipo");
        assert_eq!(view.trip().document_id.as_deref(), Some("doc-1"));
        assert_eq!(remote.fetch_count(), 1);

        view.shutdown().await;
    }

    #[tokio::test]
    async fn test_pull_now() {
        let local = local_store();
        local
            .save(&Trip {
                last_updated: Some(200),
                document_id: Some("doc-1".to_string()),
                ..Trip::default()
            })
            .unwrap();
        let remote = InMemoryDocumentStore::new();
        remote.insert(
            "doc-1",
            Trip {
                trip_name: "older".to_string(),
                last_updated: Some(100),
                ..Trip::default()
            },
        );
        let (mut view, _rx) = collaborative_view(local, remote.clone());

        assert!(!view.pull_now().await.unwrap());
        assert_eq!(view.trip().trip_name, "Mi Viaje");

        remote.set_failing(true);
        assert!(matches!(
            view.pull_now().await,
            Err(AppError::ExternalService(_))
        ));
        assert!(!view.is_syncing());
    }

    #[tokio::test]
    async fn test_open_share_link_adopts_document() {
        let local = local_store();
        let remote = InMemoryDocumentStore::new();
        remote.insert(
            "doc-42",
            Trip {
                trip_name: "Tayrona".to_string(),
                budget: 3_000_000,
                last_updated: Some(7),
                ..Trip::default()
            },
        );
        let (mut view, _rx) = collaborative_view(local.clone(), remote);

        view.open_share_link("https://trips.example.com/?trip=doc-42")
            .await
            .expect("共有リンクの読み込みに失敗");

        assert_eq!(view.trip().trip_name, "Tayrona");
        assert_eq!(view.trip().document_id.as_deref(), Some("doc-42"));
        assert_eq!(local.load().as_ref(), Some(view.trip()));
        assert!(view.is_polling());

        let missing = view.open_share_link("https://trips.example.com/").await;
        assert!(matches!(missing, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_import_into_shared_trip_keeps_document_and_pushes() {
        let remote = InMemoryDocumentStore::new();
        let (mut view, _rx) = collaborative_view(local_store(), remote.clone());
        view.share().await.unwrap();

        let file = r#"{"tripName": "Importado", "budget": 10, "expenses": []}"#;
        view.import_json(file).await.expect("インポートに失敗");
        settle(&view).await;

        assert_eq!(view.trip().trip_name, "Importado");
        assert_eq!(view.trip().document_id.as_deref(), Some("doc-1"));
        let replaced = remote.replaced();
        assert_eq!(replaced.len(), 1);
        assert_eq!(replaced[0].1.trip_name, "Importado");
    }

    #[tokio::test]
    async fn test_invalid_import_leaves_state_untouched() {
        let (mut view, _rx) =
            TripView::standalone(local_store(), Duration::from_secs(1)).unwrap();
        view.set_trip_name("Antes").await;
        let before = view.trip().clone();

        let result = view.import_json("{ definitely not json").await;
        assert!(matches!(result, Err(AppError::Import(_))));
        assert_eq!(view.trip(), &before);
    }

    #[tokio::test]
    async fn test_export_to_dir_then_import_file() {
        let temp_dir = TempDir::new().unwrap();
        let (mut view, _rx) =
            TripView::standalone(local_store(), Duration::from_secs(1)).unwrap();
        view.set_trip_name("Costa Pacífica").await;
        view.set_budget(1_200_000).await;
        assert!(view.add_expense(hotel(300_000)).await);
        let exported = view.trip().clone();

        let path = view.export_to_dir(temp_dir.path()).expect("エクスポートに失敗");
        assert!(view.export().unwrap().file_name.starts_with("Costa_Pacífica_"));

        let (mut other, _rx2) =
            TripView::standalone(local_store(), Duration::from_secs(1)).unwrap();
        other.import_file(&path).await.expect("インポートに失敗");
        assert_eq!(other.trip(), &exported);
    }
}
