// 共有ドキュメント同期モジュール

use crate::models::Trip;
use crate::services::document_client::DocumentStore;
use crate::shared::errors::{AppError, AppResult};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use url::Url;

/// 共有リンクでドキュメントIDを運ぶクエリパラメータ名
pub const SHARE_QUERY_PARAM: &str = "trip";

/// 競合時に採用される側
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncWinner {
    Local,
    Remote,
}

/// ローカルとリモートのどちらを採用するかを決める唯一の競合解決ポリシー
///
/// リモートの最終更新時刻がローカルより厳密に大きい場合のみリモートが全体として勝つ
/// （未設定は0として扱う）。フィールド単位のマージは行わないため、
/// 同じポーリング間隔内の別々の編集は一方がまとめて失われる
pub fn resolve(local: &Trip, remote: &Trip) -> SyncWinner {
    if remote.last_updated_or_zero() > local.last_updated_or_zero() {
        SyncWinner::Remote
    } else {
        SyncWinner::Local
    }
}

/// プル結果
#[derive(Debug, Clone, PartialEq)]
pub enum PullOutcome {
    /// リモートが新しいため、ローカルを置き換える
    Replaced(Trip),
    /// ローカルが同じか新しいため何もしない
    Unchanged,
}

/// バックグラウンドタスクから旅行ビューへ届くイベント
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// リモートドキュメントを取得した
    RemoteFetched(Trip),
    /// 取得に失敗した（今回の試行は破棄）
    PollFailed(String),
    /// 変更のプッシュに失敗した（再送はしない）
    PushFailed(String),
    /// デバウンス保存に失敗した
    SaveFailed(String),
}

/// 進行中の共有サーバー要求の数
///
/// 要求ごとに `begin` でガードを取り、ガードのドロップで終了とみなす。
/// 要求を待っているフューチャーが途中で破棄されても数は戻る
#[derive(Debug, Clone, Default)]
pub struct SyncActivity {
    in_flight: Arc<AtomicUsize>,
}

impl SyncActivity {
    pub fn begin(&self) -> ActivityGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        ActivityGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    pub fn is_active(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }
}

#[derive(Debug)]
pub struct ActivityGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 変更を順番にリモートへ送るプッシュタスクの送信口
///
/// 送信待ちの間に新しい変更が届いた場合は最新の内容だけを送る。
/// 要求が応答しなくても呼び出し側の編集は止まらない
pub struct PushQueue {
    sender: mpsc::UnboundedSender<(Trip, ActivityGuard)>,
    activity: SyncActivity,
    task: JoinHandle<()>,
}

impl PushQueue {
    /// 旅行データのスナップショットをプッシュ待ちに入れる
    pub fn enqueue(&self, trip: Trip) {
        let guard = self.activity.begin();
        if self.sender.send((trip, guard)).is_err() {
            error!("プッシュタスクが停止しているため、変更を送れません");
        }
    }

    /// 送信待ちの変更を送り終えてからタスクを終了する
    pub async fn shutdown(self) {
        let Self { sender, task, .. } = self;
        drop(sender);
        if let Err(e) = task.await {
            error!("プッシュタスクの終了待ちに失敗しました: {e}");
        }
    }
}

/// 共有リンクからドキュメントIDを取り出す
///
/// # 戻り値
/// `trip` パラメータが空でなければそのID
pub fn document_id_from_url(link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == SHARE_QUERY_PARAM)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// ポーリングタスクの所有ハンドル
///
/// ドロップまたは `cancel` でタスクを停止する。共有状態の寿命と同じだけ保持する
#[derive(Debug)]
pub struct PollHandle {
    document_id: String,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.task.is_finished()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// ローカルの旅行データと共有ドキュメントを調停する
#[derive(Clone)]
pub struct SyncCoordinator {
    store: Arc<dyn DocumentStore>,
    poll_interval: Duration,
    share_base_url: Url,
}

impl SyncCoordinator {
    pub fn new(store: Arc<dyn DocumentStore>, poll_interval: Duration, share_base_url: Url) -> Self {
        Self {
            store,
            poll_interval,
            share_base_url,
        }
    }

    /// ドキュメントIDを含む共有リンクを作成する
    pub fn share_url(&self, document_id: &str) -> String {
        let mut url = self.share_base_url.clone();
        let retained: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != SHARE_QUERY_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (key, value) in &retained {
                pairs.append_pair(key, value);
            }
            pairs.append_pair(SHARE_QUERY_PARAM, document_id);
        }
        url.to_string()
    }

    /// 共有ドキュメントを取得し、ローカル状態を丸ごと置き換えるための旅行データを返す
    pub async fn adopt(&self, document_id: &str) -> AppResult<Trip> {
        info!("共有ドキュメントを取り込みます: id={document_id}");
        let mut trip = self.store.fetch(document_id).await?;
        trip.document_id = Some(document_id.to_string());
        Ok(trip)
    }

    /// 初回共有: 旅行データをリモートに作成し、採番されたIDを付与する
    ///
    /// # 戻り値
    /// 採番されたドキュメントID。既に共有済みの場合はバリデーションエラー
    pub async fn publish(&self, trip: &mut Trip) -> AppResult<String> {
        if let Some(existing) = &trip.document_id {
            return Err(AppError::validation(format!(
                "この旅行は既に共有されています: {existing}"
            )));
        }

        if trip.last_updated.is_none() {
            trip.last_updated = Some(Utc::now().timestamp_millis());
        }

        let document_id = self.store.create(trip).await?;
        trip.document_id = Some(document_id.clone());
        info!("旅行を共有しました: id={document_id}");
        Ok(document_id)
    }

    /// ローカル変更をリモートへ全体置換で送る（未共有の場合は何もしない）
    pub async fn push(&self, trip: &Trip) -> AppResult<()> {
        let Some(document_id) = trip.document_id.as_deref() else {
            debug!("未共有の旅行のためプッシュを省略します");
            return Ok(());
        };
        self.store.replace(document_id, trip).await
    }

    /// リモートを取得し、新しければ置き換え用のデータを返す
    pub async fn pull(&self, local: &Trip) -> AppResult<PullOutcome> {
        let Some(document_id) = local.document_id.as_deref() else {
            return Ok(PullOutcome::Unchanged);
        };

        let remote = self.store.fetch(document_id).await?;
        Ok(reconcile(local, remote))
    }

    /// プッシュタスクを開始する
    ///
    /// # 引数
    /// * `activity` - 送信中の要求を数えるカウンター（同期中表示に使う）
    /// * `events` - 失敗を `SyncEvent::PushFailed` として送る先
    pub fn start_pushing(
        &self,
        activity: SyncActivity,
        events: mpsc::UnboundedSender<SyncEvent>,
    ) -> PushQueue {
        let (sender, mut receiver) = mpsc::unbounded_channel::<(Trip, ActivityGuard)>();
        let coordinator = self.clone();

        let task = tokio::spawn(async move {
            while let Some((mut trip, mut guard)) = receiver.recv().await {
                // 溜まっている古いスナップショットは最新の内容で置き換える
                while let Ok((newer, newer_guard)) = receiver.try_recv() {
                    trip = newer;
                    guard = newer_guard;
                }

                if let Err(e) = coordinator.push(&trip).await {
                    warn!("共有ドキュメントの更新に失敗しました: {}", e.details());
                    if events
                        .send(SyncEvent::PushFailed(e.user_message().to_string()))
                        .is_err()
                    {
                        debug!("イベント受信側が終了しています");
                    }
                }
                drop(guard);
            }
            debug!("プッシュタスクを終了しました");
        });

        PushQueue {
            sender,
            activity,
            task,
        }
    }

    /// 一定間隔でリモートを取得し、結果をイベントとして送るタスクを開始する
    ///
    /// 最初の取得は開始から1間隔後。イベントの受信側が閉じるかハンドルが
    /// キャンセルされると終了する
    pub fn start_polling(
        &self,
        document_id: String,
        events: mpsc::UnboundedSender<SyncEvent>,
    ) -> PollHandle {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let store = Arc::clone(&self.store);
        let period = self.poll_interval;
        let task_document_id = document_id.clone();

        info!(
            "共有ドキュメントのポーリングを開始します: id={document_id}, interval={period:?}"
        );

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => {
                        debug!("ポーリングを停止しました: id={task_document_id}");
                        break;
                    }
                    _ = ticker.tick() => {}
                }

                let event = match store.fetch(&task_document_id).await {
                    Ok(mut remote) => {
                        remote.document_id = Some(task_document_id.clone());
                        SyncEvent::RemoteFetched(remote)
                    }
                    Err(e) => {
                        warn!("共有ドキュメントの取得に失敗しました: {}", e.details());
                        SyncEvent::PollFailed(e.user_message().to_string())
                    }
                };

                if events.send(event).is_err() {
                    debug!("イベント受信側が終了したため、ポーリングを停止します");
                    break;
                }
            }
        });

        PollHandle {
            document_id,
            token,
            task,
        }
    }
}

/// 取得済みのリモートデータとローカルを比較する
pub fn reconcile(local: &Trip, mut remote: Trip) -> PullOutcome {
    match resolve(local, &remote) {
        SyncWinner::Remote => {
            if remote.document_id.is_none() {
                remote.document_id = local.document_id.clone();
            }
            PullOutcome::Replaced(remote)
        }
        SyncWinner::Local => PullOutcome::Unchanged,
    }
}
