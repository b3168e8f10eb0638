// 保存デバウンスモジュール

use crate::models::Trip;
use crate::services::local_store::LocalStore;
use crate::services::sync::SyncEvent;
use log::{debug, error};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// 連続した編集をまとめ、一定時間操作がなかったときだけ保存する
///
/// 保存要求には世代番号を付け、即時保存で既に書き込まれた世代は再保存しない
pub struct SaveScheduler {
    sender: mpsc::UnboundedSender<(u64, Trip)>,
    requested: u64,
    saved: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl SaveScheduler {
    /// デバウンス保存タスクを開始する
    ///
    /// # 引数
    /// * `store` - 保存先のローカルストア
    /// * `delay` - 最後の編集から保存までの待機時間
    /// * `events` - 保存の失敗を `SyncEvent::SaveFailed` として送る先
    pub fn new(
        store: LocalStore,
        delay: Duration,
        events: mpsc::UnboundedSender<SyncEvent>,
    ) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<(u64, Trip)>();
        let saved = Arc::new(AtomicU64::new(0));
        let task_saved = Arc::clone(&saved);

        let task = tokio::spawn(async move {
            while let Some((mut generation, mut trip)) = receiver.recv().await {
                let mut closed = false;
                loop {
                    tokio::select! {
                        next = receiver.recv() => match next {
                            // 新しい編集が来たらタイマーをやり直す
                            Some((next_generation, next_trip)) => {
                                generation = next_generation;
                                trip = next_trip;
                            }
                            None => {
                                closed = true;
                                break;
                            }
                        },
                        _ = tokio::time::sleep(delay) => break,
                    }
                }

                if task_saved.load(Ordering::SeqCst) >= generation {
                    debug!("保存済みの世代のため書き込みを省略します: generation={generation}");
                } else {
                    match store.save(&trip) {
                        Ok(()) => {
                            task_saved.fetch_max(generation, Ordering::SeqCst);
                            debug!("デバウンス保存が完了しました: generation={generation}");
                        }
                        Err(e) => {
                            error!("デバウンス保存に失敗しました: {}", e.details());
                            let event = SyncEvent::SaveFailed(e.user_message().to_string());
                            if events.send(event).is_err() {
                                debug!("イベント受信側が終了しています");
                            }
                        }
                    }
                }

                if closed {
                    break;
                }
            }
        });

        Self {
            sender,
            requested: 0,
            saved,
            task,
        }
    }

    /// 保存を予約する（待機中の予約は新しい内容で置き換わる）
    pub fn schedule(&mut self, trip: Trip) {
        self.requested += 1;
        if self.sender.send((self.requested, trip)).is_err() {
            error!("保存タスクが停止しているため、保存を予約できません");
        }
    }

    /// 現在までの予約が別経路で保存されたことを記録する
    pub fn mark_saved(&self) {
        self.saved.fetch_max(self.requested, Ordering::SeqCst);
    }

    /// 予約済みの変更がすべて保存されているか
    pub fn is_saved(&self) -> bool {
        self.saved.load(Ordering::SeqCst) >= self.requested
    }

    /// 待機中の変更を書き込んでからタスクを終了する
    pub async fn shutdown(self) {
        let Self { sender, task, .. } = self;
        drop(sender);
        if let Err(e) = task.await {
            error!("保存タスクの終了待ちに失敗しました: {e}");
        }
    }
}
