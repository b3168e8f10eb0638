use super::expense::Expense;
use serde::{Deserialize, Serialize};

/// 新規旅行の既定名
pub const DEFAULT_TRIP_NAME: &str = "Mi Viaje";

/// 旅行データモデル（永続化・転送の単位）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub trip_name: String,
    /// 予算（検証なし、0や負数も許容）
    pub budget: i64,
    /// 追加順に並んだ経費
    #[serde(default)]
    pub expenses: Vec<Expense>,
    /// 最終更新時刻（エポックミリ秒、共同編集モードのみ）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<i64>,
    /// 共有ドキュメントID（共有済みの場合のみ）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

impl Default for Trip {
    fn default() -> Self {
        Self {
            trip_name: DEFAULT_TRIP_NAME.to_string(),
            budget: 0,
            expenses: Vec::new(),
            last_updated: None,
            document_id: None,
        }
    }
}

/// 表示用の集計値（保存しない）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TripSummary {
    /// 全経費の合計
    pub total_planned: i64,
    /// 完了済み経費の合計
    pub total_spent: i64,
    /// 予算 − 完了済み合計
    pub remaining_budget: i64,
    /// 予算消化率（0〜100）
    pub progress_percent: f64,
}

impl Trip {
    /// 集計値を計算する
    pub fn summary(&self) -> TripSummary {
        let total_planned = saturating_sum(self.expenses.iter().map(|e| e.amount));
        let total_spent = saturating_sum(
            self.expenses
                .iter()
                .filter(|e| e.completed)
                .map(|e| e.amount),
        );

        let progress_percent = if self.budget > 0 {
            (total_spent as f64 / self.budget as f64 * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        TripSummary {
            total_planned,
            total_spent,
            remaining_budget: self.budget.saturating_sub(total_spent),
            progress_percent,
        }
    }

    pub fn find_expense(&self, id: &str) -> Option<&Expense> {
        self.expenses.iter().find(|e| e.id == id)
    }

    /// 作成時刻から一意な経費IDを生成する
    ///
    /// 同一ミリ秒内の連続追加で衝突した場合は、空きが見つかるまで1ずつ進める
    pub fn next_expense_id(&self, now_millis: i64) -> String {
        let mut candidate = now_millis;
        while self.find_expense(&candidate.to_string()).is_some() {
            candidate += 1;
        }
        candidate.to_string()
    }

    /// 経費を末尾に追加する
    pub fn add_expense(&mut self, expense: Expense) {
        self.expenses.push(expense);
    }

    /// 経費の完了状態を反転する
    ///
    /// # 戻り値
    /// 該当する経費があればtrue
    pub fn toggle_expense(&mut self, id: &str) -> bool {
        match self.expenses.iter_mut().find(|e| e.id == id) {
            Some(expense) => {
                expense.completed = !expense.completed;
                true
            }
            None => false,
        }
    }

    /// 経費を削除する
    ///
    /// # 戻り値
    /// 該当する経費があればtrue（存在しないIDの場合は何もしない）
    pub fn remove_expense(&mut self, id: &str) -> bool {
        let before = self.expenses.len();
        self.expenses.retain(|e| e.id != id);
        self.expenses.len() != before
    }

    /// 比較用の最終更新時刻（未設定は0）
    pub fn last_updated_or_zero(&self) -> i64 {
        self.last_updated.unwrap_or(0)
    }

    pub fn is_shared(&self) -> bool {
        self.document_id.is_some()
    }
}

fn saturating_sum(values: impl Iterator<Item = i64>) -> i64 {
    values.fold(0i64, |acc, v| acc.saturating_add(v))
}
