use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 経費カテゴリ
///
/// 旧バージョンのエクスポートファイルはスペイン語名で保存されているため、読み込み時のみ別名を受け付ける
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpenseCategory {
    Hotel,
    #[serde(alias = "Desayuno")]
    Breakfast,
    #[serde(alias = "Almuerzo")]
    Lunch,
    #[serde(alias = "Cena")]
    Dinner,
    #[serde(alias = "Entradas")]
    Admissions,
    #[serde(alias = "Gasolina")]
    Fuel,
    #[serde(alias = "Peajes")]
    Tolls,
    #[serde(alias = "Transporte")]
    Transport,
    #[serde(alias = "Compras")]
    Shopping,
    #[serde(alias = "Otros")]
    Other,
}

impl ExpenseCategory {
    /// 全カテゴリ（入力フォームの表示順）
    pub const ALL: [ExpenseCategory; 10] = [
        ExpenseCategory::Hotel,
        ExpenseCategory::Breakfast,
        ExpenseCategory::Lunch,
        ExpenseCategory::Dinner,
        ExpenseCategory::Admissions,
        ExpenseCategory::Fuel,
        ExpenseCategory::Tolls,
        ExpenseCategory::Transport,
        ExpenseCategory::Shopping,
        ExpenseCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseCategory::Hotel => "Hotel",
            ExpenseCategory::Breakfast => "Breakfast",
            ExpenseCategory::Lunch => "Lunch",
            ExpenseCategory::Dinner => "Dinner",
            ExpenseCategory::Admissions => "Admissions",
            ExpenseCategory::Fuel => "Fuel",
            ExpenseCategory::Tolls => "Tolls",
            ExpenseCategory::Transport => "Transport",
            ExpenseCategory::Shopping => "Shopping",
            ExpenseCategory::Other => "Other",
        }
    }

    fn legacy_name(&self) -> &'static str {
        match self {
            ExpenseCategory::Hotel => "Hotel",
            ExpenseCategory::Breakfast => "Desayuno",
            ExpenseCategory::Lunch => "Almuerzo",
            ExpenseCategory::Dinner => "Cena",
            ExpenseCategory::Admissions => "Entradas",
            ExpenseCategory::Fuel => "Gasolina",
            ExpenseCategory::Tolls => "Peajes",
            ExpenseCategory::Transport => "Transporte",
            ExpenseCategory::Shopping => "Compras",
            ExpenseCategory::Other => "Otros",
        }
    }
}

impl Default for ExpenseCategory {
    fn default() -> Self {
        ExpenseCategory::Hotel
    }
}

impl fmt::Display for ExpenseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpenseCategory {
    type Err = String;

    /// 英語名・スペイン語名のどちらでも、大文字小文字を区別せずに解析する
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let needle = value.trim();
        ExpenseCategory::ALL
            .iter()
            .copied()
            .find(|category| {
                category.as_str().eq_ignore_ascii_case(needle)
                    || category.legacy_name().eq_ignore_ascii_case(needle)
            })
            .ok_or_else(|| {
                let names: Vec<&str> = ExpenseCategory::ALL.iter().map(|c| c.as_str()).collect();
                format!(
                    "不明なカテゴリです: {value}（指定可能: {}）",
                    names.join(", ")
                )
            })
    }
}

/// 経費データモデル
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    /// 作成時刻（エポックミリ秒）から生成された識別子
    pub id: String,
    pub description: String,
    /// 金額（最小通貨単位）
    pub amount: i64,
    #[serde(rename = "type")]
    pub category: ExpenseCategory,
    #[serde(default)]
    pub completed: bool,
    /// 作成したユーザー名（共同編集モードのみ）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// 作成時刻（エポックミリ秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

/// 経費作成用DTO（入力フォームの内容）
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewExpense {
    pub description: String,
    pub amount: i64,
    pub category: ExpenseCategory,
}

impl NewExpense {
    pub fn new(description: impl Into<String>, amount: i64, category: ExpenseCategory) -> Self {
        Self {
            description: description.into(),
            amount,
            category,
        }
    }

    /// 入力値が追加可能かどうかを判定する
    ///
    /// 説明が空文字列、または金額が0以下の場合は追加しない
    pub fn is_valid(&self) -> bool {
        !self.description.is_empty() && self.amount > 0
    }
}
