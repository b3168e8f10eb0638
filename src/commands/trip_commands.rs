use crate::cli::Command;
use crate::models::NewExpense;
use crate::services::{format_currency, NotificationLevel, SharingStatus, TripView};
use crate::shared::errors::AppResult;
use std::io::Write;

/// 1つのコマンドを旅行ビューに適用し、結果を出力する
///
/// # 引数
/// * `view` - 旅行ビュー
/// * `command` - 実行するコマンド（`Session` は呼び出し側で処理する）
/// * `out` - 出力先
///
/// # 戻り値
/// 成功時はOk、失敗時はエラー（通知は出力済み）
pub async fn execute<W: Write>(
    view: &mut TripView,
    command: Command,
    out: &mut W,
) -> AppResult<()> {
    let result = dispatch(view, command, out).await;
    write_notifications(view, out)?;
    result
}

async fn dispatch<W: Write>(view: &mut TripView, command: Command, out: &mut W) -> AppResult<()> {
    match command {
        Command::Show | Command::Session => {
            write!(out, "{}", render_trip(view))?;
        }
        Command::Name { name } => {
            view.set_trip_name(name.join(" ")).await;
            writeln!(out, "旅行名: {}", view.trip().trip_name)?;
        }
        Command::Budget { amount } => {
            view.set_budget(amount).await;
            writeln!(out, "予算: {}", format_currency(view.trip().budget))?;
        }
        Command::Add {
            category,
            amount,
            description,
        } => {
            let new_expense = NewExpense::new(description.join(" "), amount, category);
            if view.add_expense(new_expense).await {
                if let Some(expense) = view.trip().expenses.last() {
                    writeln!(
                        out,
                        "追加しました: {} {} {}",
                        expense.id,
                        expense.category,
                        format_currency(expense.amount)
                    )?;
                }
            }
        }
        Command::Toggle { id } => {
            if view.toggle_expense_completed(&id).await {
                writeln!(out, "完了状態を切り替えました: {id}")?;
            }
        }
        Command::Delete { id } => {
            if view.delete_expense(&id).await {
                writeln!(out, "削除しました: {id}")?;
            }
        }
        Command::Export { dir } => {
            let path = view.export_to_dir(&dir)?;
            writeln!(out, "エクスポートしました: {}", path.display())?;
        }
        Command::Import { path } => {
            view.import_file(&path).await?;
            writeln!(out, "インポートしました: {}", view.trip().trip_name)?;
        }
        Command::Save => {
            view.save_now()?;
            writeln!(out, "保存しました")?;
        }
        Command::Share => {
            let link = view.share().await?;
            writeln!(out, "共有リンク: {link}")?;
        }
        Command::Open { link } => {
            view.open_share_link(&link).await?;
            write!(out, "{}", render_trip(view))?;
        }
        Command::Pull => {
            if !view.pull_now().await? {
                writeln!(out, "変更はありません")?;
            }
        }
    }
    Ok(())
}

/// 旅行の内容と集計を表示用の文字列にする
pub fn render_trip(view: &TripView) -> String {
    let trip = view.trip();
    let summary = view.summary();
    let mut text = String::new();

    text.push_str(&format!("== {} ==\n", trip.trip_name));
    text.push_str(&format!("予算:     {}\n", format_currency(trip.budget)));
    text.push_str(&format!(
        "予定合計: {}\n",
        format_currency(summary.total_planned)
    ));
    text.push_str(&format!("支出済み: {}\n", format_currency(summary.total_spent)));
    text.push_str(&format!(
        "残り:     {}\n",
        format_currency(summary.remaining_budget)
    ));
    text.push_str(&format!("進捗:     {:.0}%\n", summary.progress_percent));

    if trip.expenses.is_empty() {
        text.push_str("経費はまだありません\n");
    }
    for expense in &trip.expenses {
        let mark = if expense.completed { "x" } else { " " };
        text.push_str(&format!(
            "[{mark}] {} {:<10} {:>14}  {}",
            expense.id,
            expense.category.as_str(),
            format_currency(expense.amount),
            expense.description
        ));
        if let Some(created_by) = &expense.created_by {
            text.push_str(&format!(" ({created_by})"));
        }
        text.push('\n');
    }

    match view.sharing_status() {
        SharingStatus::Private => text.push_str("共有: なし\n"),
        SharingStatus::Shared { link, .. } => text.push_str(&format!("共有: {link}\n")),
    }
    text.push_str(&format!(
        "保存: {}\n",
        if view.is_saved() { "済み" } else { "未保存" }
    ));
    if view.is_syncing() {
        text.push_str("同期中...\n");
    }

    text
}

/// 溜まった通知を出力して閉じる
pub fn write_notifications<W: Write>(view: &mut TripView, out: &mut W) -> AppResult<()> {
    for notification in view.take_notifications() {
        let label = match notification.level {
            NotificationLevel::Info => "お知らせ",
            NotificationLevel::Error => "エラー",
        };
        writeln!(out, "[{label}] {}", notification.message)?;
    }
    Ok(())
}
