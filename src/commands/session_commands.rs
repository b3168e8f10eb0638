use super::trip_commands::{execute, render_trip, write_notifications};
use crate::cli::{Command, SessionLine};
use crate::services::{SyncEvent, TripView};
use crate::shared::errors::AppResult;
use clap::Parser;
use log::{debug, info};
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

/// 対話モード
///
/// 入力の1行を1コマンドとして実行しつつ、ポーリングからの同期イベントを
/// 同じループで反映する。入力の終端、または `quit` / `exit` で終了する
pub async fn run_session<R, W>(
    view: &mut TripView,
    events: &mut mpsc::UnboundedReceiver<SyncEvent>,
    input: R,
    out: &mut W,
) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    info!("対話モードを開始します");
    let mut lines = input.lines();
    write!(out, "{}", render_trip(view))?;
    out.flush()?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if matches!(line, "quit" | "exit") {
                    break;
                }

                match SessionLine::try_parse_from(line.split_whitespace()) {
                    Ok(SessionLine { command: Command::Session }) => {
                        writeln!(out, "既に対話モードです")?;
                    }
                    Ok(SessionLine { command }) => {
                        if let Err(e) = execute(view, command, out).await {
                            writeln!(out, "エラー: {}", e.user_message())?;
                        }
                    }
                    Err(e) => write!(out, "{e}")?,
                }
            }
            Some(event) = events.recv() => {
                debug!("同期イベントを受信しました: {event:?}");
                if view.handle_sync_event(event) {
                    write!(out, "{}", render_trip(view))?;
                }
                write_notifications(view, out)?;
            }
        }
        out.flush()?;
    }

    info!("対話モードを終了します");
    Ok(())
}
