use std::sync::Arc;

use teloxide::prelude::*;

use starbot_core::{
    domain::ChatId,
    formatting::{escape_html, format_amount},
    messaging::types::{InlineButton, InlineKeyboard},
};

use crate::handlers::display_of;
use crate::router::AppState;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

pub async fn handle_command(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let chat_id = msg.chat.id.0;
    let user_id = user.id.0 as i64;
    let (cmd, _args) = parse_command(msg.text().unwrap_or(""));

    match cmd.as_str() {
        "start" => {
            let seen = state.store.has_seen_channel(user_id).await.unwrap_or(false);
            if !seen {
                let text = format!(
                    "👋 Welcome, {name}!\n\n\
                     To continue, join our channel first:\n{link}",
                    name = escape_html(&display_of(user)),
                    link = escape_html(&state.cfg.channel_link),
                );
                let keyboard = InlineKeyboard::new(vec![InlineButton {
                    label: "✅ I've joined".to_string(),
                    callback_data: "seen:confirm".to_string(),
                }]);
                let _ = state
                    .messenger
                    .send_inline_keyboard(ChatId(chat_id), &text, keyboard)
                    .await;
            } else {
                send_buy_menu(&state, chat_id).await;
            }
        }

        "top" => {
            let entries = match state.store.aggregate_leaderboard(5).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "leaderboard query failed");
                    let _ = state
                        .messenger
                        .send_html(ChatId(chat_id), "⚠️ Leaderboard is unavailable right now.")
                        .await;
                    return Ok(());
                }
            };

            if entries.is_empty() {
                let _ = state
                    .messenger
                    .send_html(ChatId(chat_id), "No orders yet — be the first! /start")
                    .await;
                return Ok(());
            }

            let mut lines = vec!["🏆 <b>Top buyers</b>".to_string()];
            for (i, e) in entries.iter().enumerate() {
                lines.push(format!(
                    "{}. {} — ⭐ {} ({} so'm)",
                    i + 1,
                    escape_html(e.username.as_deref().unwrap_or("anonymous")),
                    e.total_stars,
                    format_amount(e.total_amount),
                ));
            }
            let _ = state
                .messenger
                .send_html(ChatId(chat_id), &lines.join("\n"))
                .await;
        }

        "stat" | "stats" => {
            if !state.cfg.is_admin(user_id) {
                let _ = state
                    .messenger
                    .send_html(ChatId(chat_id), "This command is for admins only.")
                    .await;
                return Ok(());
            }

            match state.store.summary_stats().await {
                Ok(s) => {
                    let text = format!(
                        "📊 <b>Statistics</b>\n\
                         Users: <b>{}</b> (today: {})\n\
                         Orders: <b>{}</b>\n\
                         Turnover: <b>{}</b> so'm",
                        s.total_users,
                        s.users_today,
                        s.total_orders,
                        format_amount(s.total_amount),
                    );
                    let _ = state.messenger.send_html(ChatId(chat_id), &text).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "stats query failed");
                    let _ = state
                        .messenger
                        .send_html(ChatId(chat_id), "⚠️ Stats are unavailable right now.")
                        .await;
                }
            }
        }

        "sync" => {
            if !state.cfg.is_admin(user_id) {
                let _ = state
                    .messenger
                    .send_html(ChatId(chat_id), "This command is for admins only.")
                    .await;
                return Ok(());
            }

            match state
                .dispatcher
                .drain_pending(state.cfg.pending_batch_limit)
                .await
            {
                Ok(report) => {
                    let text = format!(
                        "🔄 Sync finished.\nDelivered: <b>{}</b>\nStill pending: <b>{}</b>",
                        report.delivered, report.still_pending,
                    );
                    let _ = state.messenger.send_html(ChatId(chat_id), &text).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "manual drain failed");
                    let _ = state
                        .messenger
                        .send_html(ChatId(chat_id), "⚠️ Sync failed, check the logs.")
                        .await;
                }
            }
        }

        "help" => {
            let _ = state
                .messenger
                .send_html(
                    ChatId(chat_id),
                    "Commands:\n\
                     /start — buy stars\n\
                     /top — top buyers\n\
                     /help — this message\n\n\
                     Admin:\n\
                     /stat — statistics\n\
                     /sync — resend queued notifications",
                )
                .await;
        }

        _ => {
            let _ = state
                .messenger
                .send_html(
                    ChatId(chat_id),
                    &format!("Unknown command: /{}. Try /help.", escape_html(&cmd)),
                )
                .await;
        }
    }

    Ok(())
}

pub(crate) async fn send_buy_menu(state: &AppState, chat_id: i64) {
    let text = format!(
        "⭐ <b>Telegram Stars</b>\n\
         Price: <b>{}</b> so'm per star\n\
         Quantity: {} – {}\n\n\
         What would you like to do?",
        format_amount(state.cfg.price_per_star),
        state.cfg.min_stars,
        state.cfg.max_stars,
    );
    let keyboard = InlineKeyboard::new(vec![
        InlineButton {
            label: "⭐ Buy for myself".to_string(),
            callback_data: "buy:self".to_string(),
        },
        InlineButton {
            label: "🎁 Buy as a gift".to_string(),
            callback_data: "buy:gift".to_string(),
        },
    ]);
    let _ = state
        .messenger
        .send_inline_keyboard(ChatId(chat_id), &text, keyboard)
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bot_mention_and_lowercases() {
        assert_eq!(parse_command("/Start@StarsBot"), ("start".into(), "".into()));
        assert_eq!(
            parse_command("/sync  now please"),
            ("sync".into(), "now please".into())
        );
        assert_eq!(parse_command("/top"), ("top".into(), "".into()));
    }
}
