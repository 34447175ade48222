use std::sync::Arc;

use teloxide::prelude::*;

use starbot_core::domain::{ChatId, ProductKind};

use crate::handlers::commands::send_buy_menu;
use crate::router::AppState;

pub async fn handle_callback(
    _bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let user_id = q.from.id.0 as i64;
    let data = q.data.clone().unwrap_or_default();

    let Some(chat_id) = q.message.as_ref().map(|m| m.chat.id.0) else {
        let _ = state.messenger.answer_callback_query(&cb_id, None).await;
        return Ok(());
    };

    match data.as_str() {
        "seen:confirm" => {
            if let Err(e) = state.store.mark_channel_seen(user_id).await {
                tracing::warn!(user_id, error = %e, "mark_channel_seen failed");
            }
            let _ = state
                .messenger
                .answer_callback_query(&cb_id, Some("Thanks!"))
                .await;
            send_buy_menu(&state, chat_id).await;
        }

        "buy:self" | "buy:gift" => {
            let kind = if data == "buy:self" {
                ProductKind::SelfAccount
            } else {
                ProductKind::Gift
            };
            state.awaiting.set(chat_id, kind).await;

            let _ = state.messenger.answer_callback_query(&cb_id, None).await;
            let prompt = format!(
                "{} selected.\nSend the number of stars ({} – {}):",
                kind.label(),
                state.cfg.min_stars,
                state.cfg.max_stars,
            );
            let _ = state.messenger.send_html(ChatId(chat_id), &prompt).await;
        }

        _ => {
            let _ = state.messenger.answer_callback_query(&cb_id, None).await;
        }
    }

    Ok(())
}
