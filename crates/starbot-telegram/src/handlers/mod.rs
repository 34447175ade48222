//! Telegram update handlers.
//!
//! Each handler is a small adapter: upsert the user, route the update,
//! and reply through the messaging port. Order and retry semantics live
//! in `starbot-core`.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use tracing::warn;

use crate::router::AppState;

mod callback;
mod commands;
mod text;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;
    let username = display_of(user);

    if let Err(e) = state.store.ensure_user(user_id, Some(&username)).await {
        warn!(user_id, error = %e, "user upsert failed");
    }

    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return commands::handle_command(bot, msg, state).await;
        }
        return text::handle_text(bot, msg, state).await;
    }

    Ok(())
}

/// Display form of a Telegram user: `@username` when set, otherwise the
/// first name.
pub(crate) fn display_of(user: &teloxide::types::User) -> String {
    match &user.username {
        Some(u) => format!("@{u}"),
        None => user.first_name.clone(),
    }
}
