use std::sync::Arc;

use teloxide::prelude::*;

use starbot_core::{domain::ChatId, formatting::format_amount, Error};

use crate::handlers::display_of;
use crate::router::AppState;

/// Plain text is only meaningful while a buy flow is waiting for a star
/// amount; otherwise nudge the user towards /start.
pub async fn handle_text(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let chat_id = msg.chat.id.0;
    let user_id = user.id.0 as i64;
    let text = msg.text().unwrap_or("");

    let Some(kind) = state.awaiting.take(chat_id).await else {
        let _ = state
            .messenger
            .send_html(ChatId(chat_id), "Use /start to place an order.")
            .await;
        return Ok(());
    };

    let Some(stars) = parse_stars(text) else {
        state.awaiting.set(chat_id, kind).await;
        let _ = state
            .messenger
            .send_html(
                ChatId(chat_id),
                &format!(
                    "Please send a whole number between {} and {}.",
                    state.cfg.min_stars, state.cfg.max_stars
                ),
            )
            .await;
        return Ok(());
    };

    let username = display_of(user);
    match state
        .ledger
        .place_order(user_id, Some(&username), kind, stars)
        .await
    {
        Ok(order_id) => {
            let amount = state.ledger.amount_for(stars);
            let confirmation = format!(
                "✅ Order <b>#{order_id}</b> accepted!\n\
                 ⭐ {stars} stars — <b>{}</b> so'm\n\n\
                 An admin will contact you shortly.",
                format_amount(amount),
            );
            let _ = state
                .messenger
                .send_html(ChatId(chat_id), &confirmation)
                .await;
        }
        Err(Error::InvalidStars { min, max, .. }) => {
            state.awaiting.set(chat_id, kind).await;
            let _ = state
                .messenger
                .send_html(
                    ChatId(chat_id),
                    &format!("Quantity must be between {min} and {max}. Try again:"),
                )
                .await;
        }
        Err(e) => {
            tracing::error!(user_id, error = %e, "order placement failed");
            let _ = state
                .messenger
                .send_html(
                    ChatId(chat_id),
                    "⚠️ Could not save your order. Please try again later.",
                )
                .await;
        }
    }

    Ok(())
}

/// Parse a user-typed star amount. Tolerates surrounding whitespace and
/// "1 000" / "1,000" style digit grouping.
fn parse_stars(text: &str) -> Option<i64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    cleaned.parse::<i64>().ok()
}
