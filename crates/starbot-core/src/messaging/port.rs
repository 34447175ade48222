use async_trait::async_trait;

use crate::{domain::ChatId, messaging::types::InlineKeyboard, Result};

/// Outbound messaging port.
///
/// Telegram is the first implementation; the dispatcher and the bot
/// surface only ever talk to this trait, which is what makes delivery
/// failures testable without a live transport.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()>;

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
