//! In-memory messenger for unit tests: records every send and fails on
//! demand, per recipient or wholesale.

use std::{
    collections::HashSet,
    sync::atomic::{AtomicBool, Ordering},
    sync::Mutex,
};

use async_trait::async_trait;

use crate::{
    domain::ChatId,
    messaging::{port::MessagingPort, types::InlineKeyboard},
    Error, Result,
};

#[derive(Default)]
pub struct RecordingMessenger {
    fail_all: AtomicBool,
    failing: Mutex<HashSet<i64>>,
    sent: Mutex<Vec<(i64, String)>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_recipient(&self, chat_id: i64) {
        self.failing.lock().unwrap().insert(chat_id);
    }

    pub fn fail_everything(&self, on: bool) {
        self.fail_all.store(on, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    fn try_send(&self, chat_id: ChatId, text: &str) -> Result<()> {
        if self.fail_all.load(Ordering::SeqCst)
            || self.failing.lock().unwrap().contains(&chat_id.0)
        {
            return Err(Error::Transport(format!("send to {} refused", chat_id.0)));
        }
        self.sent.lock().unwrap().push((chat_id.0, text.to_string()));
        Ok(())
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()> {
        self.try_send(chat_id, html)
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        _keyboard: InlineKeyboard,
    ) -> Result<()> {
        self.try_send(chat_id, html)
    }

    async fn answer_callback_query(&self, _callback_id: &str, _text: Option<&str>) -> Result<()> {
        Ok(())
    }
}
