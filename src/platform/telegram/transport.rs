// ABOUTME: Telegram implementation of the relay transport over the Bot API
// ABOUTME: Handles text chunking, inline keyboards, message copies, and error classification

use anonchat_core::traits::{ChatId, Keyboard, MessageRef, RelayTransport};
use anonchat_core::DeliveryError;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQueryId, ChatId as TgChatId, InlineKeyboardButton, InlineKeyboardMarkup, MessageId,
};
use teloxide::{ApiError, RequestError};

/// Maximum message length for Telegram Bot API, in characters
const MAX_MESSAGE_LENGTH: usize = 4096;

/// Outbound Bot API calls for the relay
#[derive(Debug, Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl RelayTransport for TelegramTransport {
    async fn send_text(&self, target: ChatId, text: &str) -> Result<(), DeliveryError> {
        for chunk in chunk_text(text, MAX_MESSAGE_LENGTH) {
            self.bot
                .send_message(TgChatId(target.0), chunk)
                .await
                .map_err(|e| classify_request_error(&e))?;
        }
        Ok(())
    }

    async fn send_text_with_buttons(
        &self,
        target: ChatId,
        text: &str,
        buttons: &Keyboard,
    ) -> Result<(), DeliveryError> {
        self.bot
            .send_message(TgChatId(target.0), text)
            .reply_markup(inline_keyboard(buttons))
            .await
            .map_err(|e| classify_request_error(&e))?;
        Ok(())
    }

    async fn copy_message(
        &self,
        target: ChatId,
        source_chat: ChatId,
        message: MessageRef,
    ) -> Result<(), DeliveryError> {
        self.bot
            .copy_message(TgChatId(target.0), TgChatId(source_chat.0), MessageId(message.0))
            .await
            .map_err(|e| classify_request_error(&e))?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), DeliveryError> {
        self.bot
            .answer_callback_query(CallbackQueryId(callback_id.to_string()))
            .await
            .map_err(|e| classify_request_error(&e))?;
        Ok(())
    }
}

/// Build a Telegram inline keyboard from relay buttons
pub fn inline_keyboard(buttons: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(buttons.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.action.as_data()))
            .collect::<Vec<_>>()
    }))
}

/// Sort a Bot API failure into transient or unexpected.
///
/// Transient: the recipient blocked or left the bot, the chat or message is
/// gone, the request was rejected as a bad request, or the call timed out.
/// Everything else, including an invalid token, flood control, chat
/// migration, and malformed responses, is unexpected.
pub fn classify_request_error(err: &RequestError) -> DeliveryError {
    match err {
        RequestError::Api(ApiError::InvalidToken) => DeliveryError::unexpected(err.to_string()),
        RequestError::Api(ApiError::Unknown(description)) => {
            if description.starts_with("Bad Request") || description.starts_with("Forbidden") {
                DeliveryError::transient(description.clone())
            } else {
                DeliveryError::unexpected(description.clone())
            }
        }
        RequestError::Api(api) => DeliveryError::transient(api.to_string()),
        RequestError::Network(net) if net.is_timeout() => {
            DeliveryError::transient(format!("timed out: {}", net))
        }
        other => DeliveryError::unexpected(other.to_string()),
    }
}

/// Split text into chunks of at most `max_chars` characters, preferring line breaks
fn chunk_text(text: &str, max_chars: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    loop {
        // Byte offset just past the first `max_chars` characters, if the text is longer
        let Some((limit, _)) = remaining.char_indices().nth(max_chars) else {
            chunks.push(remaining);
            break;
        };

        let split_at = remaining[..limit]
            .rfind('\n')
            .map(|pos| pos + 1)
            .unwrap_or(limit);

        chunks.push(&remaining[..split_at]);
        remaining = &remaining[split_at..];
        if remaining.is_empty() {
            break;
        }
    }

    chunks
}

// =============================================================================
// Tests
// =============================================================================
