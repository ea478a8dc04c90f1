// ABOUTME: Telegram platform - long-polls the Bot API and normalizes updates into relay events
// ABOUTME: Tracks connection state for health checks and hands out the outbound transport

pub mod transport;

pub use transport::{classify_request_error, TelegramTransport};

use anonchat_core::commands::{parse_command, BotCommand, ParseResult};
use anonchat_core::config::TelegramConfig;
use anonchat_core::traits::{
    CallbackAction, ChatId, EventStream, IncomingEvent, MessageRef, PlatformConnectionState,
    Profile, SharedConnectionState, UserId,
};
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, MessageKind, Update, UpdateKind, User};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Long polling timeout passed to getUpdates, in seconds
const POLL_TIMEOUT_SECS: u32 = 30;

/// Delay before retrying after a failed getUpdates call
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram platform using teloxide with long polling
pub struct TelegramPlatform {
    bot: Bot,
    identity: BotIdentity,
    connection_state: SharedConnectionState,
}

/// Who the bot is, used to skip its own messages and commands aimed at other bots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: UserId,
    pub username: String,
}

impl TelegramPlatform {
    /// Create a new TelegramPlatform from config.
    ///
    /// Resolves the bot's user ID via the `getMe` API call.
    pub async fn new(config: &TelegramConfig) -> Result<Self> {
        let bot = Bot::new(&config.bot_token);

        let me = bot.get_me().await.context("Failed to call Telegram getMe")?;
        let identity = BotIdentity {
            user_id: UserId(me.id.0 as i64),
            username: me.username().to_string(),
        };

        tracing::info!(
            bot_username = %identity.username,
            bot_id = %identity.user_id,
            "Telegram bot authenticated"
        );

        Ok(Self {
            bot,
            identity,
            connection_state: Arc::new(Mutex::new(PlatformConnectionState::Connecting)),
        })
    }

    pub fn bot_user_id(&self) -> UserId {
        self.identity.user_id
    }

    /// Outbound transport sharing this platform's bot client
    pub fn transport(&self) -> TelegramTransport {
        TelegramTransport::new(self.bot.clone())
    }

    /// Handle to the connection state, for health reporting
    pub fn connection_state_handle(&self) -> SharedConnectionState {
        Arc::clone(&self.connection_state)
    }

    pub fn connection_state(&self) -> PlatformConnectionState {
        self.connection_state
            .lock()
            .map(|s| s.clone())
            .unwrap_or(PlatformConnectionState::Connecting)
    }

    fn set_connection_state(&self, state: PlatformConnectionState) {
        if let Ok(mut current) = self.connection_state.lock() {
            *current = state;
        }
    }

    /// Start long polling and return the stream of normalized events.
    pub async fn event_stream(&self) -> Result<EventStream> {
        let (tx, rx) = mpsc::channel(256);
        let bot = self.bot.clone();
        let identity = self.identity.clone();
        let connection_state = Arc::clone(&self.connection_state);

        tokio::spawn(async move {
            let mut offset: i32 = 0;

            loop {
                let updates = match bot
                    .get_updates()
                    .offset(offset)
                    .timeout(POLL_TIMEOUT_SECS)
                    .await
                {
                    Ok(updates) => {
                        if let Ok(mut state) = connection_state.lock() {
                            if *state != PlatformConnectionState::Connected {
                                *state = PlatformConnectionState::Connected;
                                tracing::info!(platform = "telegram", "Connected");
                            }
                        }
                        updates
                    }
                    Err(e) => {
                        tracing::warn!(
                            platform = "telegram",
                            error = %e,
                            "Long polling error, retrying in 5s"
                        );
                        if let Ok(mut state) = connection_state.lock() {
                            *state = PlatformConnectionState::Disconnected {
                                reason: e.to_string(),
                            };
                        }
                        tokio::time::sleep(RETRY_DELAY).await;
                        continue;
                    }
                };

                for update in &updates {
                    offset = update.id.as_offset();

                    let Some(event) = update_to_event(update, &identity) else {
                        continue;
                    };

                    if tx.send(event).await.is_err() {
                        tracing::warn!(platform = "telegram", "Event stream receiver dropped");
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!(platform = "telegram", "Shutting down Telegram platform");
        self.set_connection_state(PlatformConnectionState::Disconnected {
            reason: "shutdown".to_string(),
        });
        Ok(())
    }
}

/// Convert a Telegram update into a relay event.
///
/// Returns `None` for updates the relay does not act on: the bot's own
/// messages, unknown commands (including commands addressed to other bots),
/// unknown callback payloads, service messages, and non-command messages
/// outside private chats.
pub fn update_to_event(update: &Update, bot: &BotIdentity) -> Option<IncomingEvent> {
    match &update.kind {
        UpdateKind::Message(message) => message_to_event(message, bot),
        UpdateKind::CallbackQuery(query) => callback_to_event(query),
        _ => None,
    }
}

fn message_to_event(message: &Message, bot: &BotIdentity) -> Option<IncomingEvent> {
    let from = message.from.as_ref()?;
    let user = profile(from);
    if user.id == bot.user_id {
        return None;
    }

    let chat = ChatId(message.chat.id.0);

    if let Some(text) = message.text() {
        match parse_command(text, Some(&bot.username)) {
            ParseResult::Command(BotCommand::Start) => {
                return Some(IncomingEvent::Start { user, chat })
            }
            ParseResult::Command(BotCommand::Stop) => {
                return Some(IncomingEvent::Stop { user, chat })
            }
            ParseResult::Command(BotCommand::GetId) => return Some(IncomingEvent::GetId { chat }),
            ParseResult::Unknown(name) => {
                tracing::debug!(user_id = %user.id, command = %name, "Ignoring unknown command");
                return None;
            }
            ParseResult::Message => {}
        }
    }

    if !message.chat.is_private() {
        return None;
    }

    // Service messages (pins, chat changes, ...) are not user content
    if !matches!(message.kind, MessageKind::Common(_)) {
        return None;
    }

    Some(IncomingEvent::Message {
        user,
        chat,
        message: MessageRef(message.id.0),
        text: message.text().map(str::to_string),
    })
}

fn callback_to_event(query: &CallbackQuery) -> Option<IncomingEvent> {
    let user = profile(&query.from);
    let data = query.data.as_deref()?;
    let Some(action) = CallbackAction::from_data(data) else {
        tracing::debug!(user_id = %user.id, data = %data, "Ignoring unknown callback data");
        return None;
    };

    Some(IncomingEvent::Callback {
        user,
        callback_id: query.id.0.clone(),
        action,
    })
}

fn profile(user: &User) -> Profile {
    Profile::with_name(
        UserId(user.id.0 as i64),
        user.full_name(),
        user.username.as_deref(),
    )
}

// =============================================================================
// Tests
// =============================================================================
