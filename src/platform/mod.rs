// ABOUTME: Chat platform integrations for the relay bot
// ABOUTME: Telegram is the only platform; its transport implements the core RelayTransport

pub mod telegram;

pub use telegram::{TelegramPlatform, TelegramTransport};
