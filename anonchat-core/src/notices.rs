// ABOUTME: User-facing and oversight notice texts
// ABOUTME: Centralizes every string the relay sends so handlers and tests agree

use crate::traits::{CallbackAction, ChatId, InlineButton, Keyboard, Profile, UserId};

pub const WELCOME: &str = "👋 Welcome to Anonymous Chat Bot!\nClick below to start chatting:";
pub const BANNED: &str = "🚫 You are banned from using this bot.";
pub const ALREADY_WAITING: &str = "⏳ You are already waiting for a partner...";
pub const ALREADY_CHATTING: &str = "💬 You are already in a chat. Use /stop to end it first.";
pub const SEARCHING: &str = "🔎 Searching for a partner...";
pub const CONNECTED: &str = "🤝 You are now connected!";
pub const HELP: &str = "ℹ️ Just click 'Start Chatting' to find a partner! Use /stop to end.";
pub const NOT_IN_CHAT: &str = "❌ You are not in a chat. Click 'Start Chatting'.";
pub const NOT_CHATTING: &str = "❌ You are not chatting.";
pub const CHAT_ENDED: &str = "🛑 Chat ended.";
pub const PARTNER_LEFT: &str = "🛑 Your partner left.";

/// Placeholder mirrored to oversight for media and other non-text messages
pub const NON_TEXT_PLACEHOLDER: &str = "[non-text message]";

/// Keyboard attached to the welcome message
pub fn welcome_keyboard() -> Keyboard {
    vec![
        vec![InlineButton::new("🤝 Start Chatting", CallbackAction::FindPartner)],
        vec![InlineButton::new("ℹ️ Help", CallbackAction::Help)],
    ]
}

pub fn group_id(chat: ChatId) -> String {
    format!("📌 This group ID is: `{}`", chat)
}

// ─── Oversight ──────────────────────────────────────────────────

/// One-time introduction of a new user
pub fn new_user(profile: &Profile) -> String {
    let name = if profile.display_name.trim().is_empty() {
        "(no name)".to_string()
    } else {
        profile.display_name.clone()
    };
    let handle = match profile.handle.as_deref() {
        Some(h) if !h.is_empty() => format!("@{}", h),
        _ => "(none)".to_string(),
    };
    format!(
        "🆕 New User Started\n👤 Name: {}\n🔗 Username: {}\n🆔 ID: {}",
        name, handle, profile.id
    )
}

/// Mirror line for a relayed message
pub fn relay_mirror(sender: UserId, partner: UserId, text: Option<&str>) -> String {
    format!(
        "👁 {} → {}: {}",
        sender,
        partner,
        text.unwrap_or(NON_TEXT_PLACEHOLDER)
    )
}

pub fn chat_end(user: UserId, partner: UserId) -> String {
    format!("🚪 User {} ended chat with User {}", user, partner)
}

pub fn critical_error(reason: &str) -> String {
    format!("⚠️ Critical error: {}", reason)
}
