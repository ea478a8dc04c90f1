// ABOUTME: Core identifiers, inbound event types, and the outbound transport trait
// ABOUTME: Keeps the relay core independent of any particular bot platform SDK

use async_trait::async_trait;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio_stream::Stream;

use crate::error::DeliveryError;

// =============================================================================
// Identifiers
// =============================================================================

/// Opaque user identifier assigned by the hosting platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

impl UserId {
    /// The user's private chat with the bot. Platforms share the numeric id.
    pub fn chat(self) -> ChatId {
        ChatId(self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Destination chat (private chat, group, or channel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a message inside its source chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef(pub i32);

// =============================================================================
// Inline keyboards
// =============================================================================

/// Actions that can arrive through inline button callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    FindPartner,
    Help,
}

impl CallbackAction {
    /// Callback payload sent to and received from the platform
    pub fn as_data(self) -> &'static str {
        match self {
            CallbackAction::FindPartner => "find_partner",
            CallbackAction::Help => "help",
        }
    }

    pub fn from_data(data: &str) -> Option<Self> {
        match data {
            "find_partner" => Some(CallbackAction::FindPartner),
            "help" => Some(CallbackAction::Help),
            _ => None,
        }
    }
}

/// A single inline button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub action: CallbackAction,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, action: CallbackAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// Rows of inline buttons, top to bottom
pub type Keyboard = Vec<Vec<InlineButton>>;

// =============================================================================
// Inbound events
// =============================================================================

/// Public profile of the user behind an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: UserId,
    /// Full display name; may be empty
    pub display_name: String,
    /// Handle without the leading `@`
    pub handle: Option<String>,
}

impl Profile {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            display_name: String::new(),
            handle: None,
        }
    }

    pub fn with_name(id: UserId, name: impl Into<String>, handle: Option<&str>) -> Self {
        Self {
            id,
            display_name: name.into(),
            handle: handle.map(str::to_string),
        }
    }
}

/// Normalized inbound event from the platform's update source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingEvent {
    /// `/start`
    Start { user: Profile, chat: ChatId },
    /// `/stop`
    Stop { user: Profile, chat: ChatId },
    /// `/getid`
    GetId { chat: ChatId },
    /// Inline button press; unknown payloads never reach the core
    Callback {
        user: Profile,
        callback_id: String,
        action: CallbackAction,
    },
    /// Any non-command message in a private chat
    Message {
        user: Profile,
        chat: ChatId,
        message: MessageRef,
        /// Text body, `None` for media and other non-text content
        text: Option<String>,
    },
}

impl IncomingEvent {
    /// The acting user, if the event carries one
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            IncomingEvent::Start { user, .. }
            | IncomingEvent::Stop { user, .. }
            | IncomingEvent::Callback { user, .. }
            | IncomingEvent::Message { user, .. } => Some(user.id),
            IncomingEvent::GetId { .. } => None,
        }
    }

    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            IncomingEvent::Start { .. } => "start",
            IncomingEvent::Stop { .. } => "stop",
            IncomingEvent::GetId { .. } => "getid",
            IncomingEvent::Callback { .. } => "callback",
            IncomingEvent::Message { .. } => "message",
        }
    }
}

/// Boxed stream type for platform events
pub type EventStream = Pin<Box<dyn Stream<Item = IncomingEvent> + Send>>;

/// Connection state reported by the platform for health checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformConnectionState {
    Connected,
    Connecting,
    Disconnected { reason: String },
}

impl PlatformConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            PlatformConnectionState::Connected => "connected",
            PlatformConnectionState::Connecting => "connecting",
            PlatformConnectionState::Disconnected { .. } => "disconnected",
        }
    }
}

/// Connection state shared between the update poller and health reporting
pub type SharedConnectionState = Arc<Mutex<PlatformConnectionState>>;

// =============================================================================
// Outbound transport
// =============================================================================

/// Outbound calls the relay makes against the hosting platform.
///
/// Every call is a single attempt. Implementations classify failures into
/// [`DeliveryError::Transient`] and [`DeliveryError::Unexpected`]; the caller
/// decides how loudly to report them.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Send a plain text message
    async fn send_text(&self, target: ChatId, text: &str) -> Result<(), DeliveryError>;

    /// Send a text message with an inline keyboard attached
    async fn send_text_with_buttons(
        &self,
        target: ChatId,
        text: &str,
        buttons: &Keyboard,
    ) -> Result<(), DeliveryError>;

    /// Copy a message verbatim (media type included) without a forward header
    async fn copy_message(
        &self,
        target: ChatId,
        source_chat: ChatId,
        message: MessageRef,
    ) -> Result<(), DeliveryError>;

    /// Acknowledge an inline button press so the client stops its spinner
    async fn answer_callback(&self, callback_id: &str) -> Result<(), DeliveryError>;
}
