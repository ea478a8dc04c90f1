// ABOUTME: Delivery outcome type for outbound transport calls
// ABOUTME: Separates expected (transient) failures from unexpected ones for logging policy

use thiserror::Error;

/// Why an outbound call failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Expected in normal operation: recipient blocked the bot, chat is
    /// unreachable, request rejected, or the call timed out
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// Anything else the transport reported
    #[error("unexpected delivery failure: {0}")]
    Unexpected(String),
}

impl DeliveryError {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient(reason.into())
    }

    pub fn unexpected(reason: impl Into<String>) -> Self {
        Self::Unexpected(reason.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transient(_) => "transient",
            Self::Unexpected(_) => "unexpected",
        }
    }

    /// The transport's own description, without the classification prefix
    pub fn reason(&self) -> &str {
        match self {
            Self::Transient(r) | Self::Unexpected(r) => r,
        }
    }
}
