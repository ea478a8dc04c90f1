// ABOUTME: Platform-agnostic pairing and relay core for anonymous 1:1 chat bots
// ABOUTME: Provides the relay table, orchestrator, transport trait, and ambient config/metrics

pub mod commands;
pub mod config;
pub mod error;
pub mod metrics;
pub mod notices;
pub mod orchestrator;
pub mod paths;
pub mod relay;
pub mod traits;

pub use error::DeliveryError;
pub use orchestrator::{RelayOrchestrator, RelaySnapshot};
pub use relay::{EndOutcome, PairOutcome, RelayTable, RelayTarget};

// Re-export core traits for convenient access
pub use traits::{
    CallbackAction, ChatId, EventStream, InlineButton, IncomingEvent, Keyboard, MessageRef,
    PlatformConnectionState, Profile, RelayTransport, SharedConnectionState, UserId,
};
