// ABOUTME: Root library module for the anonymous chat relay bot
// ABOUTME: Exposes the Telegram platform, per-user dispatcher, and liveness server

pub mod dispatcher;
pub mod platform;
pub mod server;

// Re-export platform-agnostic modules from anonchat-core
pub use anonchat_core::commands;
pub use anonchat_core::config;
pub use anonchat_core::metrics;
pub use anonchat_core::notices;
pub use anonchat_core::orchestrator;
pub use anonchat_core::paths;
pub use anonchat_core::relay;
pub use anonchat_core::traits;

pub use anonchat_core::{DeliveryError, RelayOrchestrator};
