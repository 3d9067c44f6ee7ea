//! Chat-channel client seam.
//!
//! The pipeline consumes this interface; the host application supplies the
//! concrete platform client. Tests use in-memory fakes.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Opaque platform message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Minimal view of a channel message needed for cleanup.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub id: MessageId,
    /// Whether this message was authored by the bot itself.
    pub from_self: bool,
}

/// Errors surfaced by the channel client, classified so the pipeline can
/// apply the right per-item policy.
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("permission denied")]
    PermissionDenied,

    /// Target no longer exists (message already deleted, channel gone).
    #[error("not found")]
    NotFound,

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("http error: {0}")]
    Http(String),
}

/// Operations the pipeline needs from the chat platform.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    /// Enumerate recent message history in the target channel.
    async fn recent_messages(&self) -> Result<Vec<ChannelMessage>, ChannelError>;

    /// Delete a single message.
    async fn delete_message(&self, id: MessageId) -> Result<(), ChannelError>;

    /// Upload a file with a caption as a new message.
    async fn send_file(&self, file: &Path, caption: &str) -> Result<(), ChannelError>;
}
