//! Channel-level errors raised by reducers and the store.

use thiserror::Error;

use super::ChannelId;

/// A reducer or store operation rejected a staged write.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// `messages` update carried a `remove` op whose id isn't present in the channel.
    #[error("cannot remove unknown message id {0}")]
    UnknownMessageId(String),

    /// `messages` update carried a `removeAll` op on a non-sentinel id.
    #[error("removeAll op must target the sentinel id, got {0}")]
    InvalidRemoveAllTarget(String),

    /// A write targeted a channel id the store has no spec registered for.
    #[error("no channel registered for id {0}")]
    UnknownChannel(ChannelId),

    /// A write's value failed to downcast to the channel's declared type.
    #[error("type mismatch writing channel {0}")]
    TypeMismatch(ChannelId),

    /// Channel was read before any commit ever wrote to it.
    #[error("channel {0} has never been written")]
    Uninitialized(ChannelId),
}
