//! Error taxonomies for the channel and the client protocol.

use crate::channel::codec::CodecError;
use crate::channel::message::MessageTag;
use thiserror::Error;

/// Failures raised by the transport layer.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("channel is not connected")]
    Disconnected,

    #[error("peer encoder id {theirs} does not match ours ({ours})")]
    EncoderMismatch { ours: u32, theirs: u32 },

    #[error("channel lock was abandoned by the previous owner")]
    Abandoned,

    #[error("no pending frame to read")]
    Empty,

    #[error("frame decode failed: {0}")]
    Decode(#[from] CodecError),

    #[error("shared memory operation failed: {0}")]
    Os(#[from] nix::Error),
}

/// Failures surfaced to callers of the client protocol.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("response wait timed out")]
    Timeout,

    #[error("unexpected response: expected {expected:?}, got {got:?}")]
    UnexpectedResponse {
        expected: MessageTag,
        got: MessageTag,
    },

    #[error("command is unsupported by the engine: {0}")]
    Unsupported(String),

    #[error("engine reported failure: {0}")]
    RemoteFailure(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
