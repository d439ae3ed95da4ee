//! Error types for the channel management core.

use thiserror::Error;

/// The reason a channel was marked full. Once set, a channel never re-opens.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullReason {
    /// The codec's compressed-output target was reached.
    #[error("input target reached")]
    InputTargetReached,
    /// The frame budget was exhausted.
    #[error("max frame index reached")]
    MaxFrames,
    /// The channel was open for longer than the configured duration.
    #[error("max channel duration reached")]
    DurationTimeout,
    /// The per-channel input byte cap was reached.
    #[error("max RLP bytes per channel reached")]
    MaxRlpBytesReached,
}

/// An error returned by a [ChannelOut] codec.
///
/// [ChannelOut]: crate::channel_out::ChannelOut
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutError {
    /// The codec reached one of its budgets and no further blocks may be added.
    /// This is the sole error a caller is expected to branch on.
    #[error("channel full: {0}")]
    ChannelFull(FullReason),
    /// Input was pushed into a codec that has already been closed.
    #[error("channel out is closed")]
    Closed,
    /// The codec was constructed with an unusable configuration.
    #[error("invalid channel config: {0}")]
    InvalidConfig(&'static str),
    /// The compressor failed.
    #[error("compression failed: {0}")]
    Compression(String),
}

impl ChannelOutError {
    /// Returns the [FullReason] if this error signals a full channel.
    pub const fn full_reason(&self) -> Option<FullReason> {
        match self {
            Self::ChannelFull(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Errors surfaced by the [ChannelManager].
///
/// [ChannelManager]: crate::manager::ChannelManager
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatcherError {
    /// The appended block does not extend the chain held in state.
    #[error("block does not extend existing chain")]
    Reorg,
    /// There is no tx data to submit right now. A sentinel, not a failure.
    #[error("EOF")]
    Eof,
    /// Undelivered data remained when the manager was asked to close.
    #[error("pending channels remain after closing channel manager")]
    PendingAfterClose,
    /// A fully submitted channel passed its inclusion bound without the
    /// remote node advancing its safe head over the channel's blocks.
    #[error("safe head did not make expected progress")]
    MissedExpectedProgress,
    /// A codec error bubbled up from the current channel.
    #[error("channel out: {0}")]
    ChannelOut(#[from] ChannelOutError),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_channel_full_reason() {
        let err = ChannelOutError::ChannelFull(FullReason::DurationTimeout);
        assert_eq!(err.full_reason(), Some(FullReason::DurationTimeout));
        assert_eq!(ChannelOutError::Closed.full_reason(), None);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(BatcherError::Eof.to_string(), "EOF");
        assert_eq!(
            BatcherError::Reorg.to_string(),
            "block does not extend existing chain"
        );
        assert_eq!(
            BatcherError::from(ChannelOutError::Closed).to_string(),
            "channel out: channel out is closed"
        );
    }
}
