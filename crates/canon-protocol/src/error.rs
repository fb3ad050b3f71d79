use crate::state::StateKey;

/// Errors a decoder can raise for a single raw frame. Per-frame, never fatal —
/// the pipeline drops the frame and counts the variant (see spec §7).
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum DecodeError {
    #[error("topic {0:?} does not identify a device")]
    InvalidTopic(String),

    #[error("frame truncated: needed {needed} byte(s) at offset {offset}, frame is {len} byte(s)")]
    FrameTruncated {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("unrecognized message kind for topic {topic:?}")]
    UnknownMessageKind { topic: String },

    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Raised when the State Engine cannot compute a diff for a record. The
/// record is still delivered, unannotated, per spec §4.11 ("state engine
/// exception → record is passed through unannotated").
#[derive(Debug, thiserror::Error, Clone)]
#[error("state update failed for {key:?}: {reason}")]
pub struct StateError {
    pub key: StateKey,
    pub reason: String,
}
