use thiserror::Error;

use crate::stream::MediaKind;

pub type Result<T, E = MediaError> = std::result::Result<T, E>;

/// How loudly a failure should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Critical,
}

/// Status codes surfaced by the codec/container engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Output must be drained (or input fed) before the call can succeed.
    #[error("resource temporarily unavailable")]
    Again,
    #[error("end of stream")]
    Eof,
    #[error("invalid data found when processing input")]
    InvalidData,
    #[error("out of memory")]
    OutOfMemory,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to open {locator}: {reason}")]
    Open { locator: String, reason: String },

    #[error("no decodable audio or video stream")]
    NoDecodableStreams,

    #[error("{kind} codec negotiation failed: {reason}")]
    CodecNegotiation { kind: MediaKind, reason: String },

    #[error("packet submission failed: {reason} (transient: {transient})")]
    SubmitFailed { transient: bool, reason: String },

    #[error("{0} decoding exhausted")]
    DecodeExhausted(MediaKind),

    #[error("codec engine ran out of memory")]
    OutOfMemory,

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("mux failed: {0}")]
    Mux(String),

    #[error("seek failed: {0}")]
    Seek(String),

    #[error("packet belongs to unexpected stream {0}")]
    UnexpectedStream(usize),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("cancelled")]
    Cancelled,
}

impl MediaError {
    pub fn severity(&self) -> Severity {
        match self {
            MediaError::DecodeExhausted(_)
            | MediaError::SubmitFailed {
                transient: true, ..
            }
            | MediaError::Cancelled => Severity::Warning,
            _ => Severity::Critical,
        }
    }

    /// Normal end of a decode pass rather than a fault.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, MediaError::DecodeExhausted(_))
    }

    pub(crate) fn open(locator: &str, err: EngineError) -> Self {
        MediaError::Open {
            locator: locator.to_string(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn negotiation(kind: MediaKind, reason: impl ToString) -> Self {
        MediaError::CodecNegotiation {
            kind,
            reason: reason.to_string(),
        }
    }
}
