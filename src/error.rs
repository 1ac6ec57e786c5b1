//! Error types for guestinfo metadata operations.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Failure of the guest-info channel while fetching a single key.
///
/// Process based transports attach the helper's stderr as `diagnostic`;
/// other transports leave it empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fetching {key} failed: {reason}")]
pub struct TransportError {
    /// The guestinfo key that was requested.
    pub key: String,
    /// Short description of what went wrong.
    pub reason: String,
    /// Diagnostic output from the transport, if any.
    pub diagnostic: Option<String>,
}

impl TransportError {
    /// Create a transport error without diagnostic output.
    pub fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
            diagnostic: None,
        }
    }

    /// Attach diagnostic output (e.g. stderr of the helper process).
    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }
}

/// Stage of the decode pipeline that rejected a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeStage {
    /// Base64 decoding of the raw value.
    Base64,
    /// Opening the gzip stream (header parsing).
    GzipOpen,
    /// Decompressing the gzip body.
    GzipRead,
}

impl fmt::Display for DecodeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeStage::Base64 => write!(f, "base64"),
            DecodeStage::GzipOpen => write!(f, "gzip open"),
            DecodeStage::GzipRead => write!(f, "gzip read"),
        }
    }
}

/// Errors that can occur when probing for or extracting guestinfo metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The virtualization check itself failed.
    #[error("virtualization check failed: {0}")]
    Oracle(#[source] std::io::Error),

    /// The virtualization check succeeded but this is not a VMware guest.
    #[error("not in a virtual world")]
    NotVirtualized,

    /// Fetching a key or its encoding tag failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A recognized encoding failed to decode the value.
    #[error("decoding {key} failed at {stage}: {reason}")]
    Decode {
        key: String,
        stage: DecodeStage,
        reason: String,
    },

    /// The encoding tag is not one the pipeline knows.
    #[error("unknown encoding {0:?}")]
    UnknownEncoding(String),

    /// Writing the decoded metadata to disk failed.
    #[error("failed to write metadata to {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Payload was not valid UTF-8.
    #[error("invalid utf-8")]
    Utf8,

    /// JSON deserialization error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Decoded payload exceeds maximum allowed size.
    #[error("payload too large: {0} bytes exceeds limit of {1} bytes")]
    TooLarge(usize, usize),
}

impl MetadataError {
    /// Whether this error must abort the process when returned from a probe.
    ///
    /// Only the two virtualization outcomes qualify; everything else
    /// a probe encounters is reported as "not this provider".
    pub fn is_fatal_probe(&self) -> bool {
        matches!(self, MetadataError::Oracle(_) | MetadataError::NotVirtualized)
    }
}
