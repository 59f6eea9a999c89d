// src/radio.rs
use thiserror::Error;

use crate::ndef::DecodeError;
use crate::types::TagIdentity;

/// I/O-level and protocol-level failures surfaced by one scan or write
/// attempt. All of these terminate the attempt; none are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("could not connect to tag: {0}")]
    ConnectFailure(String),
    #[error("no tag detected")]
    NoTag,
    #[error("tag has no NDEF application")]
    NotNdefCapable,
    #[error("tag is not writable")]
    NotWritable,
    #[error("payload ({payload} bytes) exceeds tag capacity ({capacity} bytes)")]
    CapacityExceeded { payload: usize, capacity: usize },
    #[error("read failed: {0}")]
    ReadFailure(String),
    #[error("write failed: {0}")]
    WriteFailure(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("session invalidated: {0}")]
    SessionInvalidated(String),
}

/// NDEF application status queried from a connected tag before any read or
/// write of the message area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdefStatus {
    /// Message area capacity in bytes.
    pub capacity: usize,
    pub writable: bool,
    /// Whether a message is present at all (an empty area reads as absent).
    pub ndef_present: bool,
}

/// One detected tag. The handle stays valid until the session that produced
/// it is invalidated.
pub trait TagHandle {
    fn identity(&self) -> &TagIdentity;
    fn connect(&mut self) -> Result<(), SessionError>;
    fn ndef_status(&mut self) -> Result<NdefStatus, SessionError>;
    /// Raw NDEF message bytes, TLV framing already stripped.
    fn read_raw(&mut self) -> Result<Vec<u8>, SessionError>;
    fn write_raw(&mut self, raw: &[u8]) -> Result<(), SessionError>;
}

/// The external radio layer: blocks until a tag shows up, and tears the
/// session down afterwards. Exactly one session is active at a time.
pub trait Radio {
    fn await_tag(&mut self) -> Result<Box<dyn TagHandle>, SessionError>;
    /// Unconditional session teardown; called on every outcome.
    fn invalidate(&mut self);
    fn reader_available(&mut self) -> bool;
}

/// Receives detected URLs. Fire-and-forget: the coordinator schedules the
/// call after a short delay and never cancels it.
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str);
}
