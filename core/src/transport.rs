//! Contract for the transport collaborator that executes blocking transfers.
//!
//! # Overview
//! The engine never speaks wire HTTP itself. It configures a transport
//! through symbolic options, hands it a callback adapter, and invokes the
//! blocking `perform`. The transport calls back synchronously on the calling
//! thread as data arrives or must be produced; the adapter's return values
//! are the only channel for refusing data or repositioning an upload.
//!
//! # Design
//! Transports are described as a trait so tests can substitute scripted or
//! loopback implementations while production code binds a native transfer
//! library. Option ids stay symbolic (no per-symbol wrapper functions);
//! a transport maps them onto whatever its library expects.

use std::fmt;

use bitflags::bitflags;

use crate::engine::HeaderList;
use crate::error::TransportFailure;

/// HTTP method for a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    /// Any other verb, sent as-is.
    Custom(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Custom(verb) => verb,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Version of the transport library, used to gate optional capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TransportVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl TransportVersion {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for TransportVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Pull-style header enumeration appeared in transport libraries at 7.84.0;
/// older builds only deliver headers through the push callback.
pub const HEADER_ITERATION_MIN_VERSION: TransportVersion = TransportVersion::new(7, 84, 0);

/// Symbolic configuration options understood by every transport.
#[derive(Debug)]
pub enum TransportOption<'a> {
    Url(&'a str),
    Method(&'a Method),
    UserAgent(&'a str),
    /// Ordered raw header lines for the outgoing request. The list stays
    /// owned by the session; the transport must not retain it past the
    /// session's lifetime.
    Headers(&'a HeaderList),
    FollowRedirects(bool),
    MaxRedirects(u32),
    /// Whether a request body will be supplied through the read callback.
    HasUploadBody(bool),
    /// Upload size when it fits the 32-bit signed range.
    UploadSize(i32),
    /// Upload size above the 32-bit signed range; uses the wide native field.
    UploadSizeLarge(i64),
}

/// Reference point for repositioning the upload source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    Start,
    Current,
    End,
}

/// Result of a seek request.
///
/// `CantSeek` is not an error: it tells the transport to fall back to a full
/// reconnect instead of reusing the repositioned body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    Ok,
    CantSeek,
    Fail,
}

/// Result of an upload read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `Read(0)` signals end of the upload body.
    Read(usize),
    Pause,
    Abort,
}

/// The four callback adapters a transport drives during `perform`.
///
/// All callbacks run synchronously, reentrantly, on the thread that called
/// `perform`. No ordering holds between read and write invocations beyond
/// "writes carry inbound bytes, reads are requests for outbound bytes".
pub trait TransferHandler {
    /// One raw header line, including status lines and the blank separator
    /// between hops. Returning `false` aborts the transfer.
    fn header_line(&mut self, line: &[u8]) -> bool;

    /// A chunk of response body. Returns the number of bytes consumed; any
    /// count smaller than `chunk.len()` tells the transport to abort.
    fn body_chunk(&mut self, chunk: &[u8]) -> usize;

    /// Fill `buf` with the next upload bytes.
    fn fill_upload(&mut self, buf: &mut [u8]) -> ReadOutcome;

    /// Reposition the upload source, typically before re-sending a body
    /// after a redirect.
    fn seek_upload(&mut self, offset: i64, origin: SeekOrigin) -> SeekOutcome;
}

bitflags! {
    /// Which hop artifacts pull-style iteration should surface.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderOrigin: u32 {
        const HEADER = 1;
        const INFORMATIONAL = 1 << 1;
        const CONNECT = 1 << 2;
        const TRAILER = 1 << 3;
    }
}

impl HeaderOrigin {
    pub fn all_origins() -> Self {
        Self::HEADER | Self::INFORMATIONAL | Self::CONNECT | Self::TRAILER
    }
}

/// One header produced by pull-style enumeration, with the opaque cursor to
/// hand back for the next call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
    pub cursor: usize,
}

/// A handle-based transfer backend.
///
/// One handle must be confined to one thread at a time; distinct handles are
/// independent and may run concurrently from distinct threads.
pub trait Transport {
    /// Apply one symbolic option. Either the option takes effect or an error
    /// is returned with no partial state applied.
    fn set_option(&mut self, option: TransportOption<'_>) -> Result<(), TransportFailure>;

    /// Execute the blocking transfer, driving `handler` until the exchange
    /// completes or fails. Occupies the calling thread for the duration.
    fn perform(&mut self, handler: &mut dyn TransferHandler) -> Result<(), TransportFailure>;

    /// Status code of the last completed transfer.
    fn response_code(&self) -> Result<i64, TransportFailure>;

    /// Method actually used for the final hop.
    fn effective_method(&self) -> Result<String, TransportFailure>;

    /// Version of the backing library.
    fn version(&self) -> TransportVersion;

    /// Pull the header after `cursor` (`None` starts the pass) from the
    /// given request of the last transfer; `None` request means the final
    /// hop. Returns `None` at the end of the single pass. Only legal when
    /// `version() >= HEADER_ITERATION_MIN_VERSION`.
    fn next_header(
        &mut self,
        origin: HeaderOrigin,
        request: Option<usize>,
        cursor: Option<usize>,
    ) -> Option<HeaderEntry>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_renders_its_verb() {
        assert_eq!(Method::Get.as_str(), "GET");
        assert_eq!(Method::Head.as_str(), "HEAD");
        assert_eq!(Method::Custom("PATCH".to_string()).as_str(), "PATCH");
        assert_eq!(Method::Post.to_string(), "POST");
    }

    #[test]
    fn versions_order_by_component() {
        assert!(TransportVersion::new(7, 81, 0) < HEADER_ITERATION_MIN_VERSION);
        assert!(TransportVersion::new(7, 84, 0) >= HEADER_ITERATION_MIN_VERSION);
        assert!(TransportVersion::new(8, 0, 1) > HEADER_ITERATION_MIN_VERSION);
        assert_eq!(TransportVersion::new(8, 4, 0).to_string(), "8.4.0");
    }

    #[test]
    fn origin_mask_composes() {
        let mask = HeaderOrigin::all_origins();
        assert!(mask.contains(HeaderOrigin::HEADER));
        assert!(mask.contains(HeaderOrigin::TRAILER));
        assert!(!HeaderOrigin::HEADER.contains(HeaderOrigin::CONNECT));
    }
}
