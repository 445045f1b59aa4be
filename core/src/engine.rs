//! Blocking HTTP transfer engine over a handle-based transport.
//!
//! # Overview
//! A `TransferSession` owns one request/response exchange: it forwards
//! configuration to the transport as symbolic options, binds a callback
//! adapter around its own buffers for the duration of `perform`, and exposes
//! the accumulated results afterwards. The transport drives the adapter
//! reentrantly on the calling thread; nothing here spawns or locks.
//!
//! # Design
//! - The adapter tracks redirect hops by watching status lines. Header
//!   collection resets at the start of every hop so only the final hop's
//!   headers survive, and body bytes of non-final hops are consumed and
//!   discarded.
//! - When redirects are allowed and an upload body is present, the first
//!   hop's bytes are teed into a replay cache; later hops re-send from the
//!   cache so an unrepeatable source is read exactly once.
//! - All owned resources (header list, replay cache, callback state) are
//!   released exactly once when the session drops, on every exit path.

use std::io::Write;

use once_cell::sync::OnceCell;
use tracing::{debug, trace};

use crate::error::{TransferError, TransportFailure};
use crate::transport::{
    HeaderEntry, HeaderOrigin, Method, ReadOutcome, SeekOrigin, SeekOutcome, TransferHandler,
    Transport, TransportOption, TransportVersion, HEADER_ITERATION_MIN_VERSION,
};
use crate::upload::{ReplayCache, UploadBody};

/// User-agent applied to every new session until overridden.
pub const DEFAULT_USER_AGENT: &str = "nethaul/0.1";

/// Append-only ordered sequence of raw outgoing header lines.
///
/// Owned exclusively by its session: created on the first append, handed to
/// the transport by reference at perform time, released exactly once when
/// the session drops.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HeaderList {
    lines: Vec<String>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// One collected response header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Configured,
    Completed,
    Failed,
}

/// One HTTP request-in-flight bound to a transport handle.
///
/// Mutable only before `perform`; read-only afterwards. A session is driven
/// by exactly one thread at a time; distinct sessions are independent.
pub struct TransferSession<T: Transport> {
    transport: T,
    state: SessionState,
    method: Method,
    headers: Option<HeaderList>,
    upload: Option<UploadBody>,
    upload_size: Option<u64>,
    sink: Option<Box<dyn Write + Send>>,
    follow_redirects: bool,
    max_redirects: u32,
    failure: Option<TransportFailure>,
    response_code: Option<i64>,
    effective_method: Option<String>,
    response_headers: Vec<HeaderField>,
    response_body: Vec<u8>,
}

impl<T: Transport> TransferSession<T> {
    /// Wrap a transport handle. Applies the default user-agent.
    pub fn new(mut transport: T) -> Result<Self, TransferError> {
        transport.set_option(TransportOption::UserAgent(DEFAULT_USER_AGENT))?;
        Ok(Self {
            transport,
            state: SessionState::Configured,
            method: Method::Get,
            headers: None,
            upload: None,
            upload_size: None,
            sink: None,
            follow_redirects: false,
            max_redirects: 0,
            failure: None,
            response_code: None,
            effective_method: None,
            response_headers: Vec::new(),
            response_body: Vec::new(),
        })
    }

    pub fn set_url(&mut self, url: &str) -> Result<(), TransferError> {
        self.transport.set_option(TransportOption::Url(url))?;
        Ok(())
    }

    pub fn set_method(&mut self, method: Method) -> Result<(), TransferError> {
        self.transport.set_option(TransportOption::Method(&method))?;
        self.method = method;
        Ok(())
    }

    pub fn set_user_agent(&mut self, user_agent: &str) -> Result<(), TransferError> {
        self.transport
            .set_option(TransportOption::UserAgent(user_agent))?;
        Ok(())
    }

    /// Append one raw header line to the outgoing request. The list is
    /// created on the first append and only ever extended afterwards.
    pub fn append_header(&mut self, line: &str) {
        self.headers.get_or_insert_with(HeaderList::new).append(line);
    }

    pub fn set_redirect_policy(&mut self, follow: bool, max: u32) -> Result<(), TransferError> {
        self.transport
            .set_option(TransportOption::FollowRedirects(follow))?;
        self.transport
            .set_option(TransportOption::MaxRedirects(max))?;
        self.follow_redirects = follow;
        self.max_redirects = max;
        Ok(())
    }

    /// Supply the request body. When the size is known it is announced to
    /// the transport through the narrow native field if it fits the 32-bit
    /// signed range and through the wide field otherwise.
    pub fn set_upload_body(
        &mut self,
        body: UploadBody,
        size: Option<u64>,
    ) -> Result<(), TransferError> {
        self.transport
            .set_option(TransportOption::HasUploadBody(true))?;
        let size = size.or_else(|| body.len_hint());
        if let Some(size) = size {
            if size <= i32::MAX as u64 {
                self.transport
                    .set_option(TransportOption::UploadSize(size as i32))?;
            } else {
                self.transport
                    .set_option(TransportOption::UploadSizeLarge(size as i64))?;
            }
        }
        self.upload = Some(body);
        self.upload_size = size;
        Ok(())
    }

    /// Stream response body bytes into `sink` instead of the internal
    /// buffer. A sink write error makes the write callback under-report its
    /// consumed count, which aborts the transfer.
    pub fn set_response_sink(&mut self, sink: Box<dyn Write + Send>) {
        self.sink = Some(sink);
    }

    /// Execute the blocking transfer. The calling thread is occupied until
    /// the exchange completes or fails; completion is terminal and a second
    /// call is a no-op, while a failed session keeps reporting its failure.
    pub fn perform(&mut self) -> Result<(), TransferError> {
        match self.state {
            SessionState::Completed => return Ok(()),
            SessionState::Failed => {
                return Err(self
                    .failure
                    .clone()
                    .map(TransferError::Transport)
                    .unwrap_or(TransferError::NotYetPerformed));
            }
            SessionState::Configured => {}
        }

        if let Some(headers) = &self.headers {
            self.transport.set_option(TransportOption::Headers(headers))?;
        }

        let effective_max = if self.follow_redirects {
            self.max_redirects
        } else {
            0
        };
        let cache = if self.upload.is_some() && effective_max != 0 {
            let cache = ReplayCache::new(self.upload_size)
                .map_err(|e| TransportFailure::new(-1, format!("replay cache: {e}")))?;
            Some(cache)
        } else {
            None
        };

        debug!(method = %self.method, "starting blocking transfer");
        let mut adapter = HopAdapter {
            upload: self.upload.as_mut(),
            sink: self.sink.as_deref_mut(),
            cache,
            max_redirects: effective_max,
            response_count: 0,
            code_is_3xx: false,
            response_code: None,
            pending: None,
            headers: Vec::new(),
            body: Vec::new(),
        };
        let result = self.transport.perform(&mut adapter);
        let (code, headers, body) = adapter.finish();

        match result {
            Ok(()) => {
                self.response_code = code.or_else(|| self.transport.response_code().ok());
                self.response_headers = headers;
                self.response_body = body;
                self.effective_method = self.transport.effective_method().ok();
                self.state = SessionState::Completed;
                debug!(
                    code = ?self.response_code,
                    headers = self.response_headers.len(),
                    body_bytes = self.response_body.len(),
                    "transfer complete"
                );
                Ok(())
            }
            Err(failure) => {
                debug!(code = failure.code, "transfer failed");
                self.failure = Some(failure.clone());
                self.state = SessionState::Failed;
                Err(TransferError::Transport(failure))
            }
        }
    }

    /// Status code of the final hop. Only valid after `perform` succeeded.
    pub fn response_code(&self) -> Result<i64, TransferError> {
        if self.state != SessionState::Completed {
            return Err(TransferError::NotYetPerformed);
        }
        self.response_code.ok_or(TransferError::NotYetPerformed)
    }

    /// The method actually used for the final hop, which may differ from
    /// the configured one after redirect rules were applied. Before
    /// completion this is the configured method.
    pub fn effective_method(&self) -> &str {
        self.effective_method
            .as_deref()
            .unwrap_or_else(|| self.method.as_str())
    }

    /// Headers of the final hop, in arrival order, duplicates preserved.
    pub fn response_headers(&self) -> Result<&[HeaderField], TransferError> {
        if self.state != SessionState::Completed {
            return Err(TransferError::NotYetPerformed);
        }
        Ok(&self.response_headers)
    }

    /// Body of the final hop. Empty when a response sink was installed.
    pub fn response_body(&self) -> Result<&[u8], TransferError> {
        if self.state != SessionState::Completed {
            return Err(TransferError::NotYetPerformed);
        }
        Ok(&self.response_body)
    }

    /// Iterate headers through the transport's pull-style enumeration.
    ///
    /// Forward-only, single pass, bound to the transport handle. Fails with
    /// `UnsupportedCapability` when the library version predates the
    /// enumeration API.
    pub fn transport_headers(
        &mut self,
        origin: HeaderOrigin,
        request: Option<usize>,
    ) -> Result<TransportHeaders<'_, T>, TransferError> {
        if self.state != SessionState::Completed {
            return Err(TransferError::NotYetPerformed);
        }
        if !header_iteration_available(self.transport.version()) {
            return Err(TransferError::UnsupportedCapability);
        }
        Ok(TransportHeaders {
            transport: &mut self.transport,
            origin,
            request,
            cursor: None,
            done: false,
        })
    }

    /// Iterate final-hop headers: through the transport's pull enumeration
    /// when the capability probe passes, from the push-collected set
    /// otherwise. Both paths yield the same pairs in the same order.
    pub fn iterate_headers(
        &mut self,
        origin: HeaderOrigin,
        request: Option<usize>,
    ) -> Result<HeaderIter<'_, T>, TransferError> {
        if self.state != SessionState::Completed {
            return Err(TransferError::NotYetPerformed);
        }
        if header_iteration_available(self.transport.version()) {
            Ok(HeaderIter::Pull(TransportHeaders {
                transport: &mut self.transport,
                origin,
                request,
                cursor: None,
                done: false,
            }))
        } else {
            Ok(HeaderIter::Collected(self.response_headers.iter()))
        }
    }
}

/// Pull-style header pass over the transport handle.
pub struct TransportHeaders<'a, T: Transport> {
    transport: &'a mut T,
    origin: HeaderOrigin,
    request: Option<usize>,
    cursor: Option<usize>,
    done: bool,
}

impl<T: Transport> Iterator for TransportHeaders<'_, T> {
    type Item = HeaderField;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self
            .transport
            .next_header(self.origin, self.request, self.cursor)
        {
            Some(HeaderEntry {
                name,
                value,
                cursor,
            }) => {
                self.cursor = Some(cursor);
                Some(HeaderField { name, value })
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

/// Header iteration over whichever source the capability probe selected.
pub enum HeaderIter<'a, T: Transport> {
    Pull(TransportHeaders<'a, T>),
    Collected(std::slice::Iter<'a, HeaderField>),
}

impl<T: Transport> Iterator for HeaderIter<'_, T> {
    type Item = HeaderField;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            HeaderIter::Pull(pull) => pull.next(),
            HeaderIter::Collected(iter) => iter.next().cloned(),
        }
    }
}

/// Whether the transport library provides pull-style header enumeration.
/// Probed once per process and cached; every later call returns the first
/// verdict.
fn header_iteration_available(version: TransportVersion) -> bool {
    static PROBE: OnceCell<bool> = OnceCell::new();
    *PROBE.get_or_init(|| version >= HEADER_ITERATION_MIN_VERSION)
}

/// Loose status-line parse: `HTTP/<major>[.<minor>] <code>`, reason phrase
/// ignored. Returns the code when it is in the 100..600 range.
fn parse_status_line(line: &[u8]) -> Option<i64> {
    fn parse_int(line: &[u8], pos: &mut usize) -> Option<i64> {
        let mut result: Option<i64> = None;
        while *pos < line.len() {
            let byte = line[*pos];
            if !byte.is_ascii_digit() {
                break;
            }
            result = Some(result.unwrap_or(0) * 10 + i64::from(byte - b'0'));
            *pos += 1;
        }
        result
    }

    let mut pos = 5; // Skip "HTTP/".
    parse_int(line, &mut pos)?;
    if pos < line.len() && line[pos] == b'.' {
        pos += 1;
        parse_int(line, &mut pos);
    }
    while pos < line.len() && line[pos] == b' ' {
        pos += 1;
    }
    let code = parse_int(line, &mut pos)?;
    if !(100..600).contains(&code) {
        return None;
    }
    Some(code)
}

/// Callback adapter bound to one `perform` invocation.
///
/// Borrows the session's upload source and sink so no callback state can
/// outlive the session; everything else is hop-local and moved back into
/// the session when the transfer ends.
struct HopAdapter<'a> {
    upload: Option<&'a mut UploadBody>,
    sink: Option<&'a mut (dyn Write + Send + 'static)>,
    cache: Option<ReplayCache>,
    max_redirects: u32,
    response_count: u32,
    code_is_3xx: bool,
    response_code: Option<i64>,
    pending: Option<HeaderField>,
    headers: Vec<HeaderField>,
    body: Vec<u8>,
}

impl HopAdapter<'_> {
    /// A hop is final when it did not redirect or when no more redirects
    /// are allowed.
    fn is_final_hop(&self) -> bool {
        !self.code_is_3xx || self.response_count == self.max_redirects + 1
    }

    fn flush_pending_header(&mut self) {
        if let Some(field) = self.pending.take() {
            self.headers.push(field);
        }
    }

    fn finish(mut self) -> (Option<i64>, Vec<HeaderField>, Vec<u8>) {
        self.flush_pending_header();
        (self.response_code, self.headers, self.body)
    }
}

impl TransferHandler for HopAdapter<'_> {
    fn header_line(&mut self, line: &[u8]) -> bool {
        // Blank separators between hops carry no information.
        if line.is_empty() || line == b"\r\n" || line == b"\n" || line[0] == 0 {
            return true;
        }

        if line.len() >= 5 && line.starts_with(b"HTTP/") {
            let Some(code) = parse_status_line(line) else {
                return false;
            };
            self.response_count += 1;
            self.response_code = Some(code);
            self.code_is_3xx = code / 100 == 3;
            // New hop: only the final hop's headers are retained.
            self.headers.clear();
            self.pending = None;
            if let Some(cache) = &mut self.cache {
                if cache.seek_to_start().is_err() {
                    return false;
                }
            }
            trace!(hop = self.response_count, code, "status line");
            return true;
        }

        if !self.is_final_hop() {
            return true;
        }

        let Ok(text) = std::str::from_utf8(line) else {
            return false;
        };

        // Folded continuation line (obs-fold) extends the previous field.
        if text.starts_with(' ') || text.starts_with('\t') {
            let Some(pending) = &mut self.pending else {
                return false;
            };
            pending.value.push(' ');
            pending.value.push_str(text.trim());
            return true;
        }

        self.flush_pending_header();
        let Some((name, value)) = text.split_once(':') else {
            return false;
        };
        self.pending = Some(HeaderField {
            name: name.trim().to_string(),
            value: value.trim().to_string(),
        });
        true
    }

    fn body_chunk(&mut self, chunk: &[u8]) -> usize {
        // Bodies of intermediate hops are consumed and discarded.
        if !self.is_final_hop() {
            return chunk.len();
        }
        self.flush_pending_header();
        trace!(bytes = chunk.len(), "body chunk");
        match &mut self.sink {
            Some(sink) => match sink.write_all(chunk) {
                Ok(()) => chunk.len(),
                // Under-reporting the consumed count aborts the transfer.
                Err(_) => 0,
            },
            None => {
                self.body.extend_from_slice(chunk);
                chunk.len()
            }
        }
    }

    fn fill_upload(&mut self, buf: &mut [u8]) -> ReadOutcome {
        let Some(upload) = self.upload.as_deref_mut() else {
            return ReadOutcome::Abort;
        };

        if self.response_count == 0 {
            // First hop: read the source, teeing into the replay cache when
            // a redirect could need the bytes again.
            let n = match upload.read(buf) {
                Ok(n) => n,
                Err(_) => return ReadOutcome::Abort,
            };
            if self.max_redirects == 0 {
                return ReadOutcome::Read(n);
            }
            let Some(cache) = &mut self.cache else {
                return ReadOutcome::Abort;
            };
            if n > 0 && cache.write(&buf[..n]).is_err() {
                return ReadOutcome::Abort;
            }
            return ReadOutcome::Read(n);
        }

        // Later hops replay from the cache.
        let Some(cache) = &mut self.cache else {
            return ReadOutcome::Abort;
        };
        match cache.read(buf) {
            Ok(n) => ReadOutcome::Read(n),
            Err(_) => ReadOutcome::Abort,
        }
    }

    fn seek_upload(&mut self, offset: i64, origin: SeekOrigin) -> SeekOutcome {
        if self.response_count == 0 {
            return SeekOutcome::CantSeek;
        }
        let Some(cache) = &mut self.cache else {
            return SeekOutcome::CantSeek;
        };
        let result = match origin {
            SeekOrigin::Start => {
                if offset < 0 {
                    return SeekOutcome::Fail;
                }
                cache.seek_to(offset as u64)
            }
            SeekOrigin::Current => cache.seek_by(offset),
            SeekOrigin::End => cache.seek_from_end(offset),
        };
        match result {
            Ok(()) => SeekOutcome::Ok,
            Err(_) => SeekOutcome::Fail,
        }
    }
}
