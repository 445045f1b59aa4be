//! Shared test support: a mock-server launcher and a loopback transport.
//!
//! The loopback transport implements the `Transport` contract with minimal
//! blocking HTTP/1.1 framing over a `TcpStream`. Wire framing lives here,
//! in test support, so the core library never has to speak HTTP itself.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};

use nethaul_core::{
    HeaderEntry, HeaderOrigin, Method, ReadOutcome, SeekOrigin, SeekOutcome, TransferHandler,
    Transport, TransportFailure, TransportOption, TransportVersion, DEFAULT_USER_AGENT,
};

pub const CONNECT_ERROR: i32 = 7;
pub const WRITE_ERROR: i32 = 23;
pub const READ_ERROR: i32 = 26;
pub const SEEK_ERROR: i32 = 65;

/// Start a mock server on a random port and return its address.
pub fn start_server() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    addr
}

/// A `Transport` over plain TCP, enough HTTP/1.1 to drive the engine's
/// callbacks against a live server: one request per connection, redirects
/// followed by reconnecting, bodies read to EOF.
pub struct LoopbackTransport {
    url: Option<String>,
    method: Method,
    user_agent: String,
    header_lines: Vec<String>,
    follow_redirects: bool,
    max_redirects: u32,
    has_upload: bool,
    response_code: Option<i64>,
    effective_method: Option<String>,
    final_headers: Vec<(String, String)>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            url: None,
            method: Method::Get,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            header_lines: Vec::new(),
            follow_redirects: false,
            max_redirects: 0,
            has_upload: false,
            response_code: None,
            effective_method: None,
            final_headers: Vec::new(),
        }
    }
}

/// Split `http://host:port/path` into authority and path.
fn split_url(url: &str) -> Result<(String, String), TransportFailure> {
    let rest = url
        .strip_prefix("http://")
        .ok_or_else(|| TransportFailure::new(1, "unsupported scheme"))?;
    Ok(match rest.find('/') {
        Some(i) => (rest[..i].to_string(), rest[i..].to_string()),
        None => (rest.to_string(), "/".to_string()),
    })
}

/// Drain the engine's read callback into one buffer.
fn gather_upload(handler: &mut dyn TransferHandler) -> Result<Vec<u8>, TransportFailure> {
    let mut body = Vec::new();
    loop {
        let mut buf = [0u8; 4096];
        match handler.fill_upload(&mut buf) {
            ReadOutcome::Read(0) => break,
            ReadOutcome::Read(n) => body.extend_from_slice(&buf[..n]),
            ReadOutcome::Pause => {
                return Err(TransportFailure::new(READ_ERROR, "unexpected pause"))
            }
            ReadOutcome::Abort => {
                return Err(TransportFailure::new(READ_ERROR, "aborted by read callback"))
            }
        }
    }
    Ok(body)
}

impl Transport for LoopbackTransport {
    fn set_option(&mut self, option: TransportOption<'_>) -> Result<(), TransportFailure> {
        match option {
            TransportOption::Url(url) => self.url = Some(url.to_string()),
            TransportOption::Method(method) => self.method = method.clone(),
            TransportOption::UserAgent(ua) => self.user_agent = ua.to_string(),
            TransportOption::Headers(list) => self.header_lines = list.lines().to_vec(),
            TransportOption::FollowRedirects(follow) => self.follow_redirects = follow,
            TransportOption::MaxRedirects(max) => self.max_redirects = max,
            TransportOption::HasUploadBody(has) => self.has_upload = has,
            TransportOption::UploadSize(_) | TransportOption::UploadSizeLarge(_) => {}
        }
        Ok(())
    }

    fn perform(&mut self, handler: &mut dyn TransferHandler) -> Result<(), TransportFailure> {
        let url = self
            .url
            .clone()
            .ok_or_else(|| TransportFailure::new(3, "no url configured"))?;
        let (mut host, mut path) = split_url(&url)?;
        let mut method = self.method.as_str().to_string();
        let mut body = if self.has_upload {
            Some(gather_upload(handler)?)
        } else {
            None
        };
        let mut hops = 0u32;

        loop {
            let mut stream = TcpStream::connect(&host)
                .map_err(|e| TransportFailure::new(CONNECT_ERROR, e.to_string()))?;

            let mut request = format!(
                "{method} {path} HTTP/1.1\r\nHost: {host}\r\nUser-Agent: {}\r\nAccept: */*\r\nConnection: close\r\n",
                self.user_agent
            );
            for line in &self.header_lines {
                request.push_str(line);
                request.push_str("\r\n");
            }
            if let Some(body) = &body {
                request.push_str(&format!("Content-Length: {}\r\n", body.len()));
            }
            request.push_str("\r\n");

            stream
                .write_all(request.as_bytes())
                .and_then(|_| match &body {
                    Some(body) => stream.write_all(body),
                    None => Ok(()),
                })
                .map_err(|e| TransportFailure::new(WRITE_ERROR, e.to_string()))?;

            let mut reader = BufReader::new(stream);

            let mut status_line = String::new();
            reader
                .read_line(&mut status_line)
                .map_err(|e| TransportFailure::new(READ_ERROR, e.to_string()))?;
            if !handler.header_line(status_line.as_bytes()) {
                return Err(TransportFailure::new(WRITE_ERROR, "header callback failed"));
            }
            let code: i64 = status_line
                .split_whitespace()
                .nth(1)
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| TransportFailure::new(READ_ERROR, "bad status line"))?;

            let mut headers: Vec<(String, String)> = Vec::new();
            let mut location: Option<String> = None;
            loop {
                let mut line = String::new();
                reader
                    .read_line(&mut line)
                    .map_err(|e| TransportFailure::new(READ_ERROR, e.to_string()))?;
                if !handler.header_line(line.as_bytes()) {
                    return Err(TransportFailure::new(WRITE_ERROR, "header callback failed"));
                }
                let trimmed = line.trim_end();
                if trimmed.is_empty() {
                    break;
                }
                if let Some((name, value)) = trimmed.split_once(':') {
                    let name = name.trim().to_string();
                    let value = value.trim().to_string();
                    if name.eq_ignore_ascii_case("location") {
                        location = Some(value.clone());
                    }
                    headers.push((name, value));
                }
            }

            let redirect = (300..400).contains(&code)
                && location.is_some()
                && self.follow_redirects
                && hops < self.max_redirects;

            if redirect {
                // Redirect-hop bodies are drained without reaching the
                // write callback.
                let mut discard = Vec::new();
                let _ = reader.read_to_end(&mut discard);

                hops += 1;
                let target = location.unwrap();
                if let Some(rest) = target.strip_prefix("http://") {
                    let split = split_url(&format!("http://{rest}"))?;
                    host = split.0;
                    path = split.1;
                } else {
                    path = target;
                }

                let keeps_method = code == 307 || code == 308;
                if !keeps_method && method != "GET" && method != "HEAD" {
                    // 301/302/303 rewrite the verb and drop the body.
                    method = "GET".to_string();
                    body = None;
                } else if keeps_method && self.has_upload {
                    match handler.seek_upload(0, SeekOrigin::Start) {
                        SeekOutcome::Ok | SeekOutcome::CantSeek => {
                            body = Some(gather_upload(handler)?);
                        }
                        SeekOutcome::Fail => {
                            return Err(TransportFailure::new(
                                SEEK_ERROR,
                                "could not rewind upload body",
                            ));
                        }
                    }
                }
                continue;
            }

            // Final hop: stream the body through the write callback.
            loop {
                let mut buf = [0u8; 4096];
                let n = reader
                    .read(&mut buf)
                    .map_err(|e| TransportFailure::new(READ_ERROR, e.to_string()))?;
                if n == 0 {
                    break;
                }
                let consumed = handler.body_chunk(&buf[..n]);
                if consumed < n {
                    return Err(TransportFailure::new(
                        WRITE_ERROR,
                        "write callback refused data",
                    ));
                }
            }

            self.response_code = Some(code);
            self.effective_method = Some(method);
            self.final_headers = headers;
            return Ok(());
        }
    }

    fn response_code(&self) -> Result<i64, TransportFailure> {
        self.response_code
            .ok_or_else(|| TransportFailure::new(READ_ERROR, "no transfer performed"))
    }

    fn effective_method(&self) -> Result<String, TransportFailure> {
        self.effective_method
            .clone()
            .ok_or_else(|| TransportFailure::new(READ_ERROR, "no transfer performed"))
    }

    fn version(&self) -> TransportVersion {
        TransportVersion::new(8, 4, 0)
    }

    fn next_header(
        &mut self,
        _origin: HeaderOrigin,
        _request: Option<usize>,
        cursor: Option<usize>,
    ) -> Option<HeaderEntry> {
        let index = cursor.map(|c| c + 1).unwrap_or(0);
        self.final_headers
            .get(index)
            .map(|(name, value)| HeaderEntry {
                name: name.clone(),
                value: value.clone(),
                cursor: index,
            })
    }
}
