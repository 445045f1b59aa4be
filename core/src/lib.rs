//! Cross-platform socket address model and blocking HTTP transfer engine.
//!
//! # Overview
//! Two cooperating subsystems. `addr` wraps the platform's fixed-layout
//! `sockaddr` structures (IPv4, IPv6, UNIX-domain) behind typed accessors
//! that hide the BSD-vs-Linux layout differences. `engine` drives one
//! blocking HTTP exchange through a handle-based transport, translating
//! between the engine's buffering and the transport's callback model.
//!
//! # Design
//! - The transport is an external collaborator described by the `Transport`
//!   trait; the core never speaks wire HTTP itself, so it stays fully
//!   deterministic and testable against scripted transports.
//! - Callbacks carry typed references to session-owned state instead of raw
//!   user-data pointers; no callback can outlive its session.
//! - Everything is single-threaded and synchronous: callbacks are nested
//!   invocations on the calling thread, never background tasks.

pub mod addr;
pub mod engine;
pub mod error;
pub mod transport;
pub mod upload;

pub use addr::{
    address_to_text, text_to_address, AddressFamily, IpBytes, Ipv4SocketAddress,
    Ipv6SocketAddress, SocketAddress, UnixSocketAddress,
};
pub use engine::{HeaderField, HeaderList, TransferSession, DEFAULT_USER_AGENT};
pub use error::{AddressError, TransferError, TransportFailure};
pub use transport::{
    HeaderEntry, HeaderOrigin, Method, ReadOutcome, SeekOrigin, SeekOutcome, TransferHandler,
    Transport, TransportOption, TransportVersion, HEADER_ITERATION_MIN_VERSION,
};
pub use upload::UploadBody;
