//! Socket address model over platform-native `sockaddr` layouts.
//!
//! # Overview
//! Typed wrappers around `libc::sockaddr_in` / `sockaddr_in6` / `sockaddr_un`
//! plus presentation⇄binary conversion for IP addresses. The wrappers keep
//! the native byte layout so a pointer to the wrapped struct can be handed to
//! the platform socket layer directly, while the accessors expose everything
//! in host byte order.
//!
//! # Design
//! - BSD/Darwin prefix each `sockaddr` with a length byte; Linux does not.
//!   `size()` hides the difference: it reads the length field where one
//!   exists and falls back to the static structure size where it doesn't.
//! - Setting a UNIX path zero-fills the whole `sun_path` field before the
//!   copy so a shorter path never leaves trailing bytes from a longer
//!   predecessor. An oversized path fails without touching stored state.

use std::fmt;
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::AddressError;

/// Address family tag. Drives which variant's binary layout applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    Unspecified,
    Unix,
    Ipv4,
    Ipv6,
    /// Any other family the platform knows about, kept as its raw value.
    Other(libc::sa_family_t),
}

impl AddressFamily {
    /// The platform's `AF_*` value for this family.
    pub fn raw(self) -> libc::sa_family_t {
        match self {
            AddressFamily::Unspecified => libc::AF_UNSPEC as libc::sa_family_t,
            AddressFamily::Unix => libc::AF_UNIX as libc::sa_family_t,
            AddressFamily::Ipv4 => libc::AF_INET as libc::sa_family_t,
            AddressFamily::Ipv6 => libc::AF_INET6 as libc::sa_family_t,
            AddressFamily::Other(value) => value,
        }
    }

    pub fn from_raw(raw: libc::sa_family_t) -> Self {
        match raw as i32 {
            libc::AF_UNSPEC => AddressFamily::Unspecified,
            libc::AF_UNIX => AddressFamily::Unix,
            libc::AF_INET => AddressFamily::Ipv4,
            libc::AF_INET6 => AddressFamily::Ipv6,
            _ => AddressFamily::Other(raw),
        }
    }
}

/// Binary form of an IP address, tagged by length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpBytes {
    V4([u8; 4]),
    V6([u8; 16]),
}

/// Parse a presentation-format address string into its binary form for the
/// given family. IPv4 must be a full dotted quad; IPv6 accepts any RFC 4291
/// text form.
pub fn text_to_address(family: AddressFamily, text: &str) -> Result<IpBytes, AddressError> {
    match family {
        AddressFamily::Ipv4 => text
            .parse::<Ipv4Addr>()
            .map(|addr| IpBytes::V4(addr.octets()))
            .map_err(|_| AddressError::InvalidFormat { family }),
        AddressFamily::Ipv6 => text
            .parse::<Ipv6Addr>()
            .map(|addr| IpBytes::V6(addr.octets()))
            .map_err(|_| AddressError::InvalidFormat { family }),
        _ => Err(AddressError::InvalidFormat { family }),
    }
}

/// Render a binary address in canonical presentation form: dotted quad for
/// IPv4, RFC 5952 lowercase/compressed for IPv6. Fails if the family does
/// not match the byte layout.
pub fn address_to_text(family: AddressFamily, address: &IpBytes) -> Result<String, AddressError> {
    match (family, address) {
        (AddressFamily::Ipv4, IpBytes::V4(octets)) => Ok(Ipv4Addr::from(*octets).to_string()),
        (AddressFamily::Ipv6, IpBytes::V6(octets)) => Ok(Ipv6Addr::from(*octets).to_string()),
        _ => Err(AddressError::Conversion { family }),
    }
}

/// An IPv4 socket address (`sockaddr_in`).
#[derive(Clone, Copy)]
pub struct Ipv4SocketAddress {
    raw: libc::sockaddr_in,
}

impl Ipv4SocketAddress {
    pub fn new(address: Ipv4Addr, port: u16) -> Self {
        let mut raw: libc::sockaddr_in = unsafe { mem::zeroed() };
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        {
            raw.sin_len = mem::size_of::<libc::sockaddr_in>() as u8;
        }
        raw.sin_family = libc::AF_INET as libc::sa_family_t;
        raw.sin_port = port.to_be();
        raw.sin_addr = libc::in_addr {
            s_addr: u32::from(address).to_be(),
        };
        Self { raw }
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::from_raw(self.raw.sin_family)
    }

    pub fn address(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from_be(self.raw.sin_addr.s_addr))
    }

    pub fn set_address(&mut self, address: Ipv4Addr) {
        self.raw.sin_addr.s_addr = u32::from(address).to_be();
    }

    /// Port in host byte order.
    pub fn port(&self) -> u16 {
        u16::from_be(self.raw.sin_port)
    }

    pub fn set_port(&mut self, port: u16) {
        self.raw.sin_port = port.to_be();
    }

    /// Platform-correct size of the underlying structure.
    pub fn size(&self) -> usize {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            mem::size_of::<libc::sockaddr_in>()
        }
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        {
            self.raw.sin_len as usize
        }
    }

    /// The wrapped native structure.
    pub fn as_raw(&self) -> &libc::sockaddr_in {
        &self.raw
    }
}

impl fmt::Debug for Ipv4SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ipv4SocketAddress")
            .field("address", &self.address())
            .field("port", &self.port())
            .finish()
    }
}

impl fmt::Display for Ipv4SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address(), self.port())
    }
}

/// An IPv6 socket address (`sockaddr_in6`).
#[derive(Clone, Copy)]
pub struct Ipv6SocketAddress {
    raw: libc::sockaddr_in6,
}

impl Ipv6SocketAddress {
    pub fn new(address: Ipv6Addr, port: u16) -> Self {
        let mut raw: libc::sockaddr_in6 = unsafe { mem::zeroed() };
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        {
            raw.sin6_len = mem::size_of::<libc::sockaddr_in6>() as u8;
        }
        raw.sin6_family = libc::AF_INET6 as libc::sa_family_t;
        raw.sin6_port = port.to_be();
        raw.sin6_addr.s6_addr = address.octets();
        Self { raw }
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::from_raw(self.raw.sin6_family)
    }

    pub fn address(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.raw.sin6_addr.s6_addr)
    }

    /// The 16 raw address bytes, identical on every platform regardless of
    /// how the native headers group the `in6_addr` words.
    pub fn octets(&self) -> [u8; 16] {
        self.raw.sin6_addr.s6_addr
    }

    pub fn set_octets(&mut self, octets: &[u8; 16]) {
        self.raw.sin6_addr.s6_addr = *octets;
    }

    /// Port in host byte order.
    pub fn port(&self) -> u16 {
        u16::from_be(self.raw.sin6_port)
    }

    pub fn set_port(&mut self, port: u16) {
        self.raw.sin6_port = port.to_be();
    }

    pub fn flow_id(&self) -> u32 {
        self.raw.sin6_flowinfo
    }

    pub fn set_flow_id(&mut self, flow_id: u32) {
        self.raw.sin6_flowinfo = flow_id;
    }

    pub fn scope_id(&self) -> u32 {
        self.raw.sin6_scope_id
    }

    pub fn set_scope_id(&mut self, scope_id: u32) {
        self.raw.sin6_scope_id = scope_id;
    }

    /// Platform-correct size of the underlying structure.
    pub fn size(&self) -> usize {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            mem::size_of::<libc::sockaddr_in6>()
        }
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        {
            self.raw.sin6_len as usize
        }
    }

    /// The wrapped native structure.
    pub fn as_raw(&self) -> &libc::sockaddr_in6 {
        &self.raw
    }
}

impl fmt::Debug for Ipv6SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ipv6SocketAddress")
            .field("address", &self.address())
            .field("port", &self.port())
            .field("flow_id", &self.flow_id())
            .field("scope_id", &self.scope_id())
            .finish()
    }
}

impl fmt::Display for Ipv6SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]:{}", self.address(), self.port())
    }
}

/// A UNIX-domain socket address (`sockaddr_un`).
#[derive(Clone, Copy)]
pub struct UnixSocketAddress {
    raw: libc::sockaddr_un,
}

impl UnixSocketAddress {
    /// Capacity of `sun_path` in bytes, terminator included. 108 on Linux,
    /// 104 on Darwin and the BSDs.
    pub fn path_capacity() -> usize {
        let probe: libc::sockaddr_un = unsafe { mem::zeroed() };
        probe.sun_path.len()
    }

    pub fn new(path: &str) -> Result<Self, AddressError> {
        let mut raw: libc::sockaddr_un = unsafe { mem::zeroed() };
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        {
            raw.sun_len = mem::size_of::<libc::sockaddr_un>() as u8;
        }
        raw.sun_family = libc::AF_UNIX as libc::sa_family_t;
        let mut address = Self { raw };
        address.set_path(path)?;
        Ok(address)
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::from_raw(self.raw.sun_family)
    }

    /// The stored path, read up to the first NUL.
    pub fn path(&self) -> String {
        let bytes: Vec<u8> = self
            .raw
            .sun_path
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Replace the stored path.
    ///
    /// The path and its terminator must fit in `sun_path`; otherwise the
    /// stored path is left exactly as it was. On success the whole field is
    /// zero-filled before the copy.
    pub fn set_path(&mut self, path: &str) -> Result<(), AddressError> {
        let bytes = path.as_bytes();
        let max = self.raw.sun_path.len();
        if bytes.len() + 1 > max {
            return Err(AddressError::PathTooLong {
                len: bytes.len(),
                max,
            });
        }
        for slot in self.raw.sun_path.iter_mut() {
            *slot = 0;
        }
        for (slot, &byte) in self.raw.sun_path.iter_mut().zip(bytes) {
            *slot = byte as libc::c_char;
        }
        Ok(())
    }

    /// Platform-correct size of the underlying structure.
    pub fn size(&self) -> usize {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            mem::size_of::<libc::sockaddr_un>()
        }
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        {
            self.raw.sun_len as usize
        }
    }

    /// The wrapped native structure.
    pub fn as_raw(&self) -> &libc::sockaddr_un {
        &self.raw
    }
}

impl fmt::Debug for UnixSocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnixSocketAddress")
            .field("path", &self.path())
            .finish()
    }
}

/// A socket address of any supported family.
#[derive(Debug, Clone, Copy)]
pub enum SocketAddress {
    Unix(UnixSocketAddress),
    V4(Ipv4SocketAddress),
    V6(Ipv6SocketAddress),
}

impl SocketAddress {
    pub fn family(&self) -> AddressFamily {
        match self {
            SocketAddress::Unix(addr) => addr.family(),
            SocketAddress::V4(addr) => addr.family(),
            SocketAddress::V6(addr) => addr.family(),
        }
    }

    /// Platform-correct size of the wrapped structure: the embedded length
    /// field where the platform has one, the static size where it doesn't.
    pub fn size(&self) -> usize {
        match self {
            SocketAddress::Unix(addr) => addr.size(),
            SocketAddress::V4(addr) => addr.size(),
            SocketAddress::V6(addr) => addr.size(),
        }
    }
}

impl From<UnixSocketAddress> for SocketAddress {
    fn from(addr: UnixSocketAddress) -> Self {
        SocketAddress::Unix(addr)
    }
}

impl From<Ipv4SocketAddress> for SocketAddress {
    fn from(addr: Ipv4SocketAddress) -> Self {
        SocketAddress::V4(addr)
    }
}

impl From<Ipv6SocketAddress> for SocketAddress {
    fn from(addr: Ipv6SocketAddress) -> Self {
        SocketAddress::V6(addr)
    }
}
