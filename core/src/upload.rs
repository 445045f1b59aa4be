//! Upload body sources and the redirect replay cache.
//!
//! # Design
//! An upload source is consumed exactly once. When redirects are allowed the
//! engine tees the first hop's bytes into a `ReplayCache` so later hops can
//! re-send the body without re-reading the (possibly unrepeatable) source.
//! The cache lives in memory up to a threshold and then spills to an
//! unlinked temporary file, so huge uploads don't pin their whole body in
//! RAM just because a redirect might happen.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// Bytes to keep in memory before the cache spills to a temporary file.
const SPILL_THRESHOLD: u64 = 5 * 1024 * 1024;

/// Source of an outgoing request body.
pub enum UploadBody {
    /// An owned buffer; reads advance an internal position.
    Bytes(Cursor<Vec<u8>>),
    /// An arbitrary reader, not assumed to be repeatable.
    Reader(Box<dyn Read + Send>),
}

impl UploadBody {
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        UploadBody::Bytes(Cursor::new(data.into()))
    }

    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        UploadBody::Reader(Box::new(reader))
    }

    /// Total size when the source knows it up front.
    pub fn len_hint(&self) -> Option<u64> {
        match self {
            UploadBody::Bytes(cursor) => Some(cursor.get_ref().len() as u64),
            UploadBody::Reader(_) => None,
        }
    }

    pub(crate) fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            UploadBody::Bytes(cursor) => cursor.read(buf),
            UploadBody::Reader(reader) => reader.read(buf),
        }
    }
}

impl std::fmt::Debug for UploadBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadBody::Bytes(cursor) => f
                .debug_struct("UploadBody::Bytes")
                .field("len", &cursor.get_ref().len())
                .finish(),
            UploadBody::Reader(_) => f.write_str("UploadBody::Reader"),
        }
    }
}

trait CacheIo: Read + Write + Seek + Send {}
impl<T: Read + Write + Seek + Send> CacheIo for T {}

enum CacheStore {
    Memory(Cursor<Vec<u8>>),
    File(File),
}

/// Replay buffer for the upload body across redirect hops.
pub(crate) struct ReplayCache {
    store: CacheStore,
}

impl ReplayCache {
    /// `expected_size` (when known) decides the initial backing store so a
    /// large body never passes through the in-memory arm at all.
    pub fn new(expected_size: Option<u64>) -> io::Result<Self> {
        let store = match expected_size {
            Some(size) if size > SPILL_THRESHOLD => CacheStore::File(tempfile::tempfile()?),
            _ => CacheStore::Memory(Cursor::new(Vec::new())),
        };
        Ok(Self { store })
    }

    fn io(&mut self) -> &mut dyn CacheIo {
        match &mut self.store {
            CacheStore::Memory(cursor) => cursor,
            CacheStore::File(file) => file,
        }
    }

    /// Append `chunk` at the current position, spilling to a temporary file
    /// once the in-memory arm crosses the threshold.
    pub fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        if let CacheStore::Memory(cursor) = &mut self.store {
            if cursor.position() > SPILL_THRESHOLD {
                let mut file = tempfile::tempfile()?;
                file.write_all(cursor.get_ref())?;
                self.store = CacheStore::File(file);
            }
        }
        self.io().write_all(chunk)
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.io().read(buf)
    }

    pub fn offset(&mut self) -> io::Result<u64> {
        self.io().stream_position()
    }

    pub fn seek_to_start(&mut self) -> io::Result<()> {
        self.io().seek(SeekFrom::Start(0)).map(|_| ())
    }

    pub fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.io().seek(SeekFrom::Start(offset)).map(|_| ())
    }

    pub fn seek_by(&mut self, delta: i64) -> io::Result<()> {
        self.io().seek(SeekFrom::Current(delta)).map(|_| ())
    }

    pub fn seek_from_end(&mut self, delta: i64) -> io::Result<()> {
        self.io().seek(SeekFrom::End(delta)).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_source_reads_in_chunks_until_empty() {
        let mut body = UploadBody::from_bytes(b"abcdef".to_vec());
        assert_eq!(body.len_hint(), Some(6));

        let mut buf = [0u8; 4];
        assert_eq!(body.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"abcd");
        assert_eq!(body.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(body.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn reader_source_has_no_len_hint() {
        let body = UploadBody::from_reader(Cursor::new(b"xyz".to_vec()));
        assert_eq!(body.len_hint(), None);
    }

    #[test]
    fn cache_replays_written_bytes_after_rewind() {
        let mut cache = ReplayCache::new(Some(11)).unwrap();
        cache.write(b"hello ").unwrap();
        cache.write(b"world").unwrap();
        cache.seek_to_start().unwrap();

        let mut buf = [0u8; 16];
        let n = cache.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello world");
    }

    #[test]
    fn cache_supports_all_three_seek_origins() {
        let mut cache = ReplayCache::new(None).unwrap();
        cache.write(b"0123456789").unwrap();

        cache.seek_to(4).unwrap();
        assert_eq!(cache.offset().unwrap(), 4);

        cache.seek_by(2).unwrap();
        assert_eq!(cache.offset().unwrap(), 6);

        cache.seek_from_end(-3).unwrap();
        assert_eq!(cache.offset().unwrap(), 7);

        let mut buf = [0u8; 8];
        let n = cache.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"789");
    }

    #[test]
    fn oversized_hint_starts_on_the_file_arm() {
        let mut cache = ReplayCache::new(Some(SPILL_THRESHOLD + 1)).unwrap();
        assert!(matches!(cache.store, CacheStore::File(_)));
        cache.write(b"spilled").unwrap();
        cache.seek_to_start().unwrap();
        let mut buf = [0u8; 16];
        let n = cache.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"spilled");
    }
}
