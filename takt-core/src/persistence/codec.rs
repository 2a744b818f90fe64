//! Versioned stream primitives.
//!
//! ```text
//! +-------------------------------------------+
//! | magic "TAKT" (4) | format version u32 (4) |
//! +-------------------------------------------+
//! | entity fields, little endian              |
//! +-------------------------------------------+
//! ```
//!
//! Strings are a `u32` byte length followed by UTF-8. Lists are a `u32`
//! count followed by the elements. Options are a presence byte followed by
//! the value. Timestamps are `i64` milliseconds since the Unix epoch.

use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};

use crate::error::CodecError;

pub const MAGIC: [u8; 4] = *b"TAKT";

/// Which fields a writer emits. Both modes share one layout; client mode
/// blanks server-only fields instead of omitting them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Full,
    Client,
}

impl WriteMode {
    pub fn is_client(self) -> bool {
        self == WriteMode::Client
    }
}

pub struct Writer<W: Write> {
    inner: W,
    mode: WriteMode,
}

impl<W: Write> Writer<W> {
    pub fn new(inner: W, mode: WriteMode) -> Self {
        Self { inner, mode }
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Magic plus the version the rest of the stream is written in.
    pub fn header(&mut self, version: u32) -> io::Result<()> {
        self.inner.write_all(&MAGIC)?;
        self.u32(version)
    }

    pub fn u8(&mut self, v: u8) -> io::Result<()> {
        self.inner.write_u8(v)
    }

    pub fn bool(&mut self, v: bool) -> io::Result<()> {
        self.inner.write_u8(v as u8)
    }

    pub fn u32(&mut self, v: u32) -> io::Result<()> {
        self.inner.write_u32::<LittleEndian>(v)
    }

    pub fn u64(&mut self, v: u64) -> io::Result<()> {
        self.inner.write_u64::<LittleEndian>(v)
    }

    pub fn f64(&mut self, v: f64) -> io::Result<()> {
        self.inner.write_f64::<LittleEndian>(v)
    }

    pub fn str(&mut self, v: &str) -> io::Result<()> {
        self.len(v.len())?;
        self.inner.write_all(v.as_bytes())
    }

    pub fn datetime(&mut self, v: &DateTime<Utc>) -> io::Result<()> {
        self.inner.write_i64::<LittleEndian>(v.timestamp_millis())
    }

    pub fn option<T>(
        &mut self,
        v: Option<&T>,
        mut f: impl FnMut(&mut Self, &T) -> io::Result<()>,
    ) -> io::Result<()> {
        match v {
            Some(value) => {
                self.bool(true)?;
                f(self, value)
            }
            None => self.bool(false),
        }
    }

    pub fn list<T>(
        &mut self,
        items: &[T],
        mut f: impl FnMut(&mut Self, &T) -> io::Result<()>,
    ) -> io::Result<()> {
        self.len(items.len())?;
        for item in items {
            f(self, item)?;
        }
        Ok(())
    }

    fn len(&mut self, len: usize) -> io::Result<()> {
        let len = u32::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length exceeds u32"))?;
        self.u32(len)
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reader over an in-memory stream, pinned to the stream's format version.
pub struct Reader<'a> {
    inner: Cursor<&'a [u8]>,
    version: u32,
}

impl<'a> Reader<'a> {
    /// Reads the header and returns a reader pinned to its version.
    pub fn open(bytes: &'a [u8]) -> Result<Self, CodecError> {
        let mut inner = Cursor::new(bytes);
        let mut magic = [0u8; 4];
        inner.read_exact(&mut magic).map_err(|_| CodecError::BadMagic)?;
        if magic != MAGIC {
            return Err(CodecError::BadMagic);
        }
        let version = inner.read_u32::<LittleEndian>()?;
        Ok(Self { inner, version })
    }

    /// Reader over a headerless body, pinned to `version`.
    pub fn pinned(bytes: &'a [u8], version: u32) -> Self {
        Self {
            inner: Cursor::new(bytes),
            version,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn remaining(&self) -> usize {
        let len = self.inner.get_ref().len() as u64;
        len.saturating_sub(self.inner.position()) as usize
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.inner.read_u8()?)
    }

    pub fn bool(&mut self) -> Result<bool, CodecError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::Corrupt(format!("invalid bool byte {}", other))),
        }
    }

    pub fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(self.inner.read_u32::<LittleEndian>()?)
    }

    pub fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(self.inner.read_u64::<LittleEndian>()?)
    }

    pub fn f64(&mut self) -> Result<f64, CodecError> {
        Ok(self.inner.read_f64::<LittleEndian>()?)
    }

    pub fn string(&mut self) -> Result<String, CodecError> {
        let len = self.len(1)?;
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|e| CodecError::Corrupt(format!("invalid utf-8: {}", e)))
    }

    pub fn datetime(&mut self) -> Result<DateTime<Utc>, CodecError> {
        let millis = self.inner.read_i64::<LittleEndian>()?;
        DateTime::<Utc>::from_timestamp_millis(millis)
            .ok_or_else(|| CodecError::Corrupt(format!("timestamp {} out of range", millis)))
    }

    pub fn option<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, CodecError>,
    ) -> Result<Option<T>, CodecError> {
        if self.bool()? {
            Ok(Some(f(self)?))
        } else {
            Ok(None)
        }
    }

    pub fn list<T>(
        &mut self,
        mut f: impl FnMut(&mut Self) -> Result<T, CodecError>,
    ) -> Result<Vec<T>, CodecError> {
        let count = self.len(1)?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(f(self)?);
        }
        Ok(items)
    }

    /// A length prefix, rejected if the remaining bytes cannot hold that many
    /// elements of at least `min_size` bytes each.
    fn len(&mut self, min_size: usize) -> Result<usize, CodecError> {
        let len = self.u32()? as usize;
        if len.saturating_mul(min_size) > self.remaining() {
            return Err(CodecError::Corrupt(format!(
                "length {} exceeds the {} bytes left in the stream",
                len,
                self.remaining()
            )));
        }
        Ok(len)
    }
}
