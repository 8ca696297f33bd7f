//! Binary wire codec
//!
//! Hand-rolled stream encoding used for node-to-node replication of the
//! metadata catalog and its diffs.
//!
//! ## Encoding rules
//!
//! ```text
//! vint / vlong   7-bit groups, low group first, high bit = continuation
//! i64 / u64 / u32  fixed-width big-endian
//! bool           one byte, 0 or 1 (anything else is corrupt)
//! string         vint byte length, then UTF-8 bytes
//! Option<T>      present-flag byte (0/1), then the value when present
//! Vec<T>         vint count, then elements
//! map<String,V>  vint count, then (key, value) pairs in ascending key order
//! ```
//!
//! Ascending key order on maps is what makes two serializations of equal
//! values byte-identical; diff equality depends on it.
//!
//! Every writer carries the negotiated peer [`TransportVersion`] so that
//! entities can gate fields on it. Malformed input surfaces
//! [`MetadataError::CorruptMetadata`], never a panic.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{MetadataError, Result};
use crate::version::TransportVersion;

/// Stream writer targeting a negotiated peer version
pub struct WireWriter<W: Write> {
    out: W,
    version: TransportVersion,
}

impl<W: Write> WireWriter<W> {
    /// Create a writer for the given peer version
    pub fn new(out: W, version: TransportVersion) -> Self {
        WireWriter { out, version }
    }

    /// The peer version this stream is written for
    #[inline]
    pub fn version(&self) -> TransportVersion {
        self.version
    }

    /// Consume the writer, returning the underlying sink
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Write a variable-length u32
    pub fn write_vint(&mut self, mut value: u32) -> Result<()> {
        while value >= 0x80 {
            self.out.write_u8((value as u8 & 0x7f) | 0x80)?;
            value >>= 7;
        }
        self.out.write_u8(value as u8)?;
        Ok(())
    }

    /// Write a variable-length u64
    pub fn write_vlong(&mut self, mut value: u64) -> Result<()> {
        while value >= 0x80 {
            self.out.write_u8((value as u8 & 0x7f) | 0x80)?;
            value >>= 7;
        }
        self.out.write_u8(value as u8)?;
        Ok(())
    }

    /// Write a fixed-width big-endian i64
    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.out.write_i64::<BigEndian>(value)?;
        Ok(())
    }

    /// Write a fixed-width big-endian u64
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.out.write_u64::<BigEndian>(value)?;
        Ok(())
    }

    /// Write a fixed-width big-endian u32
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.out.write_u32::<BigEndian>(value)?;
        Ok(())
    }

    /// Write a single byte
    pub fn write_byte(&mut self, value: u8) -> Result<()> {
        self.out.write_u8(value)?;
        Ok(())
    }

    /// Write raw bytes with a vint length prefix
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_vint(value.len() as u32)?;
        self.out.write_all(value)?;
        Ok(())
    }

    /// Write a bool as one byte
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.out.write_u8(u8::from(value))?;
        Ok(())
    }

    /// Write a UTF-8 string, vint-length-prefixed
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Write an optional string
    pub fn write_optional_string(&mut self, value: Option<&str>) -> Result<()> {
        match value {
            Some(s) => {
                self.write_bool(true)?;
                self.write_string(s)
            }
            None => self.write_bool(false),
        }
    }

    /// Write an optional bool (present flag, then the value)
    pub fn write_optional_bool(&mut self, value: Option<bool>) -> Result<()> {
        match value {
            Some(b) => {
                self.write_bool(true)?;
                self.write_bool(b)
            }
            None => self.write_bool(false),
        }
    }

    /// Write an optional value through a closure
    pub fn write_optional<T, F>(&mut self, value: Option<&T>, write: F) -> Result<()>
    where
        F: FnOnce(&mut Self, &T) -> Result<()>,
    {
        match value {
            Some(v) => {
                self.write_bool(true)?;
                write(self, v)
            }
            None => self.write_bool(false),
        }
    }

    /// Write a collection: vint count, then each element
    pub fn write_collection<T, F>(&mut self, items: &[T], mut write: F) -> Result<()>
    where
        F: FnMut(&mut Self, &T) -> Result<()>,
    {
        self.write_vint(items.len() as u32)?;
        for item in items {
            write(self, item)?;
        }
        Ok(())
    }

    /// Write a list of strings
    pub fn write_string_collection(&mut self, items: &[String]) -> Result<()> {
        self.write_collection(items, |out, s| out.write_string(s))
    }

    /// Write a string-keyed map in ascending key order
    pub fn write_map<V, F>(&mut self, map: &BTreeMap<String, V>, mut write: F) -> Result<()>
    where
        F: FnMut(&mut Self, &V) -> Result<()>,
    {
        self.write_vint(map.len() as u32)?;
        for (key, value) in map {
            self.write_string(key)?;
            write(self, value)?;
        }
        Ok(())
    }

    /// Write a string-to-string map
    pub fn write_string_map(&mut self, map: &BTreeMap<String, String>) -> Result<()> {
        self.write_map(map, |out, v| out.write_string(v))
    }
}

/// Stream reader carrying the writer's negotiated version
pub struct WireReader<R: Read> {
    input: R,
    version: TransportVersion,
}

impl<R: Read> WireReader<R> {
    /// Create a reader for a stream written at the given peer version
    pub fn new(input: R, version: TransportVersion) -> Self {
        WireReader { input, version }
    }

    /// The version the stream was written at
    #[inline]
    pub fn version(&self) -> TransportVersion {
        self.version
    }

    /// Read a variable-length u32
    pub fn read_vint(&mut self) -> Result<u32> {
        let mut value: u64 = 0;
        let mut shift = 0;
        loop {
            if shift > 28 {
                return Err(MetadataError::CorruptMetadata(
                    "vint too long".to_string(),
                ));
            }
            let byte = self.input.read_u8()?;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        u32::try_from(value)
            .map_err(|_| MetadataError::CorruptMetadata("vint overflows u32".to_string()))
    }

    /// Read a variable-length u64
    pub fn read_vlong(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        let mut shift = 0;
        loop {
            if shift > 63 {
                return Err(MetadataError::CorruptMetadata(
                    "vlong too long".to_string(),
                ));
            }
            let byte = self.input.read_u8()?;
            // The tenth group may only carry the top bit of a u64
            if shift == 63 && (byte & !0x01) != 0 {
                return Err(MetadataError::CorruptMetadata(
                    "vlong overflows u64".to_string(),
                ));
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        Ok(value)
    }

    /// Read a fixed-width big-endian i64
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.input.read_i64::<BigEndian>()?)
    }

    /// Read a fixed-width big-endian u64
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(self.input.read_u64::<BigEndian>()?)
    }

    /// Read a fixed-width big-endian u32
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.input.read_u32::<BigEndian>()?)
    }

    /// Read a single byte
    pub fn read_byte(&mut self) -> Result<u8> {
        Ok(self.input.read_u8()?)
    }

    /// Read vint-length-prefixed raw bytes
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_vint()? as usize;
        let mut buf = vec![0u8; len];
        self.input.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read a bool byte; anything but 0/1 is corrupt
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.input.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(MetadataError::CorruptMetadata(format!(
                "unexpected byte [{}] for boolean",
                b
            ))),
        }
    }

    /// Read a UTF-8 string
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes)
            .map_err(|e| MetadataError::CorruptMetadata(format!("invalid UTF-8 string: {}", e)))
    }

    /// Read an optional string
    pub fn read_optional_string(&mut self) -> Result<Option<String>> {
        if self.read_bool()? {
            Ok(Some(self.read_string()?))
        } else {
            Ok(None)
        }
    }

    /// Read an optional bool
    pub fn read_optional_bool(&mut self) -> Result<Option<bool>> {
        if self.read_bool()? {
            Ok(Some(self.read_bool()?))
        } else {
            Ok(None)
        }
    }

    /// Read an optional value through a closure
    pub fn read_optional<T, F>(&mut self, read: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        if self.read_bool()? {
            Ok(Some(read(self)?))
        } else {
            Ok(None)
        }
    }

    /// Read a collection written by [`WireWriter::write_collection`]
    pub fn read_collection<T, F>(&mut self, mut read: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        let count = self.read_vint()? as usize;
        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            items.push(read(self)?);
        }
        Ok(items)
    }

    /// Read a list of strings
    pub fn read_string_collection(&mut self) -> Result<Vec<String>> {
        self.read_collection(|input| input.read_string())
    }

    /// Read a string-keyed map
    pub fn read_map<V, F>(&mut self, mut read: F) -> Result<BTreeMap<String, V>>
    where
        F: FnMut(&mut Self) -> Result<V>,
    {
        let count = self.read_vint()? as usize;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = self.read_string()?;
            let value = read(self)?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// Read a string-to-string map
    pub fn read_string_map(&mut self) -> Result<BTreeMap<String, String>> {
        self.read_map(|input| input.read_string())
    }
}

/// A value with a fixed wire encoding
pub trait WireWritable {
    /// Write this value for the peer version carried by `out`
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()>;
}

/// A value readable from the wire
pub trait WireReadable: Sized {
    /// Read a value written at the version carried by `input`
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self>;
}

/// Serialize a value to a byte buffer at the given peer version
pub fn to_bytes<T: WireWritable>(value: &T, version: TransportVersion) -> Result<Vec<u8>> {
    let mut writer = WireWriter::new(Vec::new(), version);
    value.write_to(&mut writer)?;
    Ok(writer.into_inner())
}

/// Deserialize a value from a byte buffer written at the given peer version
pub fn from_bytes<T: WireReadable>(bytes: &[u8], version: TransportVersion) -> Result<T> {
    let mut reader = WireReader::new(bytes, version);
    T::read_from(&mut reader)
}

// ============================================================================
// Tests
// ============================================================================
